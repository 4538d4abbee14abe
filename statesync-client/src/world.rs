//! Local entity world: owned entities plus mirrors of remote participants.

use statesync::{ClientPackage, NetworkIdentity, Position};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Chat lines kept in the local log
pub const CHAT_HISTORY: usize = 64;

/// World shared between the game loop and inbound listeners
pub type SharedWorld = Arc<RwLock<World>>;

/// Local entity handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Who drives an entity's transform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authority {
    /// Owned by this process
    Local,
    /// Mirror of another participant, driven by the hub
    Remote,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    id: EntityId,
    authority: Authority,
    /// Present only on network-enabled entities
    pub network: Option<NetworkIdentity>,
    pub position: Position,
}

impl Entity {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn is_remote(&self) -> bool {
        self.authority == Authority::Remote
    }
}

/// Result of applying one remote record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteApply {
    Spawned(EntityId),
    Moved(EntityId),
    /// Record names a locally owned entity; never overwritten
    Ignored,
}

/// One relayed chat line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatLine {
    pub user: String,
    pub message: String,
}

impl ChatLine {
    pub fn new(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct World {
    entities: BTreeMap<EntityId, Entity>,
    next_id: u32,
    chat: VecDeque<ChatLine>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedWorld {
        Arc::new(RwLock::new(self))
    }

    /// Spawn a local entity that is not replicated
    pub fn spawn(&mut self, position: Position) -> EntityId {
        self.insert(Authority::Local, None, position)
    }

    /// Spawn a local entity with a fresh network identity
    pub fn spawn_networked(&mut self, position: Position) -> EntityId {
        self.insert(Authority::Local, Some(NetworkIdentity::create()), position)
    }

    /// Spawn a mirror of a remote participant
    pub fn spawn_mirror(&mut self, identity: NetworkIdentity, position: Position) -> EntityId {
        self.insert(Authority::Remote, Some(identity), position)
    }

    fn insert(
        &mut self,
        authority: Authority,
        network: Option<NetworkIdentity>,
        position: Position,
    ) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(
            id,
            Entity {
                id,
                authority,
                network,
                position,
            },
        );
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn find_by_identity(&self, identity: &NetworkIdentity) -> Option<&Entity> {
        self.entities
            .values()
            .find(|e| e.network.as_ref() == Some(identity))
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Remove the mirror for `identity`. Local entities are kept.
    pub fn despawn_mirror(&mut self, identity: &NetworkIdentity) -> Option<Entity> {
        let id = self
            .entities
            .values()
            .find(|e| e.is_remote() && e.network.as_ref() == Some(identity))?
            .id;
        self.entities.remove(&id)
    }

    /// Move the matching mirror, or spawn one if the identity is new
    pub fn apply_remote(&mut self, package: &ClientPackage) -> RemoteApply {
        let existing = self
            .entities
            .values_mut()
            .find(|e| e.network.as_ref() == Some(&package.identity));

        match existing {
            Some(entity) if entity.is_remote() => {
                entity.position = package.position;
                RemoteApply::Moved(entity.id)
            }
            Some(_) => RemoteApply::Ignored,
            None => RemoteApply::Spawned(self.spawn_mirror(package.identity, package.position)),
        }
    }

    /// Make the mirrors match a full snapshot: move or spawn every listed
    /// identity and despawn remote mirrors the snapshot no longer lists.
    ///
    /// Returns the number of mirrors despawned.
    pub fn reconcile(&mut self, snapshot: &[ClientPackage]) -> usize {
        let listed: HashSet<NetworkIdentity> = snapshot.iter().map(|p| p.identity).collect();

        let stale: Vec<EntityId> = self
            .mirrors()
            .filter(|e| e.network.map_or(true, |id| !listed.contains(&id)))
            .map(|e| e.id)
            .collect();
        for id in &stale {
            self.entities.remove(id);
        }

        for package in snapshot {
            self.apply_remote(package);
        }
        stale.len()
    }

    /// Append to the chat log, dropping the oldest line past `CHAT_HISTORY`
    pub fn push_chat(&mut self, line: ChatLine) {
        if self.chat.len() == CHAT_HISTORY {
            self.chat.pop_front();
        }
        self.chat.push_back(line);
    }

    pub fn chat_log(&self) -> impl Iterator<Item = &ChatLine> {
        self.chat.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn mirrors(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| e.is_remote())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
