use super::{Command, CommandKind};
use crate::transport::CommandError;
use crate::world::{Entity, World};
use statesync::protocol::TAG_DESPAWNED;
use statesync::{ClientMessage, NetworkIdentity, ServerMessage};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DespawnPayload {
    pub identity: NetworkIdentity,
}

impl From<DespawnPayload> for ClientMessage {
    fn from(payload: DespawnPayload) -> Self {
        ClientMessage::Despawn {
            identity: payload.identity,
        }
    }
}

/// Despawn replication: announces a local despawn, drops departed mirrors
pub struct Despawn;

pub type DespawnCommand = Command<Despawn>;

impl CommandKind for Despawn {
    type Source = Entity;
    type Payload = DespawnPayload;

    const INBOUND_TAGS: &'static [&'static str] = &[TAG_DESPAWNED];

    fn payload(entity: &Entity, _seq: u64) -> Result<DespawnPayload, CommandError> {
        let identity = entity.network.ok_or(CommandError::NotNetworked)?;
        Ok(DespawnPayload { identity })
    }

    fn apply(world: &mut World, msg: &ServerMessage) {
        if let ServerMessage::Despawned { identity } = msg {
            if let Some(entity) = world.despawn_mirror(identity) {
                debug!(entity = %entity.id(), identity = %identity, "Mirror despawned");
            }
        }
    }
}
