use super::{Command, CommandKind};
use crate::transport::CommandError;
use crate::world::{Entity, World};
use statesync::protocol::{decode_record, TAG_TRANSFORMS, TAG_WELCOME};
use statesync::{ClientMessage, NetworkIdentity, Position, ServerMessage};
use tracing::{debug, warn};

/// Position report for one networked entity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformPayload {
    pub identity: NetworkIdentity,
    pub position: Position,
    pub seq: u64,
}

impl From<TransformPayload> for ClientMessage {
    fn from(payload: TransformPayload) -> Self {
        ClientMessage::PositionUpdate {
            identity: payload.identity,
            x: payload.position.x,
            y: payload.position.y,
            z: payload.position.z,
            seq: Some(payload.seq),
        }
    }
}

/// Transform replication: reports the local position, mirrors everyone else.
/// Inbound welcome/transforms snapshots are reconciled against the mirrors.
pub struct TransformSync;

pub type TransformCommand = Command<TransformSync>;

impl CommandKind for TransformSync {
    type Source = Entity;
    type Payload = TransformPayload;

    const INBOUND_TAGS: &'static [&'static str] = &[TAG_WELCOME, TAG_TRANSFORMS];

    fn payload(entity: &Entity, seq: u64) -> Result<TransformPayload, CommandError> {
        let identity = entity.network.ok_or(CommandError::NotNetworked)?;
        Ok(TransformPayload {
            identity,
            position: entity.position,
            seq,
        })
    }

    fn apply(world: &mut World, msg: &ServerMessage) {
        let records = match msg {
            ServerMessage::Welcome { records, .. } | ServerMessage::Transforms { records } => {
                records
            }
            _ => return,
        };

        // Every snapshot is complete, so mirrors it omits are gone
        let snapshot: Vec<_> = records
            .iter()
            .filter_map(|record| match decode_record(record) {
                Ok(package) => Some(package),
                Err(e) => {
                    warn!(record = %record, error = %e, "Skipping bad transform record");
                    None
                }
            })
            .collect();

        let removed = world.reconcile(&snapshot);
        if removed > 0 {
            debug!(removed = removed, "Dropped mirrors missing from snapshot");
        }
    }
}
