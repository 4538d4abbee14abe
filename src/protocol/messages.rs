use crate::identity::NetworkIdentity;
use crate::protocol::wire::{PayloadError, Position};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Serialized server message, shared between every recipient of a broadcast
pub type Frame = Arc<str>;

pub const TAG_POSITION_UPDATE: &str = "position_update";
pub const TAG_DESPAWN: &str = "despawn";
pub const TAG_WELCOME: &str = "welcome";
pub const TAG_TRANSFORMS: &str = "transforms";
pub const TAG_DESPAWNED: &str = "despawned";
pub const TAG_ERROR: &str = "error";
/// Chat relay, same tag in both directions
pub const TAG_CHAT: &str = "chat";

/// Client → Server message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Latest position of the sender's entity
    #[serde(rename = "position_update")]
    PositionUpdate {
        identity: NetworkIdentity,
        x: f32,
        y: f32,
        z: f32,
        /// Optional monotonic sequence number; older or repeated numbers are rejected
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    /// Sender's entity left the world (connection stays open)
    #[serde(rename = "despawn")]
    Despawn { identity: NetworkIdentity },
    /// Text for every other participant
    #[serde(rename = "chat")]
    Chat { user: String, message: String },
}

impl ClientMessage {
    pub fn position_update(identity: NetworkIdentity, position: Position) -> Self {
        ClientMessage::PositionUpdate {
            identity,
            x: position.x,
            y: position.y,
            z: position.z,
            seq: None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ClientMessage::PositionUpdate { .. } => TAG_POSITION_UPDATE,
            ClientMessage::Despawn { .. } => TAG_DESPAWN,
            ClientMessage::Chat { .. } => TAG_CHAT,
        }
    }
}

/// Server → Client message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent once to a freshly opened connection
    #[serde(rename = "welcome")]
    Welcome {
        connection_id: String,
        records: Vec<String>,
    },
    /// Snapshot of every reported client, `<identity>/<x>/<y>/<z>` each
    #[serde(rename = "transforms")]
    Transforms { records: Vec<String> },
    /// A participant's entity left (despawn or disconnect)
    #[serde(rename = "despawned")]
    Despawned { identity: NetworkIdentity },
    /// Chat line relayed from another participant
    #[serde(rename = "chat")]
    Chat { user: String, message: String },
    #[serde(rename = "error")]
    Error { error: String },
}

impl ServerMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => TAG_WELCOME,
            ServerMessage::Transforms { .. } => TAG_TRANSFORMS,
            ServerMessage::Despawned { .. } => TAG_DESPAWNED,
            ServerMessage::Chat { .. } => TAG_CHAT,
            ServerMessage::Error { .. } => TAG_ERROR,
        }
    }

    /// Carries the full set of reported records
    pub fn is_snapshot(&self) -> bool {
        matches!(
            self,
            ServerMessage::Welcome { .. } | ServerMessage::Transforms { .. }
        )
    }

    /// Serialize once for fan-out
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}

/// Decode an inbound text frame
pub fn decode_client_message(text: &str) -> Result<ClientMessage, PayloadError> {
    let msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| PayloadError::MalformedPayload(e.to_string()))?;

    if let ClientMessage::PositionUpdate { x, y, z, .. } = &msg {
        if !Position::new(*x, *y, *z).is_finite() {
            return Err(PayloadError::MalformedPayload(
                "position components must be finite".to_string(),
            ));
        }
    }

    Ok(msg)
}

/// Decode an outbound frame (client side)
pub fn decode_server_message(text: &str) -> Result<ServerMessage, PayloadError> {
    serde_json::from_str(text).map_err(|e| PayloadError::MalformedPayload(e.to_string()))
}
