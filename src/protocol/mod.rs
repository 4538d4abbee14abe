// Wire protocol: tagged JSON messages and the bulk record encoding

mod messages;
mod wire;

pub use messages::{
    decode_client_message, decode_server_message, ClientMessage, Frame, ServerMessage, TAG_CHAT,
    TAG_DESPAWN, TAG_DESPAWNED, TAG_ERROR, TAG_POSITION_UPDATE, TAG_TRANSFORMS, TAG_WELCOME,
};
pub use wire::{decode_record, encode_record, ClientPackage, PayloadError, Position, SEPARATOR};
