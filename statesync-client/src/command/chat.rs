use super::{Command, CommandKind};
use crate::transport::CommandError;
use crate::world::{ChatLine, World};
use statesync::protocol::TAG_CHAT;
use statesync::{ClientMessage, ServerMessage};

impl From<ChatLine> for ClientMessage {
    fn from(line: ChatLine) -> Self {
        ClientMessage::Chat {
            user: line.user,
            message: line.message,
        }
    }
}

/// Chat relay: sends a line to every other participant, logs what arrives
pub struct Chat;

pub type ChatCommand = Command<Chat>;

impl CommandKind for Chat {
    type Source = ChatLine;
    type Payload = ChatLine;

    const INBOUND_TAGS: &'static [&'static str] = &[TAG_CHAT];

    fn payload(line: &ChatLine, _seq: u64) -> Result<ChatLine, CommandError> {
        Ok(line.clone())
    }

    fn apply(world: &mut World, msg: &ServerMessage) {
        if let ServerMessage::Chat { user, message } = msg {
            world.push_chat(ChatLine::new(user.as_str(), message.as_str()));
        }
    }
}
