use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::utils::error::DeliveryError;

pub type SessionId = String;

/// Represents a connected browser session.
///
/// Each session is uniquely identified by an `id` and owns the sending side of
/// a channel whose receiver is drained into the session's WebSocket.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique identifier for the session.
    pub id: SessionId,

    /// Channel to send WebSocket messages to the browser.
    pub sender: UnboundedSender<WsMessage>,
}

impl Session {
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: format!("session-{}", Uuid::new_v4()),
            sender,
        }
    }

    /// A session is open while its socket writer still holds the receiver.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn send_text(&self, text: &str) -> Result<(), DeliveryError> {
        self.sender
            .send(WsMessage::text(text.to_owned()))
            .map_err(|_| DeliveryError::SessionClosed(self.id.clone()))
    }
}
