//! Session fan-out
//!
//! The relay keeps the set of open browser sessions and pushes every bridge
//! event to all of them. Delivery is best effort: a session whose socket is
//! already gone is skipped silently, and a failed send is logged without
//! affecting the other sessions. Nothing is queued or retried.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::message::ServerEvent;
use super::session::{Session, SessionId};
use crate::bridge::{BridgeListener, ConnectionStatus, Message};
use crate::utils::error::DeliveryError;

#[derive(Debug, Default)]
pub struct Relay {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a session and sends it the current connection snapshot.
    /// A session that cannot take the snapshot is not registered.
    pub fn join(&self, session: Session, snapshot: &ConnectionStatus) -> Result<(), DeliveryError> {
        let text = serde_json::to_string(&ServerEvent::status(snapshot))?;
        session.send_text(&text)?;

        info!("{} joined", session.id);
        self.sessions().insert(session.id.clone(), session);
        Ok(())
    }

    pub fn leave(&self, id: &SessionId) -> bool {
        let removed = self.sessions().remove(id).is_some();
        if removed {
            info!("{id} left");
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Sends `event` to every open session. Returns how many sessions took it.
    pub fn broadcast(&self, event: &ServerEvent) -> Result<usize, DeliveryError> {
        let text = serde_json::to_string(event)?;
        let mut delivered = 0;

        for (id, session) in self.sessions().iter() {
            if !session.is_open() {
                debug!("Skipping closed session {id}");
                continue;
            }
            match session.send_text(&text) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to send to {id}: {e}"),
            }
        }

        Ok(delivered)
    }
}

impl BridgeListener for Relay {
    fn on_message(&self, message: &Message) -> Result<(), DeliveryError> {
        self.broadcast(&ServerEvent::message(message)).map(|_| ())
    }

    fn on_status(&self, status: &ConnectionStatus) -> Result<(), DeliveryError> {
        self.broadcast(&ServerEvent::status(status)).map(|_| ())
    }
}
