//! Observer registry for decoded messages and connection-state changes.
//!
//! Listeners are called synchronously, in registration order, from the bridge's
//! event handler while the bridge lock is held. A listener must therefore never
//! try to lock the bridge itself and should hand work off (for example through
//! a channel) instead of blocking.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use super::connection::ConnectionStatus;
use super::message::Message;
use crate::utils::error::DeliveryError;

pub type ListenerId = u64;

pub trait BridgeListener: Send + Sync {
    fn on_message(&self, message: &Message) -> Result<(), DeliveryError>;

    fn on_status(&self, _status: &ConnectionStatus) -> Result<(), DeliveryError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: ListenerId,
    listeners: Vec<(ListenerId, Arc<dyn BridgeListener>)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn BridgeListener>) -> ListenerId {
        self.next_id += 1;
        self.listeners.push((self.next_id, listener));
        self.next_id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers a message to every listener. Returns how many accepted it.
    pub fn notify_message(&self, message: &Message) -> usize {
        self.deliver("message", |l| l.on_message(message))
    }

    /// Delivers a status change to every listener. Returns how many accepted it.
    pub fn notify_status(&self, status: &ConnectionStatus) -> usize {
        self.deliver("status", |l| l.on_status(status))
    }

    fn deliver<F>(&self, kind: &str, call: F) -> usize
    where
        F: Fn(&dyn BridgeListener) -> Result<(), DeliveryError>,
    {
        let mut delivered = 0;
        for (id, listener) in &self.listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| call(listener.as_ref()))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Listener {id} failed on {kind}: {e}"),
                Err(_) => warn!("Listener {id} panicked on {kind}"),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
