//! The `persistence` module keeps the recent message history.
//!
//! History is what lets a freshly opened dashboard draw a chart for the last
//! hour (or day, or week) instead of starting empty. Nothing is written to
//! disk: [`MemoryStore`] holds a bounded FIFO of messages and answers
//! time-window queries over it.
//!
//! The bridge only talks to the [`MessageStore`] trait, so another backend can
//! be plugged in without touching the bridge.

pub mod memory_store;
pub mod window;

pub use memory_store::MemoryStore;
pub use window::RetentionWindow;

use crate::bridge::message::Message;
use crate::utils::error::StoreError;

/// Storage the bridge appends received messages to.
pub trait MessageStore: Send {
    /// Adds a message at the tail, evicting from the head when over capacity.
    fn append(&mut self, message: Message) -> Result<(), StoreError>;

    /// Messages on exactly `topic` received within `window`, oldest first.
    fn query(&self, topic: &str, window: RetentionWindow) -> Vec<Message>;

    /// Messages whose topic matches `pattern` received within `window`.
    fn query_matching(&self, pattern: &str, window: RetentionWindow) -> Vec<Message>;

    /// Distinct retained topics in first-seen order.
    fn topics(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
