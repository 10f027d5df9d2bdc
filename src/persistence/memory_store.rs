//! In-memory message history
//!
//! Messages live in a single `VecDeque` in arrival order. The deque is capped
//! at `max_messages`; once an append pushes it over the cap the oldest entries
//! are dropped from the front. Queries are pure filters over that sequence.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use super::{MessageStore, RetentionWindow};
use crate::bridge::message::Message;
use crate::topic;
use crate::utils::error::StoreError;

#[derive(Debug, Clone)]
pub struct MemoryStore {
    messages: VecDeque<Message>,
    max_messages: usize,
}

impl MemoryStore {
    /// Default cap on retained messages.
    pub const DEFAULT_MAX_MESSAGES: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_MAX_MESSAGES)
    }

    /// Creates a store that keeps at most `max_messages` messages.
    pub fn with_capacity(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_messages.min(Self::DEFAULT_MAX_MESSAGES)),
            max_messages,
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// `query` evaluated against an explicit clock.
    pub fn query_at(&self, topic: &str, window: RetentionWindow, now: DateTime<Utc>) -> Vec<Message> {
        self.select(window, now, |t| t == topic)
    }

    /// `query_matching` evaluated against an explicit clock.
    pub fn query_matching_at(
        &self,
        pattern: &str,
        window: RetentionWindow,
        now: DateTime<Utc>,
    ) -> Vec<Message> {
        self.select(window, now, |t| topic::matches(pattern, t))
    }

    /// Iterates the retained messages oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    fn select(
        &self,
        window: RetentionWindow,
        now: DateTime<Utc>,
        wanted: impl Fn(&str) -> bool,
    ) -> Vec<Message> {
        let since = now - window.duration();
        self.messages
            .iter()
            .filter(|m| m.timestamp >= since && m.timestamp <= now && wanted(&m.topic))
            .cloned()
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for MemoryStore {
    fn append(&mut self, message: Message) -> Result<(), StoreError> {
        self.messages.push_back(message);
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
        Ok(())
    }

    fn query(&self, topic: &str, window: RetentionWindow) -> Vec<Message> {
        self.query_at(topic, window, Utc::now())
    }

    fn query_matching(&self, pattern: &str, window: RetentionWindow) -> Vec<Message> {
        self.query_matching_at(pattern, window, Utc::now())
    }

    fn topics(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.messages
            .iter()
            .filter(|m| seen.insert(m.topic.as_str()))
            .map(|m| m.topic.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.messages.len()
    }
}
