use std::collections::{BTreeSet, HashMap, VecDeque};

/// Upper bound on the summed filter bytes of one SUBSCRIBE request, kept
/// below the client's default 10 KiB outgoing packet limit.
pub const SUBSCRIBE_BATCH_BYTES: usize = 8 * 1024;

/// Represents the set of patterns subscribed on the upstream broker.
///
/// Patterns are kept in a set, so subscribing twice is a no-op. They come back
/// sorted, which is also the order they are re-applied after a reconnect.
///
/// Besides the active set, the tracker correlates outgoing SUBSCRIBE packets
/// with their SUBACKs so a broker-side rejection can take a pattern back out.
/// Every request (one or more filters) queues up in `in_flight` until the
/// client reports the packet id it used, then waits in `awaiting_ack` keyed by
/// that id. The SUBACK return codes line up with the request's filters.
#[derive(Debug, Default)]
pub struct Subscriptions {
    active: BTreeSet<String>,
    in_flight: VecDeque<Vec<String>>,
    awaiting_ack: HashMap<u16, Vec<String>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pattern to the active set. Returns `false` if it was already there.
    pub fn insert(&mut self, pattern: &str) -> bool {
        self.active.insert(pattern.to_string())
    }

    /// Removes a pattern from the active set. Returns `false` if it was not there.
    pub fn remove(&mut self, pattern: &str) -> bool {
        self.active.remove(pattern)
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.active.contains(pattern)
    }

    /// Active patterns, sorted.
    pub fn patterns(&self) -> Vec<String> {
        self.active.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Records that one SUBSCRIBE carrying `patterns` was handed to the client.
    pub fn requested(&mut self, patterns: Vec<String>) {
        if !patterns.is_empty() {
            self.in_flight.push_back(patterns);
        }
    }

    /// The client sent the oldest pending SUBSCRIBE with packet id `pkid`.
    pub fn sent(&mut self, pkid: u16) {
        if let Some(patterns) = self.in_flight.pop_front() {
            self.awaiting_ack.insert(pkid, patterns);
        }
    }

    /// Settles a SUBACK. `rejected` holds the indices of refused filters; those
    /// patterns leave the active set and are returned.
    pub fn acknowledged(&mut self, pkid: u16, rejected: &[usize]) -> Vec<String> {
        let Some(patterns) = self.awaiting_ack.remove(&pkid) else {
            return Vec::new();
        };

        rejected
            .iter()
            .filter_map(|&idx| patterns.get(idx))
            .filter(|pattern| self.active.remove(pattern.as_str()))
            .cloned()
            .collect()
    }

    /// The connection dropped. Packets already on the wire will never be
    /// acknowledged, while requests still queued in the client are replayed,
    /// in order, once it reconnects.
    pub fn connection_lost(&mut self) {
        self.awaiting_ack.clear();
    }

    /// Forgets all pending requests; used when the client itself is replaced.
    pub fn reset_pending(&mut self) {
        self.in_flight.clear();
        self.awaiting_ack.clear();
    }
}

/// Splits `patterns` into SUBSCRIBE-sized groups, keeping their order.
pub fn batches(patterns: &[String]) -> Vec<Vec<String>> {
    let mut batches = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut bytes = 0;

    for pattern in patterns {
        // length prefix plus options byte
        let cost = pattern.len() + 3;
        if !current.is_empty() && bytes + cost > SUBSCRIBE_BATCH_BYTES {
            batches.push(std::mem::take(&mut current));
            bytes = 0;
        }
        current.push(pattern.clone());
        bytes += cost;
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
