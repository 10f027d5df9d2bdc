//! The `error` module defines the error types used within `mqttdash`.
//!
//! Only [`ConnectionError`] and [`SubscriptionError`] ever reach the caller of a
//! bridge operation. [`DeliveryError`] and [`StoreError`] are recovered where they
//! happen and only logged.

use thiserror::Error;

/// Failure to establish (or keep) the upstream broker connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("broker connection failed: {0}")]
    Refused(String),

    #[error("connection closed before the broker answered")]
    Closed,

    #[error("invalid broker address '{0}'")]
    InvalidAddress(String),
}

/// Failure of a subscribe, unsubscribe or publish request.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("no active broker connection")]
    NotConnected,

    #[error("broker rejected subscription to '{pattern}'")]
    Rejected { pattern: String },

    #[error("mqtt client request failed: {0}")]
    Client(String),
}

/// A single recipient (bridge listener or browser session) could not take an event.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("listener failed: {0}")]
    Listener(String),

    #[error("session {0} is closed")]
    SessionClosed(String),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The message store refused a message.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

/// Umbrella error returned by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}

impl From<rumqttc::ClientError> for SubscriptionError {
    fn from(err: rumqttc::ClientError) -> Self {
        SubscriptionError::Client(err.to_string())
    }
}

impl From<rumqttc::ConnectionError> for ConnectionError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        ConnectionError::Refused(err.to_string())
    }
}
