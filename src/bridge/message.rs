use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A message received from the upstream broker.
///
/// Messages are immutable once created: the bridge stamps them on receipt,
/// appends them to the store and hands clones to every listener.
///
/// # Fields
///
/// - `topic` - The concrete topic the broker delivered the message on.
/// - `payload` - The decoded body, either a JSON value or the raw text.
/// - `timestamp` - When the bridge received the message (UTC).
///
/// # Example
///
/// ```rust
/// use mqttdash::bridge::message::{Message, Payload};
///
/// let msg = Message::received("sensor/room1/temp", b"21.5");
/// assert_eq!(msg.payload, Payload::Json(serde_json::json!(21.5)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Builds a message from raw broker bytes, stamped with the current time.
    pub fn received(topic: impl Into<String>, bytes: &[u8]) -> Self {
        Self::at(topic, Payload::decode(bytes), Utc::now())
    }

    pub fn at(topic: impl Into<String>, payload: Payload, timestamp: DateTime<Utc>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp,
        }
    }
}

/// Message body. Serialises as the bare JSON value, so raw text shows up as a
/// JSON string on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// Parses the bytes as JSON and falls back to the (lossy UTF-8) raw text.
    pub fn decode(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Payload::Json(value),
            Err(e) => {
                debug!("payload is not JSON, keeping raw text: {e}");
                Payload::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }

    /// Encodes the payload for publishing. Text goes out verbatim.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Json(value) => value.to_string().into_bytes(),
            Payload::Text(text) => text.clone().into_bytes(),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}
