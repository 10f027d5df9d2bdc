//! The `bridge` module maintains the connection to the upstream MQTT broker.
//!
//! It subscribes topic patterns, decodes incoming payloads, appends every
//! message to the store and fans it out to registered listeners (the realtime
//! relay being the main one).

pub mod connection;
pub mod engine;
pub mod listener;
pub mod message;
pub mod subscriptions;
pub mod upstream;

pub use connection::{
    BridgeOptions, ConnectRequest, ConnectionInfo, ConnectionState, ConnectionStatus, Credentials,
};
pub use engine::{Bridge, SharedBridge, lock_bridge};
pub use listener::{BridgeListener, ListenerId};
pub use message::{Message, Payload};

#[cfg(test)]
mod tests;
