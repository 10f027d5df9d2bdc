//! # mqttdash
//!
//! `mqttdash` is the backend of a browser MQTT dashboard. It holds one
//! connection to an upstream broker (MQTT over WebSocket), keeps a bounded
//! in-memory history of received messages and pushes connection status and
//! messages to every connected browser over WebSocket.
//!
//! ## Core Modules
//!
//! - `bridge`: The upstream connection: connect/disconnect, subscriptions, payload decoding and listener fan-out.
//! - `config`: Handles loading and managing service configuration.
//! - `persistence`: The bounded message store and its retention windows.
//! - `relay`: Manages browser sessions and the WebSocket push server.
//! - `topic`: MQTT topic filter matching.
//! - `utils`: Contains shared utilities, such as error handling and logging.

pub mod bridge;
pub mod config;
pub mod persistence;
pub mod relay;
pub mod topic;
pub mod utils;
