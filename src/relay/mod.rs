//! The `relay` module pushes bridge events to browser sessions.
//!
//! It defines the JSON events sent to browsers, the per-session channel
//! wrapper, the fan-out hub (registered as a bridge listener) and the
//! WebSocket server that accepts sessions.

pub mod hub;
pub mod message;
pub mod session;
pub mod websocket;

pub use hub::Relay;
pub use message::ServerEvent;
pub use session::{Session, SessionId};
