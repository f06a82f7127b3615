//! WebSocket infrastructure for pushing game events to frontends.
//!
//! Provides connection management, heartbeat monitoring, the HTTP upgrade
//! handler used by Axum routes, and the forwarder that relays the game's
//! event bus to every connection.

mod forwarder;
mod handler;
mod heartbeat;
pub mod manager;

pub use forwarder::EventForwarder;
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
