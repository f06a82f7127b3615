//! Game event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`GameEvent`]: envelope for everything that happens without a direct
//!   request to answer it (timer expiries, resolutions other players need
//!   to see). The API streams these to the chat frontend over WebSocket.

pub mod bus;

pub use bus::{EventBus, GameEvent, GameEventKind};
