//! Game coordination layer.
//!
//! [`GameService`] is the single owner of all ephemeral game state (pending
//! claims, trades, packs and gifts, roll locks, snipe cooldowns and the
//! timers that expire them). It is constructed once at startup around the
//! storage and catalog ports and shared with request handlers.
//!
//! Ownership is settled by the store's atomic operations; the in-memory
//! registries here only drive the workflow around them.

pub mod admin;
pub mod claims;
pub mod cooldown;
pub mod error;
pub mod locks;
pub mod packs;
pub mod picker;
pub mod scheduler;
pub mod service;
pub mod trades;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::EngineError;
pub use picker::{IdPicker, RandomIds};
pub use service::{GameService, HealthReport, InteractionResult, RollResult};
