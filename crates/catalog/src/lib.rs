//! Character catalog access.
//!
//! - [`JikanApi`]: REST client for a Jikan v4 compatible catalog.
//! - [`RedisCache`] / [`MemoryCache`]: key-value caches with per-key TTL.
//! - [`CatalogClient`]: cache-through lookups; implements the engine's
//!   `CharacterCatalog` port.

pub mod api;
pub mod cache;
pub mod client;
pub mod payload;

pub use api::JikanApi;
pub use cache::{KeyValueCache, MemoryCache, RedisCache};
pub use client::{CatalogClient, CatalogSource, DEFAULT_CACHE_TTL};
