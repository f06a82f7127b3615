//! Cache-through catalog client.
//!
//! Lookups check the cache first (`character:{id}`, `top:{page}`), fall
//! through to the remote [`CatalogSource`] on a miss and store what came
//! back with a fixed TTL. Nonexistent ids are never cached, so a character
//! added to the catalog later becomes rollable without waiting out a TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use waifu_core::character::Character;
use waifu_core::ports::{CatalogError, CharacterCatalog};
use waifu_core::types::CharacterId;

use crate::cache::KeyValueCache;

/// One hour.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Remote origin of character data.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Character with its primary appearance; `Ok(None)` when it does not
    /// exist.
    async fn character(&self, id: CharacterId) -> Result<Option<Character>, CatalogError>;

    async fn top(&self, page: u32) -> Result<Vec<Character>, CatalogError>;

    async fn search(&self, query: &str) -> Result<Vec<Character>, CatalogError>;
}

pub struct CatalogClient {
    source: Arc<dyn CatalogSource>,
    cache: Arc<dyn KeyValueCache>,
    ttl: Duration,
}

impl CatalogClient {
    pub fn new(source: Arc<dyn CatalogSource>, cache: Arc<dyn KeyValueCache>, ttl: Duration) -> Self {
        Self { source, cache, ttl }
    }

    fn character_key(id: CharacterId) -> String {
        format!("character:{id}")
    }

    fn top_key(page: u32) -> String {
        format!("top:{page}")
    }

    /// Read and decode a cached value. A value that no longer decodes is
    /// treated as a miss and overwritten on the next store.
    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CatalogError> {
        let Some(raw) = self.cache.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(key, "Catalog cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    /// Store a value. Cache write failures are logged; the fetched value is
    /// still good.
    async fn store<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to encode catalog entry for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set_ex(key, &raw, self.ttl).await {
            tracing::warn!(key, error = %e, "Failed to write catalog cache");
        }
    }
}

#[async_trait]
impl CharacterCatalog for CatalogClient {
    async fn fetch(&self, id: CharacterId) -> Result<Option<Character>, CatalogError> {
        let key = Self::character_key(id);
        if let Some(character) = self.cached::<Character>(&key).await? {
            return Ok(Some(character));
        }

        let Some(character) = self.source.character(id).await? else {
            tracing::debug!(character_id = id, "Catalog has no such character");
            return Ok(None);
        };
        self.store(&key, &character).await;
        Ok(Some(character))
    }

    async fn top(&self, page: u32) -> Result<Vec<Character>, CatalogError> {
        let page = page.max(1);
        let key = Self::top_key(page);
        if let Some(characters) = self.cached::<Vec<Character>>(&key).await? {
            return Ok(characters);
        }

        let characters = self.source.top(page).await?;
        if !characters.is_empty() {
            self.store(&key, &characters).await;
        }
        Ok(characters)
    }

    async fn search(&self, query: &str) -> Result<Vec<Character>, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.source.search(query).await
    }

    async fn health_check(&self) -> Result<(), CatalogError> {
        self.cache.ping().await
    }
}
