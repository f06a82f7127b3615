//! REST client for the character catalog.
//!
//! Wraps the Jikan v4 character endpoints using [`reqwest`]. A 404 is a
//! definitive "no such character" and comes back as `Ok(None)`; every other
//! failure is a [`CatalogError`] the caller should treat as transient.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use waifu_core::character::Character;
use waifu_core::ports::CatalogError;
use waifu_core::types::CharacterId;

use crate::client::CatalogSource;
use crate::payload::{AppearancePayload, CharacterPayload, Envelope};

/// Public Jikan endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.jikan.moe/v4";

/// HTTP client for a catalog instance.
pub struct JikanApi {
    client: reqwest::Client,
    base_url: String,
}

impl JikanApi {
    /// * `base_url` - e.g. `https://api.jikan.moe/v4`, without trailing slash.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `GET /characters/{id}`.
    pub async fn get_character(
        &self,
        id: CharacterId,
    ) -> Result<Option<CharacterPayload>, CatalogError> {
        let url = format!("{}/characters/{id}", self.base_url);
        let envelope: Option<Envelope<CharacterPayload>> = self.get_json(&url, &[]).await?;
        Ok(envelope.map(|e| e.data))
    }

    /// `GET /characters/{id}/anime`.
    pub async fn get_character_anime(
        &self,
        id: CharacterId,
    ) -> Result<Vec<AppearancePayload>, CatalogError> {
        let url = format!("{}/characters/{id}/anime", self.base_url);
        let envelope: Option<Envelope<Vec<AppearancePayload>>> =
            self.get_json(&url, &[]).await?;
        Ok(envelope.map(|e| e.data).unwrap_or_default())
    }

    /// `GET /characters?q=`.
    pub async fn search_characters(
        &self,
        query: &str,
    ) -> Result<Vec<CharacterPayload>, CatalogError> {
        let url = format!("{}/characters", self.base_url);
        let envelope: Option<Envelope<Vec<CharacterPayload>>> = self
            .get_json(&url, &[("q", query.to_string()), ("order_by", "favorites".into()), ("sort", "desc".into())])
            .await?;
        Ok(envelope.map(|e| e.data).unwrap_or_default())
    }

    /// `GET /top/characters?page=` (1-based pages).
    pub async fn top_characters(&self, page: u32) -> Result<Vec<CharacterPayload>, CatalogError> {
        let url = format!("{}/top/characters", self.base_url);
        let envelope: Option<Envelope<Vec<CharacterPayload>>> = self
            .get_json(&url, &[("page", page.max(1).to_string())])
            .await?;
        Ok(envelope.map(|e| e.data).unwrap_or_default())
    }

    // ---- private helpers ----

    /// GET a JSON document. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, CatalogError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| CatalogError::Request(Box::new(e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::TOO_MANY_REQUESTS => return Err(CatalogError::RateLimited),
            status if !status.is_success() => {
                return Err(CatalogError::Status {
                    status: status.as_u16(),
                })
            }
            _ => {}
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CatalogSource for JikanApi {
    async fn character(&self, id: CharacterId) -> Result<Option<Character>, CatalogError> {
        let Some(payload) = self.get_character(id).await? else {
            return Ok(None);
        };
        let appearances = self.get_character_anime(id).await?;
        Ok(Some(payload.into_character(&appearances)))
    }

    async fn top(&self, page: u32) -> Result<Vec<Character>, CatalogError> {
        let payloads = self.top_characters(page).await?;
        Ok(payloads.into_iter().map(|p| p.into_character(&[])).collect())
    }

    async fn search(&self, query: &str) -> Result<Vec<Character>, CatalogError> {
        let payloads = self.search_characters(query).await?;
        Ok(payloads.into_iter().map(|p| p.into_character(&[])).collect())
    }
}
