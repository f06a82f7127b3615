//! Storage and catalog seams.
//!
//! The engine only talks to the outside world through these traits. The
//! PostgreSQL implementation lives in the `db` crate, the HTTP + Redis one
//! in the `catalog` crate, and in-memory versions back the engine's tests.

use async_trait::async_trait;
use serde::Serialize;

use crate::character::Character;
use crate::lucky::LuckyAdvance;
use crate::quota::QuotaWindow;
use crate::types::{CharacterId, Timestamp, UserId};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure talking to the persistent store. Always transient from the
/// game's point of view: the action fails and nothing is granted.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[source] BoxError),

    #[error("store query failed: {0}")]
    Query(#[source] BoxError),
}

/// Failure fetching from the character catalog or its cache.
///
/// A nonexistent id is not an error; lookups return `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Request(#[source] BoxError),

    #[error("catalog responded with status {status}")]
    Status { status: u16 },

    #[error("catalog rate limit hit")]
    RateLimited,

    #[error("malformed catalog payload: {0}")]
    Decode(String),

    #[error("catalog cache failed: {0}")]
    Cache(#[source] BoxError),
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// An ownership record with its claim-time snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedCharacter {
    pub owner: UserId,
    pub character_id: CharacterId,
    pub name: String,
    pub image_url: Option<String>,
    pub anime_title: Option<String>,
    pub role: Option<String>,
    pub favorites: i64,
    pub claimed_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionPage {
    pub owner: UserId,
    pub items: Vec<OwnedCharacter>,
    /// Zero-based.
    pub page: u32,
    pub total_pages: u32,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub username: String,
    pub total_points: i64,
}

/// One append to the roll history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollRecord {
    pub user: UserId,
    pub character_id: CharacterId,
    pub character_name: String,
    pub favorites: i64,
    pub points: i64,
    pub is_duplicate: bool,
}

// ---------------------------------------------------------------------------
// Store traits
// ---------------------------------------------------------------------------

/// Per-user point balances.
#[async_trait]
pub trait PointsLedger: Send + Sync {
    /// Create the user row on first contact; refresh the display name
    /// otherwise.
    async fn ensure_user(&self, user: &UserId, username: &str) -> Result<(), StoreError>;

    /// Add points, returning the new balance.
    async fn add_points(&self, user: &UserId, points: i64) -> Result<i64, StoreError>;

    /// Remove points, flooring the balance at zero. Returns the new balance.
    async fn deduct_points(&self, user: &UserId, points: i64) -> Result<i64, StoreError>;

    /// Atomically spend `cost` if the balance covers it. Returns the new
    /// balance, or `None` (and changes nothing) when it does not.
    async fn try_spend(&self, user: &UserId, cost: i64) -> Result<Option<i64>, StoreError>;

    async fn balance(&self, user: &UserId) -> Result<i64, StoreError>;

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, StoreError>;
}

/// Persisted rate-limit window and lucky counter.
#[async_trait]
pub trait RollQuotaStore: Send + Sync {
    async fn quota_window(&self, user: &UserId) -> Result<QuotaWindow, StoreError>;

    /// Zero the window counter and stamp `now` as its start.
    async fn reset_quota_window(&self, user: &UserId, now: Timestamp) -> Result<(), StoreError>;

    /// Count one roll against the window (never past `max_rolls`) and the
    /// cumulative roll counter.
    async fn consume_roll(&self, user: &UserId, max_rolls: i32) -> Result<(), StoreError>;

    /// Atomically advance the lucky counter by one roll.
    async fn advance_lucky_counter(
        &self,
        user: &UserId,
        interval: i32,
    ) -> Result<LuckyAdvance, StoreError>;

    async fn lucky_count(&self, user: &UserId) -> Result<i32, StoreError>;

    /// Take back one `consume_roll` and put the lucky counter back to
    /// `lucky_count`. Used when a roll fails after its counters were written.
    async fn undo_roll(&self, user: &UserId, lucky_count: i32) -> Result<(), StoreError>;
}

/// Global character ownership. At most one owner per character, ever.
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    /// Insert an ownership record unless one exists for the character.
    /// Returns whether this call created it.
    async fn claim_if_unowned(
        &self,
        user: &UserId,
        character: &Character,
    ) -> Result<bool, StoreError>;

    async fn owner_of(&self, character_id: CharacterId) -> Result<Option<UserId>, StoreError>;

    /// The ownership record for a character, if it is owned.
    async fn find_owned(
        &self,
        character_id: CharacterId,
    ) -> Result<Option<OwnedCharacter>, StoreError>;

    async fn user_owns(&self, user: &UserId, character_id: CharacterId)
        -> Result<bool, StoreError>;

    /// Swap two characters between two users in one transaction. Both
    /// ownerships are re-checked under lock; returns `false` and changes
    /// nothing when either no longer holds.
    async fn swap_ownership(
        &self,
        user_a: &UserId,
        user_b: &UserId,
        character_of_a: CharacterId,
        character_of_b: CharacterId,
    ) -> Result<bool, StoreError>;

    async fn collection(
        &self,
        user: &UserId,
        page: u32,
        page_size: u32,
    ) -> Result<CollectionPage, StoreError>;

    /// Case-insensitive lookup of a character by name within one user's
    /// collection.
    async fn find_owned_by_name(
        &self,
        user: &UserId,
        name: &str,
    ) -> Result<Option<OwnedCharacter>, StoreError>;

    /// Delete an ownership record. Returns whether one existed.
    async fn remove_ownership(&self, character_id: CharacterId) -> Result<bool, StoreError>;
}

/// Append-only roll log.
#[async_trait]
pub trait RollHistoryLog: Send + Sync {
    async fn record_roll(&self, record: &RollRecord) -> Result<(), StoreError>;
}

/// Everything the engine needs from persistent storage.
#[async_trait]
pub trait GameStore: PointsLedger + RollQuotaStore + OwnershipStore + RollHistoryLog {
    async fn health_check(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Catalog trait
// ---------------------------------------------------------------------------

/// Source of character metadata.
#[async_trait]
pub trait CharacterCatalog: Send + Sync {
    /// Look up a character with its primary appearance. `Ok(None)` means
    /// the id does not exist.
    async fn fetch(&self, id: CharacterId) -> Result<Option<Character>, CatalogError>;

    /// One page (1-based) of the most favorited characters.
    async fn top(&self, page: u32) -> Result<Vec<Character>, CatalogError>;

    async fn search(&self, query: &str) -> Result<Vec<Character>, CatalogError>;

    async fn health_check(&self) -> Result<(), CatalogError>;
}
