//! Roll history rows.

use serde::Serialize;
use sqlx::FromRow;
use waifu_core::types::{DbId, Timestamp};

/// A row from `rolls_history`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RollHistoryEntry {
    pub id: DbId,
    pub user_id: DbId,
    pub character_id: i64,
    pub character_name: Option<String>,
    pub character_favorites: i64,
    pub points_earned: i64,
    pub is_duplicate: bool,
    pub rolled_at: Timestamp,
}

/// DTO for appending a history entry, addressed by the player's external id.
#[derive(Debug, Clone)]
pub struct CreateRollHistory {
    pub discord_id: String,
    pub character_id: i64,
    pub character_name: String,
    pub character_favorites: i64,
    pub points_earned: i64,
    pub is_duplicate: bool,
}
