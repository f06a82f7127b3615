//! Player rows.

use serde::Serialize;
use sqlx::FromRow;
use waifu_core::types::{DbId, Timestamp};

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub discord_id: String,
    pub username: String,
    pub total_points: i64,
    pub rolls_count: i32,
    pub last_roll: Option<Timestamp>,
    pub rolls_in_period: i32,
    pub period_start_time: Timestamp,
    pub lucky_roll_count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Leaderboard projection.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PointsRow {
    pub discord_id: String,
    pub username: String,
    pub total_points: i64,
}

/// Rate-limit projection.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct QuotaRow {
    pub rolls_in_period: i32,
    pub period_start_time: Timestamp,
}
