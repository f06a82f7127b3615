//! Repository for the `users` table: balances, quota window, lucky counter.

use sqlx::PgPool;
use waifu_core::types::Timestamp;

use crate::models::user::{PointsRow, QuotaRow, User};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, discord_id, username, total_points, rolls_count, last_roll, \
     rolls_in_period, period_start_time, lucky_roll_count, created_at, updated_at";

/// Provides point, quota and counter operations for players.
pub struct UserRepo;

impl UserRepo {
    // ── Identity ─────────────────────────────────────────────────────────

    /// Insert a player on first contact, or refresh the display name.
    pub async fn upsert(
        pool: &PgPool,
        discord_id: &str,
        username: &str,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (discord_id, username)
             VALUES ($1, $2)
             ON CONFLICT (discord_id) DO UPDATE SET
                username = EXCLUDED.username,
                updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(discord_id)
            .bind(username)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_discord_id(
        pool: &PgPool,
        discord_id: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE discord_id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(discord_id)
            .fetch_optional(pool)
            .await
    }

    // ── Points ───────────────────────────────────────────────────────────

    /// Add points. Returns the new balance, or `None` for an unknown player.
    pub async fn add_points(
        pool: &PgPool,
        discord_id: &str,
        points: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE users SET total_points = total_points + $2, updated_at = NOW()
             WHERE discord_id = $1
             RETURNING total_points",
        )
        .bind(discord_id)
        .bind(points)
        .fetch_optional(pool)
        .await
    }

    /// Remove points, flooring at zero.
    pub async fn deduct_points(
        pool: &PgPool,
        discord_id: &str,
        points: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE users SET total_points = GREATEST(total_points - $2, 0), updated_at = NOW()
             WHERE discord_id = $1
             RETURNING total_points",
        )
        .bind(discord_id)
        .bind(points)
        .fetch_optional(pool)
        .await
    }

    /// Conditional decrement: only applies when the balance covers `cost`.
    pub async fn try_spend(
        pool: &PgPool,
        discord_id: &str,
        cost: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE users SET total_points = total_points - $2, updated_at = NOW()
             WHERE discord_id = $1 AND total_points >= $2
             RETURNING total_points",
        )
        .bind(discord_id)
        .bind(cost)
        .fetch_optional(pool)
        .await
    }

    pub async fn balance(pool: &PgPool, discord_id: &str) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT total_points FROM users WHERE discord_id = $1")
            .bind(discord_id)
            .fetch_optional(pool)
            .await
    }

    /// Highest balances first.
    pub async fn top_by_points(pool: &PgPool, limit: i64) -> Result<Vec<PointsRow>, sqlx::Error> {
        sqlx::query_as::<_, PointsRow>(
            "SELECT discord_id, username, total_points FROM users
             ORDER BY total_points DESC, id ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    // ── Quota window ─────────────────────────────────────────────────────

    pub async fn quota_window(
        pool: &PgPool,
        discord_id: &str,
    ) -> Result<Option<QuotaRow>, sqlx::Error> {
        sqlx::query_as::<_, QuotaRow>(
            "SELECT rolls_in_period, period_start_time FROM users WHERE discord_id = $1",
        )
        .bind(discord_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn reset_quota_window(
        pool: &PgPool,
        discord_id: &str,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET rolls_in_period = 0, period_start_time = $2, updated_at = NOW()
             WHERE discord_id = $1",
        )
        .bind(discord_id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count one roll. The window counter is capped at `max_rolls`.
    pub async fn consume_roll(
        pool: &PgPool,
        discord_id: &str,
        max_rolls: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET
                rolls_in_period = LEAST(rolls_in_period + 1, $2),
                rolls_count = rolls_count + 1,
                last_roll = NOW(),
                updated_at = NOW()
             WHERE discord_id = $1",
        )
        .bind(discord_id)
        .bind(max_rolls)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Reverse one `consume_roll` and restore the lucky counter.
    pub async fn undo_roll(
        pool: &PgPool,
        discord_id: &str,
        lucky_count: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET
                rolls_in_period = GREATEST(rolls_in_period - 1, 0),
                rolls_count = GREATEST(rolls_count - 1, 0),
                lucky_roll_count = $2,
                updated_at = NOW()
             WHERE discord_id = $1",
        )
        .bind(discord_id)
        .bind(lucky_count)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Lucky counter ────────────────────────────────────────────────────

    /// Advance the lucky counter, resetting it to zero when the incremented
    /// value is a multiple of `interval`. Returns the stored value; zero
    /// means this roll was lucky.
    pub async fn advance_lucky_counter(
        pool: &PgPool,
        discord_id: &str,
        interval: i32,
    ) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE users SET
                lucky_roll_count = CASE
                    WHEN (lucky_roll_count + 1) % $2 = 0 THEN 0
                    ELSE lucky_roll_count + 1
                END,
                updated_at = NOW()
             WHERE discord_id = $1
             RETURNING lucky_roll_count",
        )
        .bind(discord_id)
        .bind(interval)
        .fetch_optional(pool)
        .await
    }

    pub async fn lucky_count(pool: &PgPool, discord_id: &str) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, i32>("SELECT lucky_roll_count FROM users WHERE discord_id = $1")
            .bind(discord_id)
            .fetch_optional(pool)
            .await
    }
}
