//! Repository for the append-only `rolls_history` table.

use sqlx::PgPool;

use crate::models::roll_history::{CreateRollHistory, RollHistoryEntry};

const COLUMNS: &str = "rh.id, rh.user_id, rh.character_id, rh.character_name, \
     rh.character_favorites, rh.points_earned, rh.is_duplicate, rh.rolled_at";

/// Append and read roll history. Rows are never updated or deleted.
pub struct RollHistoryRepo;

impl RollHistoryRepo {
    /// Append one entry. Returns `None` when the player row does not exist.
    pub async fn create(
        pool: &PgPool,
        input: &CreateRollHistory,
    ) -> Result<Option<RollHistoryEntry>, sqlx::Error> {
        sqlx::query_as::<_, RollHistoryEntry>(
            "INSERT INTO rolls_history
                (user_id, character_id, character_name, character_favorites,
                 points_earned, is_duplicate)
             SELECT u.id, $2, $3, $4, $5, $6
             FROM users u
             WHERE u.discord_id = $1
             RETURNING id, user_id, character_id, character_name, character_favorites,
                       points_earned, is_duplicate, rolled_at",
        )
        .bind(&input.discord_id)
        .bind(input.character_id)
        .bind(&input.character_name)
        .bind(input.character_favorites)
        .bind(input.points_earned)
        .bind(input.is_duplicate)
        .fetch_optional(pool)
        .await
    }

    /// Most recent entries for a player.
    pub async fn list_recent_by_user(
        pool: &PgPool,
        discord_id: &str,
        limit: i64,
    ) -> Result<Vec<RollHistoryEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM rolls_history rh
             JOIN users u ON u.id = rh.user_id
             WHERE u.discord_id = $1
             ORDER BY rh.rolled_at DESC, rh.id DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, RollHistoryEntry>(&query)
            .bind(discord_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
