//! Repository for the `user_characters` table.
//!
//! The `uq_user_characters_character_id` constraint is what makes ownership
//! global: every write path either relies on it (`ON CONFLICT DO NOTHING`)
//! or locks the affected rows first.

use sqlx::PgPool;
use waifu_core::character::Character;

use crate::models::user_character::UserCharacter;

/// Column list for ownership rows joined with `users` as `u`.
const COLUMNS: &str = "uc.id, uc.user_id, u.discord_id AS owner_discord_id, uc.character_id, \
     uc.character_name, uc.character_image_url, uc.anime_title, uc.character_role, \
     uc.character_favorites, uc.claimed_at";

/// Ownership reads and atomic ownership writes.
pub struct UserCharacterRepo;

impl UserCharacterRepo {
    /// Insert an ownership record for `discord_id` unless the character is
    /// already owned. Returns `true` only if this call inserted the row.
    pub async fn claim_if_unowned(
        pool: &PgPool,
        discord_id: &str,
        character: &Character,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO user_characters
                (user_id, character_id, character_name, character_image_url,
                 anime_title, character_role, character_favorites)
             SELECT u.id, $2, $3, $4, $5, $6, $7
             FROM users u
             WHERE u.discord_id = $1
             ON CONFLICT (character_id) DO NOTHING",
        )
        .bind(discord_id)
        .bind(character.id)
        .bind(&character.name)
        .bind(&character.image_url)
        .bind(character.anime_title())
        .bind(character.role())
        .bind(character.favorites)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// External id of the character's owner, if any.
    pub async fn owner_of(pool: &PgPool, character_id: i64) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT u.discord_id FROM user_characters uc
             JOIN users u ON u.id = uc.user_id
             WHERE uc.character_id = $1",
        )
        .bind(character_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_character_id(
        pool: &PgPool,
        character_id: i64,
    ) -> Result<Option<UserCharacter>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_characters uc
             JOIN users u ON u.id = uc.user_id
             WHERE uc.character_id = $1"
        );
        sqlx::query_as::<_, UserCharacter>(&query)
            .bind(character_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn user_owns(
        pool: &PgPool,
        discord_id: &str,
        character_id: i64,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM user_characters uc
                JOIN users u ON u.id = uc.user_id
                WHERE uc.character_id = $2 AND u.discord_id = $1
             )",
        )
        .bind(discord_id)
        .bind(character_id)
        .fetch_one(pool)
        .await
    }

    /// Swap ownership of two characters in one transaction.
    ///
    /// Both rows are locked (in character id order, so concurrent swaps
    /// touching the same characters cannot deadlock) and their owners
    /// re-checked before anything is written. Returns `false` and rolls
    /// back when either precondition fails.
    pub async fn swap(
        pool: &PgPool,
        discord_a: &str,
        discord_b: &str,
        character_of_a: i64,
        character_of_b: i64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let locked: Vec<(i64, i64, String)> = sqlx::query_as(
            "SELECT uc.character_id, uc.user_id, u.discord_id
             FROM user_characters uc
             JOIN users u ON u.id = uc.user_id
             WHERE uc.character_id = ANY($1)
             ORDER BY uc.character_id
             FOR UPDATE OF uc",
        )
        .bind(vec![character_of_a, character_of_b])
        .fetch_all(&mut *tx)
        .await?;

        let holder = |character_id: i64| {
            locked
                .iter()
                .find(|(id, _, _)| *id == character_id)
                .map(|(_, user_id, discord_id)| (*user_id, discord_id.as_str()))
        };

        let (Some((user_a, owner_a)), Some((user_b, owner_b))) =
            (holder(character_of_a), holder(character_of_b))
        else {
            tx.rollback().await?;
            return Ok(false);
        };

        if owner_a != discord_a || owner_b != discord_b {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE user_characters SET
                user_id = CASE character_id WHEN $1 THEN $4 ELSE $3 END,
                claimed_at = NOW()
             WHERE character_id IN ($1, $2)",
        )
        .bind(character_of_a)
        .bind(character_of_b)
        .bind(user_a)
        .bind(user_b)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// One page of a player's collection, newest first.
    pub async fn list_by_owner(
        pool: &PgPool,
        discord_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserCharacter>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_characters uc
             JOIN users u ON u.id = uc.user_id
             WHERE u.discord_id = $1
             ORDER BY uc.claimed_at DESC, uc.id DESC
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, UserCharacter>(&query)
            .bind(discord_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count_by_owner(pool: &PgPool, discord_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_characters uc
             JOIN users u ON u.id = uc.user_id
             WHERE u.discord_id = $1",
        )
        .bind(discord_id)
        .fetch_one(pool)
        .await
    }

    /// Case-insensitive exact name match within one player's collection.
    pub async fn find_by_owner_and_name(
        pool: &PgPool,
        discord_id: &str,
        name: &str,
    ) -> Result<Option<UserCharacter>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_characters uc
             JOIN users u ON u.id = uc.user_id
             WHERE u.discord_id = $1 AND LOWER(uc.character_name) = LOWER($2)
             ORDER BY uc.claimed_at ASC
             LIMIT 1"
        );
        sqlx::query_as::<_, UserCharacter>(&query)
            .bind(discord_id)
            .bind(name.trim())
            .fetch_optional(pool)
            .await
    }

    /// Delete the ownership record for a character. Returns `true` if one
    /// was removed.
    pub async fn delete_by_character_id(
        pool: &PgPool,
        character_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_characters WHERE character_id = $1")
            .bind(character_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
