//! Ownership rows.

use serde::Serialize;
use sqlx::FromRow;
use waifu_core::ports::OwnedCharacter;
use waifu_core::types::{DbId, Timestamp, UserId};

/// A row from `user_characters` joined with the owner's external id.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserCharacter {
    pub id: DbId,
    pub user_id: DbId,
    pub owner_discord_id: String,
    pub character_id: i64,
    pub character_name: String,
    pub character_image_url: Option<String>,
    pub anime_title: Option<String>,
    pub character_role: Option<String>,
    pub character_favorites: i64,
    pub claimed_at: Timestamp,
}

impl From<UserCharacter> for OwnedCharacter {
    fn from(row: UserCharacter) -> Self {
        OwnedCharacter {
            owner: UserId::new(row.owner_discord_id),
            character_id: row.character_id,
            name: row.character_name,
            image_url: row.character_image_url,
            anime_title: row.anime_title,
            role: row.character_role,
            favorites: row.character_favorites,
            claimed_at: row.claimed_at,
        }
    }
}
