//! [`PgStore`]: the PostgreSQL implementation of the engine's storage ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use waifu_core::character::Character;
use waifu_core::lucky::LuckyAdvance;
use waifu_core::ports::{
    CollectionPage, GameStore, LeaderboardEntry, OwnedCharacter, OwnershipStore, PointsLedger,
    RollHistoryLog, RollQuotaStore, RollRecord, StoreError,
};
use waifu_core::quota::QuotaWindow;
use waifu_core::types::{CharacterId, Timestamp, UserId};

use crate::models::roll_history::CreateRollHistory;
use crate::repositories::{RollHistoryRepo, UserCharacterRepo, UserRepo};
use crate::DbPool;

/// Storage ports backed by a connection pool. Cheap to clone.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Classify a sqlx error: connection-level failures are `Unavailable`,
/// everything else is a failed query.
fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(Box::new(err)),
        other => StoreError::Query(Box::new(other)),
    }
}

#[async_trait]
impl PointsLedger for PgStore {
    async fn ensure_user(&self, user: &UserId, username: &str) -> Result<(), StoreError> {
        UserRepo::upsert(&self.pool, user.as_str(), username)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn add_points(&self, user: &UserId, points: i64) -> Result<i64, StoreError> {
        let balance = UserRepo::add_points(&self.pool, user.as_str(), points)
            .await
            .map_err(store_error)?;
        if balance.is_none() {
            tracing::warn!(user = %user, points, "Points awarded to unknown user were dropped");
        }
        Ok(balance.unwrap_or(0))
    }

    async fn deduct_points(&self, user: &UserId, points: i64) -> Result<i64, StoreError> {
        let balance = UserRepo::deduct_points(&self.pool, user.as_str(), points)
            .await
            .map_err(store_error)?;
        Ok(balance.unwrap_or(0))
    }

    async fn try_spend(&self, user: &UserId, cost: i64) -> Result<Option<i64>, StoreError> {
        UserRepo::try_spend(&self.pool, user.as_str(), cost)
            .await
            .map_err(store_error)
    }

    async fn balance(&self, user: &UserId) -> Result<i64, StoreError> {
        let balance = UserRepo::balance(&self.pool, user.as_str())
            .await
            .map_err(store_error)?;
        Ok(balance.unwrap_or(0))
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let rows = UserRepo::top_by_points(&self.pool, limit)
            .await
            .map_err(store_error)?;
        Ok(rows
            .into_iter()
            .map(|row| LeaderboardEntry {
                user_id: UserId::new(row.discord_id),
                username: row.username,
                total_points: row.total_points,
            })
            .collect())
    }
}

#[async_trait]
impl RollQuotaStore for PgStore {
    async fn quota_window(&self, user: &UserId) -> Result<QuotaWindow, StoreError> {
        let row = UserRepo::quota_window(&self.pool, user.as_str())
            .await
            .map_err(store_error)?;
        Ok(match row {
            Some(row) => QuotaWindow {
                rolls_in_period: row.rolls_in_period,
                period_start: row.period_start_time,
            },
            None => QuotaWindow {
                rolls_in_period: 0,
                period_start: DateTime::<Utc>::UNIX_EPOCH,
            },
        })
    }

    async fn reset_quota_window(&self, user: &UserId, now: Timestamp) -> Result<(), StoreError> {
        UserRepo::reset_quota_window(&self.pool, user.as_str(), now)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn consume_roll(&self, user: &UserId, max_rolls: i32) -> Result<(), StoreError> {
        UserRepo::consume_roll(&self.pool, user.as_str(), max_rolls)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn advance_lucky_counter(
        &self,
        user: &UserId,
        interval: i32,
    ) -> Result<LuckyAdvance, StoreError> {
        let stored = UserRepo::advance_lucky_counter(&self.pool, user.as_str(), interval)
            .await
            .map_err(store_error)?;
        Ok(match stored {
            Some(count) => LuckyAdvance {
                count,
                lucky: count == 0,
            },
            None => LuckyAdvance {
                count: 0,
                lucky: false,
            },
        })
    }

    async fn lucky_count(&self, user: &UserId) -> Result<i32, StoreError> {
        let count = UserRepo::lucky_count(&self.pool, user.as_str())
            .await
            .map_err(store_error)?;
        Ok(count.unwrap_or(0))
    }

    async fn undo_roll(&self, user: &UserId, lucky_count: i32) -> Result<(), StoreError> {
        UserRepo::undo_roll(&self.pool, user.as_str(), lucky_count)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl OwnershipStore for PgStore {
    async fn claim_if_unowned(
        &self,
        user: &UserId,
        character: &Character,
    ) -> Result<bool, StoreError> {
        UserCharacterRepo::claim_if_unowned(&self.pool, user.as_str(), character)
            .await
            .map_err(store_error)
    }

    async fn owner_of(&self, character_id: CharacterId) -> Result<Option<UserId>, StoreError> {
        let owner = UserCharacterRepo::owner_of(&self.pool, character_id)
            .await
            .map_err(store_error)?;
        Ok(owner.map(UserId::new))
    }

    async fn find_owned(
        &self,
        character_id: CharacterId,
    ) -> Result<Option<OwnedCharacter>, StoreError> {
        let row = UserCharacterRepo::find_by_character_id(&self.pool, character_id)
            .await
            .map_err(store_error)?;
        Ok(row.map(OwnedCharacter::from))
    }

    async fn user_owns(
        &self,
        user: &UserId,
        character_id: CharacterId,
    ) -> Result<bool, StoreError> {
        UserCharacterRepo::user_owns(&self.pool, user.as_str(), character_id)
            .await
            .map_err(store_error)
    }

    async fn swap_ownership(
        &self,
        user_a: &UserId,
        user_b: &UserId,
        character_of_a: CharacterId,
        character_of_b: CharacterId,
    ) -> Result<bool, StoreError> {
        UserCharacterRepo::swap(
            &self.pool,
            user_a.as_str(),
            user_b.as_str(),
            character_of_a,
            character_of_b,
        )
        .await
        .map_err(store_error)
    }

    async fn collection(
        &self,
        user: &UserId,
        page: u32,
        page_size: u32,
    ) -> Result<CollectionPage, StoreError> {
        let page_size = i64::from(page_size.max(1));
        let total = UserCharacterRepo::count_by_owner(&self.pool, user.as_str())
            .await
            .map_err(store_error)?;
        let rows = UserCharacterRepo::list_by_owner(
            &self.pool,
            user.as_str(),
            page_size,
            i64::from(page) * page_size,
        )
        .await
        .map_err(store_error)?;

        let total_pages = u32::try_from((total + page_size - 1) / page_size).unwrap_or(u32::MAX);
        Ok(CollectionPage {
            owner: user.clone(),
            items: rows.into_iter().map(OwnedCharacter::from).collect(),
            page,
            total_pages,
            total,
        })
    }

    async fn find_owned_by_name(
        &self,
        user: &UserId,
        name: &str,
    ) -> Result<Option<OwnedCharacter>, StoreError> {
        let row = UserCharacterRepo::find_by_owner_and_name(&self.pool, user.as_str(), name)
            .await
            .map_err(store_error)?;
        Ok(row.map(OwnedCharacter::from))
    }

    async fn remove_ownership(&self, character_id: CharacterId) -> Result<bool, StoreError> {
        UserCharacterRepo::delete_by_character_id(&self.pool, character_id)
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl RollHistoryLog for PgStore {
    async fn record_roll(&self, record: &RollRecord) -> Result<(), StoreError> {
        let input = CreateRollHistory {
            discord_id: record.user.as_str().to_string(),
            character_id: record.character_id,
            character_name: record.character_name.clone(),
            character_favorites: record.favorites,
            points_earned: record.points,
            is_duplicate: record.is_duplicate,
        };
        RollHistoryRepo::create(&self.pool, &input)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl GameStore for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await.map_err(store_error)
    }
}
