//! [`GameService`]: the facade request handlers call.
//!
//! Roll, claim, snipe and the read-side commands live here; trades, packs
//! and admin operations are implemented in their own modules as further
//! `impl GameService` blocks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use waifu_core::character::Character;
use waifu_core::config::{GameConfig, HistoryWritePolicy};
use waifu_core::lucky;
use waifu_core::outcome::RollOutcome;
use waifu_core::points::{self, DUPLICATE_BONUS};
use waifu_core::ports::{
    CharacterCatalog, CollectionPage, GameStore, LeaderboardEntry, RollRecord,
};
use waifu_core::quota;
use waifu_core::token::{token_millis, ClaimKey, Interaction};
use waifu_core::types::UserId;
use waifu_events::{EventBus, GameEvent, GameEventKind};

use crate::admin::{GiftBook, GiftResult};
use crate::claims::{BeginError, ClaimRegistry, ClaimResult, PendingClaim, Resolver, SnipeResult};
use crate::cooldown::{Busy, SnipeCooldowns};
use crate::error::EngineResult;
use crate::locks::RollLocks;
use crate::packs::{PackBook, PackResult};
use crate::picker::{IdPicker, RandomIds};
use crate::scheduler::{Scheduler, TaskKey};
use crate::trades::{TradeBook, TradeResult};

/// Characters per collection page.
pub const COLLECTION_PAGE_SIZE: u32 = 10;

/// Characters per catalog top page.
pub const TOP_PAGE_SIZE: usize = 25;

pub const DEFAULT_LEADERBOARD_LIMIT: i64 = 10;
pub const MAX_LEADERBOARD_LIMIT: i64 = 50;

/// In-memory coordination state. One instance per process.
#[derive(Default)]
pub(crate) struct GameState {
    pub(crate) roll_locks: RollLocks,
    pub(crate) cooldowns: SnipeCooldowns,
    pub(crate) scheduler: Scheduler,
    pub(crate) claims: ClaimRegistry,
    pub(crate) trades: TradeBook,
    pub(crate) packs: PackBook,
    pub(crate) gifts: GiftBook,
}

/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct GameService {
    pub(crate) store: Arc<dyn GameStore>,
    pub(crate) catalog: Arc<dyn CharacterCatalog>,
    pub(crate) ids: Arc<dyn IdPicker>,
    pub(crate) config: Arc<GameConfig>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) state: Arc<GameState>,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RollResult {
    Rolled {
        outcome: RollOutcome,
        /// Rolls left in the current window after this one.
        rolls_remaining: i32,
        rolls_until_lucky: i32,
    },
    RateLimited {
        rolls_remaining: i32,
        wait_ms: u64,
    },
    /// Every attempted id was missing from the catalog. The roll still
    /// counted against the quota.
    NoCharacterFound {
        attempts: u32,
        rolls_remaining: i32,
        rolls_until_lucky: i32,
    },
    /// The player already has a roll in flight.
    RollInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointsView {
    pub user_id: UserId,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LuckyView {
    pub user_id: UserId,
    pub count: i32,
    pub interval: i32,
    pub rolls_until_lucky: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedCharacter {
    pub rank: usize,
    pub character: Character,
    pub owner: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopPage {
    pub page: u32,
    pub entries: Vec<RankedCharacter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub character: Character,
    pub owner: Option<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub store: bool,
    pub catalog: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.store && self.catalog
    }
}

/// Result of a decoded button click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "interaction", content = "payload", rename_all = "snake_case")]
pub enum InteractionResult {
    Claim(ClaimResult),
    Snipe(SnipeResult),
    Collection(CollectionPage),
    Trade(TradeResult),
    Pack(PackResult),
    Gift(GiftResult),
    Top(TopPage),
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Whole seconds, rounded up so a running cooldown never reads as zero.
pub(crate) fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

fn roll_record(user: &UserId, character: &Character, points: i64, is_duplicate: bool) -> RollRecord {
    RollRecord {
        user: user.clone(),
        character_id: character.id,
        character_name: character.name.clone(),
        favorites: character.favorites,
        points,
        is_duplicate,
    }
}

impl GameService {
    pub fn new(
        store: Arc<dyn GameStore>,
        catalog: Arc<dyn CharacterCatalog>,
        config: GameConfig,
        events: Arc<EventBus>,
    ) -> Self {
        Self::with_shutdown(store, catalog, config, events, CancellationToken::new())
    }

    /// Pending timers are dropped when `shutdown` is cancelled.
    pub fn with_shutdown(
        store: Arc<dyn GameStore>,
        catalog: Arc<dyn CharacterCatalog>,
        config: GameConfig,
        events: Arc<EventBus>,
        shutdown: CancellationToken,
    ) -> Self {
        let state = GameState {
            scheduler: Scheduler::new(shutdown),
            ..Default::default()
        };
        Self {
            store,
            catalog,
            ids: Arc::new(RandomIds),
            config: Arc::new(config),
            events,
            state: Arc::new(state),
        }
    }

    pub fn with_id_picker(mut self, ids: Arc<dyn IdPicker>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Number of timers waiting to fire.
    pub fn pending_tasks(&self) -> usize {
        self.state.scheduler.pending()
    }

    /// Cancel every pending timer.
    pub fn shutdown(&self) {
        self.state.scheduler.shutdown();
    }

    pub(crate) fn publish(&self, kind: GameEventKind, token: Option<String>) {
        let mut event = GameEvent::new(kind);
        if let Some(token) = token {
            event = event.with_token(token);
        }
        self.events.publish(event);
    }

    /// Append to the roll history under the configured failure policy.
    pub(crate) async fn record_history(
        &self,
        user: &UserId,
        character: &Character,
        points: i64,
        is_duplicate: bool,
    ) -> EngineResult<()> {
        match self.config.history_policy {
            HistoryWritePolicy::BestEffort => {
                self.log_history(user, character, points, is_duplicate).await;
                Ok(())
            }
            HistoryWritePolicy::Strict => {
                let record = roll_record(user, character, points, is_duplicate);
                Ok(self.store.record_roll(&record).await?)
            }
        }
    }

    /// Append to the roll history whatever the policy, logging failures.
    /// For paths that already changed state they cannot take back.
    pub(crate) async fn log_history(
        &self,
        user: &UserId,
        character: &Character,
        points: i64,
        is_duplicate: bool,
    ) {
        let record = roll_record(user, character, points, is_duplicate);
        if let Err(e) = self.store.record_roll(&record).await {
            tracing::warn!(
                user = %user,
                character_id = character.id,
                error = %e,
                "Roll history write failed",
            );
        }
    }

    /// Try up to `max_fetch_attempts` random ids. `Ok(None)` when none of
    /// them exist; transient failures abort immediately.
    pub(crate) async fn draw_random(&self) -> EngineResult<Option<Character>> {
        for attempt in 1..=self.config.max_fetch_attempts.max(1) {
            let id = self.ids.character_id(self.config.max_character_id);
            match self.catalog.fetch(id).await? {
                Some(character) => return Ok(Some(character)),
                None => tracing::debug!(character_id = id, attempt, "Rolled id not in catalog"),
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Roll
    // -----------------------------------------------------------------------

    /// Roll a random character for `user`.
    ///
    /// The roll lock is held from the quota check until the pending claim is
    /// registered and released on every exit path. Transient store or
    /// catalog failures return an error and leave the player's counters and
    /// balance as they were.
    pub async fn handle_roll(&self, user: &UserId, username: &str) -> EngineResult<RollResult> {
        let Some(_guard) = self.state.roll_locks.try_acquire(user) else {
            tracing::debug!(user = %user, "Roll rejected, another roll in flight");
            return Ok(RollResult::RollInProgress);
        };

        self.store.ensure_user(user, username).await?;

        let now = Utc::now();
        let window = self.store.quota_window(user).await?;
        let decision = quota::check(&window, now, &self.config.quota);
        if !decision.allowed {
            tracing::debug!(user = %user, wait_ms = millis(decision.wait), "Roll rate limited");
            return Ok(RollResult::RateLimited {
                rolls_remaining: decision.rolls_remaining,
                wait_ms: millis(decision.wait),
            });
        }
        let rolls_remaining = decision.rolls_remaining - 1;

        // Every read happens before the counters move.
        let drawn = self.draw_random().await?;
        let owner = match &drawn {
            Some(character) => self.store.owner_of(character.id).await?,
            None => None,
        };
        let previous_lucky = self.store.lucky_count(user).await?;

        if decision.reset {
            self.store.reset_quota_window(user, now).await?;
        }
        self.store
            .consume_roll(user, self.config.quota.max_rolls)
            .await?;
        let advance = match self
            .store
            .advance_lucky_counter(user, self.config.lucky_interval)
            .await
        {
            Ok(advance) => advance,
            Err(e) => {
                self.undo_roll(user, previous_lucky).await;
                return Err(e.into());
            }
        };
        let rolls_until_lucky = lucky::rolls_until_lucky(advance.count, self.config.lucky_interval);

        let Some(character) = drawn else {
            tracing::info!(user = %user, lucky = advance.lucky, "Roll found no character");
            return Ok(RollResult::NoCharacterFound {
                attempts: self.config.max_fetch_attempts.max(1),
                rolls_remaining,
                rolls_until_lucky,
            });
        };

        match self.settle_roll(user, character, owner, advance.lucky).await {
            Ok(outcome) => Ok(RollResult::Rolled {
                outcome,
                rolls_remaining,
                rolls_until_lucky,
            }),
            Err(e) => {
                self.undo_roll(user, previous_lucky).await;
                Err(e)
            }
        }
    }

    /// Award the duplicate bonus or open a pending claim.
    async fn settle_roll(
        &self,
        user: &UserId,
        character: Character,
        owner: Option<UserId>,
        lucky: bool,
    ) -> EngineResult<RollOutcome> {
        if let Some(owner) = owner {
            self.record_history(user, &character, DUPLICATE_BONUS, true)
                .await?;
            self.store.add_points(user, DUPLICATE_BONUS).await?;
            tracing::info!(
                user = %user,
                character_id = character.id,
                owner = %owner,
                "Rolled a duplicate",
            );
            return Ok(RollOutcome::Duplicate {
                character,
                owner,
                bonus: DUPLICATE_BONUS,
            });
        }

        let points = points::character_points(&character, lucky);
        self.record_history(user, &character, points, false).await?;

        let claim = ClaimKey {
            roller: user.clone(),
            character_id: character.id,
            issued_at_ms: token_millis(Utc::now()),
        };
        self.state
            .claims
            .register(PendingClaim::new(
                claim.clone(),
                character.clone(),
                points,
                lucky,
                Instant::now() + self.config.claim_window,
            ))
            .await;
        self.schedule_claim_expiry(claim.clone());

        tracing::info!(
            user = %user,
            character_id = character.id,
            points,
            lucky,
            "Rolled a claimable character",
        );

        Ok(if lucky {
            RollOutcome::Lucky {
                claim,
                character,
                points,
            }
        } else {
            RollOutcome::Fresh {
                claim,
                character,
                points,
            }
        })
    }

    async fn undo_roll(&self, user: &UserId, lucky_count: i32) {
        if let Err(e) = self.store.undo_roll(user, lucky_count).await {
            tracing::error!(user = %user, error = %e, "Failed to undo roll counters");
        }
    }

    fn schedule_claim_expiry(&self, claim: ClaimKey) {
        let service = self.clone();
        self.state.scheduler.schedule(
            TaskKey::ClaimExpiry(claim.clone()),
            self.config.claim_window,
            async move {
                service.expire_claim(&claim).await;
            },
        );
    }

    async fn expire_claim(&self, claim: &ClaimKey) {
        if let Some(entry) = self.state.claims.expire(claim).await {
            self.announce_claim_expired(entry);
        }
    }

    fn announce_claim_expired(&self, entry: PendingClaim) {
        tracing::info!(
            roller = %entry.key.roller,
            character_id = entry.character.id,
            "Claim expired",
        );
        let token = Interaction::Claim(entry.key.clone()).to_string();
        self.publish(GameEventKind::ClaimExpired { claim: entry.key }, Some(token));
    }

    /// A resolution gave up without settling ownership.
    async fn release_claim(&self, claim: &ClaimKey, resolver: Resolver) {
        if let Some(expired) = self.state.claims.release(claim, resolver).await {
            self.announce_claim_expired(expired);
        }
    }

    /// Ownership is settled; the entry and its timer are done.
    async fn settle_claim(&self, claim: &ClaimKey) {
        self.state.claims.finish(claim).await;
        self.state
            .scheduler
            .cancel(&TaskKey::ClaimExpiry(claim.clone()));
    }

    // -----------------------------------------------------------------------
    // Claim / snipe
    // -----------------------------------------------------------------------

    /// The roller claims their pending character.
    pub async fn handle_claim(&self, claim: &ClaimKey, user: &UserId) -> EngineResult<ClaimResult> {
        if user != &claim.roller {
            return Ok(ClaimResult::NotYourRoll);
        }
        let entry = match self.state.claims.begin(claim, Resolver::Claim).await {
            Ok(entry) => entry,
            Err(_) => return Ok(ClaimResult::AlreadyResolved),
        };

        let won = match self.store.claim_if_unowned(user, &entry.character).await {
            Ok(won) => won,
            Err(e) => {
                self.release_claim(claim, Resolver::Claim).await;
                return Err(e.into());
            }
        };
        self.settle_claim(claim).await;

        if won {
            let balance = self.store.add_points(user, entry.points).await?;
            tracing::info!(
                user = %user,
                character_id = entry.character.id,
                points = entry.points,
                "Character claimed",
            );
            self.publish(
                GameEventKind::ClaimResolved {
                    claim: claim.clone(),
                    winner: user.clone(),
                    sniped: false,
                },
                Some(Interaction::Claim(claim.clone()).to_string()),
            );
            return Ok(ClaimResult::Claimed {
                character: entry.character,
                points: entry.points,
                balance,
            });
        }

        // The entry is gone: award the bonus before anything else can fail.
        let balance = self.store.add_points(user, DUPLICATE_BONUS).await?;
        self.log_history(user, &entry.character, DUPLICATE_BONUS, true)
            .await;
        let owner = self
            .store
            .owner_of(entry.character.id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(character_id = entry.character.id, error = %e, "Owner lookup failed");
                None
            });
        tracing::warn!(
            user = %user,
            character_id = entry.character.id,
            owner = ?owner,
            "Claim lost the ownership race",
        );
        Ok(ClaimResult::ClaimedByOther {
            character: entry.character,
            owner,
            bonus: DUPLICATE_BONUS,
            balance,
        })
    }

    /// A third party buys the pending character out from under the roller.
    pub async fn handle_snipe(
        &self,
        claim: &ClaimKey,
        sniper: &UserId,
        username: &str,
    ) -> EngineResult<SnipeResult> {
        if sniper == &claim.roller {
            return Ok(SnipeResult::OwnRoll);
        }
        let slot = match self.state.cooldowns.reserve(sniper) {
            Ok(slot) => slot,
            Err(Busy::InFlight) => return Ok(SnipeResult::SnipeInProgress),
            Err(Busy::Cooldown(remaining)) => {
                return Ok(SnipeResult::OnCooldown {
                    remaining_secs: ceil_secs(remaining),
                });
            }
        };
        let entry = match self.state.claims.begin(claim, Resolver::Snipe).await {
            Ok(entry) => entry,
            Err(BeginError::Resolved) => return Ok(SnipeResult::AlreadyResolved),
            Err(BeginError::InFlight) => return Ok(SnipeResult::SnipeInProgress),
            Err(BeginError::NotSnipeable) => return Ok(SnipeResult::NotSnipeable),
        };

        if let Err(e) = self.store.ensure_user(sniper, username).await {
            self.release_claim(claim, Resolver::Snipe).await;
            return Err(e.into());
        }

        let cost = points::snipe_cost(entry.character.favorites);
        let balance = match self.store.try_spend(sniper, cost).await {
            Ok(Some(balance)) => balance,
            Ok(None) => {
                self.release_claim(claim, Resolver::Snipe).await;
                let balance = self.store.balance(sniper).await?;
                return Ok(SnipeResult::InsufficientPoints { cost, balance });
            }
            Err(e) => {
                self.release_claim(claim, Resolver::Snipe).await;
                return Err(e.into());
            }
        };

        let won = match self.store.claim_if_unowned(sniper, &entry.character).await {
            Ok(won) => won,
            Err(e) => {
                self.release_claim(claim, Resolver::Snipe).await;
                self.refund(sniper, cost).await?;
                return Err(e.into());
            }
        };
        self.settle_claim(claim).await;

        if !won {
            tracing::warn!(
                sniper = %sniper,
                character_id = entry.character.id,
                "Snipe lost the ownership race, refunding",
            );
            self.refund(sniper, cost).await?;
            return Ok(SnipeResult::SnipeFailed {
                character: entry.character,
                refunded: cost,
            });
        }

        let cooldown = self.config.snipe_cooldown(entry.character.is_main_role());
        slot.start_cooldown(cooldown);
        tracing::info!(
            sniper = %sniper,
            roller = %claim.roller,
            character_id = entry.character.id,
            cost,
            "Character sniped",
        );
        self.publish(
            GameEventKind::ClaimResolved {
                claim: claim.clone(),
                winner: sniper.clone(),
                sniped: true,
            },
            Some(Interaction::Claim(claim.clone()).to_string()),
        );
        Ok(SnipeResult::Sniped {
            character: entry.character,
            cost,
            balance,
            cooldown_secs: cooldown.as_secs(),
        })
    }

    pub(crate) async fn refund(&self, user: &UserId, amount: i64) -> EngineResult<i64> {
        self.store.add_points(user, amount).await.map_err(|e| {
            tracing::error!(user = %user, amount, error = %e, "Refund failed");
            e.into()
        })
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub async fn points(&self, user: &UserId) -> EngineResult<PointsView> {
        Ok(PointsView {
            user_id: user.clone(),
            balance: self.store.balance(user).await?,
        })
    }

    pub async fn leaderboard(&self, limit: Option<i64>) -> EngineResult<Vec<LeaderboardEntry>> {
        let limit = limit
            .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
            .clamp(1, MAX_LEADERBOARD_LIMIT);
        Ok(self.store.leaderboard(limit).await?)
    }

    /// One zero-based page of `owner`'s collection.
    pub async fn collection(&self, owner: &UserId, page: u32) -> EngineResult<CollectionPage> {
        Ok(self
            .store
            .collection(owner, page, COLLECTION_PAGE_SIZE)
            .await?)
    }

    pub async fn lucky(&self, user: &UserId) -> EngineResult<LuckyView> {
        let count = self.store.lucky_count(user).await?;
        let interval = self.config.lucky_interval;
        Ok(LuckyView {
            user_id: user.clone(),
            count,
            interval,
            rolls_until_lucky: lucky::rolls_until_lucky(count, interval),
        })
    }

    /// One 1-based page of the most favorited characters with their owners.
    pub async fn top(&self, page: u32) -> EngineResult<TopPage> {
        let page = page.max(1);
        let characters = self.catalog.top(page).await?;
        let offset = (page as usize - 1) * TOP_PAGE_SIZE;
        let mut entries = Vec::with_capacity(characters.len());
        for (i, character) in characters.into_iter().enumerate() {
            let owner = self.store.owner_of(character.id).await?;
            entries.push(RankedCharacter {
                rank: offset + i + 1,
                character,
                owner,
            });
        }
        Ok(TopPage { page, entries })
    }

    pub async fn search(&self, query: &str) -> EngineResult<Vec<SearchHit>> {
        let characters = self.catalog.search(query).await?;
        let mut hits = Vec::with_capacity(characters.len());
        for character in characters {
            let owner = self.store.owner_of(character.id).await?;
            hits.push(SearchHit { character, owner });
        }
        Ok(hits)
    }

    /// Connectivity of the store and the catalog cache.
    pub async fn health(&self) -> HealthReport {
        let store = self.store.health_check().await;
        if let Err(e) = &store {
            tracing::error!(error = %e, "Store health check failed");
        }
        let catalog = self.catalog.health_check().await;
        if let Err(e) = &catalog {
            tracing::error!(error = %e, "Catalog health check failed");
        }
        HealthReport {
            store: store.is_ok(),
            catalog: catalog.is_ok(),
        }
    }

    /// Startup check: fail unless both dependencies answer.
    pub async fn check_connectivity(&self) -> EngineResult<()> {
        self.store.health_check().await?;
        self.catalog.health_check().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Button dispatch
    // -----------------------------------------------------------------------

    /// Route a decoded button click from `user`.
    pub async fn dispatch_interaction(
        &self,
        interaction: Interaction,
        user: &UserId,
        username: &str,
    ) -> EngineResult<InteractionResult> {
        Ok(match interaction {
            Interaction::Claim(key) => InteractionResult::Claim(self.handle_claim(&key, user).await?),
            Interaction::Snipe(key) => {
                InteractionResult::Snipe(self.handle_snipe(&key, user, username).await?)
            }
            Interaction::CollectionPage { owner, page } => {
                InteractionResult::Collection(self.collection(&owner, page).await?)
            }
            Interaction::TradeConfirm(key) => {
                InteractionResult::Trade(self.confirm_trade(&key, user).await?)
            }
            Interaction::TradeCancel(key) => {
                InteractionResult::Trade(self.cancel_trade(&key, user).await?)
            }
            Interaction::PackConfirm(key) => {
                InteractionResult::Pack(self.confirm_pack(&key, user).await?)
            }
            Interaction::PackCancel(key) => {
                InteractionResult::Pack(self.cancel_pack(&key, user).await?)
            }
            Interaction::PackSlotReveal { pack, slot } => {
                InteractionResult::Pack(self.reveal_slot(&pack, user, slot).await?)
            }
            Interaction::GiftConfirm(key) => {
                InteractionResult::Gift(self.confirm_gift(&key, user).await?)
            }
            Interaction::GiftCancel(key) => {
                InteractionResult::Gift(self.cancel_gift(&key, user).await?)
            }
            Interaction::TopPage { page } => InteractionResult::Top(self.top(page).await?),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use waifu_core::quota::QuotaPolicy;

    use super::*;
    use crate::testing::{character, Harness};

    fn roller() -> UserId {
        UserId::new("roller")
    }

    fn sniper() -> UserId {
        UserId::new("sniper")
    }

    fn generous() -> GameConfig {
        GameConfig {
            quota: QuotaPolicy {
                period: Duration::from_secs(10),
                max_rolls: 100,
            },
            ..GameConfig::default()
        }
    }

    async fn roll_claim(h: &Harness, user: &UserId) -> ClaimKey {
        let result = h.service.handle_roll(user, user.as_str()).await.unwrap();
        match result {
            RollResult::Rolled {
                outcome: RollOutcome::Fresh { claim, .. } | RollOutcome::Lucky { claim, .. },
                ..
            } => claim,
            other => panic!("expected a claimable roll, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fourth_roll_in_window_is_rate_limited() {
        let h = Harness::default();
        for id in 1..=3 {
            h.catalog.insert(character(id, 100, false));
        }
        h.ids.push([1, 2, 3]);

        for expected_left in [2, 1, 0] {
            let result = h.service.handle_roll(&roller(), "roller").await.unwrap();
            assert_matches!(result, RollResult::Rolled { rolls_remaining, .. } if rolls_remaining == expected_left);
        }

        let denied = h.service.handle_roll(&roller(), "roller").await.unwrap();
        assert_matches!(
            denied,
            RollResult::RateLimited { rolls_remaining: 0, wait_ms } if wait_ms > 0
        );
        assert_eq!(h.store.user(&roller()).unwrap().rolls_in_period, 3);
    }

    #[tokio::test]
    async fn unpopular_character_is_one_point_then_a_duplicate_bonus() {
        let h = Harness::default();
        h.catalog.insert(character(1, 0, false));

        let claim = roll_claim(&h, &roller()).await;
        let claimed = h.service.handle_claim(&claim, &roller()).await.unwrap();
        assert_matches!(claimed, ClaimResult::Claimed { points: 1, balance: 1, .. });

        let other = UserId::new("other");
        let again = h.service.handle_roll(&other, "other").await.unwrap();
        assert_matches!(
            again,
            RollResult::Rolled { outcome: RollOutcome::Duplicate { bonus: 150, .. }, .. }
        );
        assert_eq!(h.store.points(&other), 150);

        let history = h.store.history();
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_duplicate);
        assert!(history[1].is_duplicate);
        assert_eq!(history[1].points, 150);
    }

    async fn tenth_roll_points(favorites: i64, main: bool) -> (i64, bool) {
        let h = Harness::new(generous());
        h.catalog.insert(character(1, 0, false));
        h.catalog.insert(character(2, favorites, main));
        h.ids.push(std::iter::repeat(1).take(9).chain([2]));

        for _ in 0..9 {
            h.service.handle_roll(&roller(), "roller").await.unwrap();
        }
        match h.service.handle_roll(&roller(), "roller").await.unwrap() {
            RollResult::Rolled {
                outcome: RollOutcome::Lucky { points, .. },
                rolls_until_lucky,
                ..
            } => (points, rolls_until_lucky == 10),
            other => panic!("expected a lucky roll, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lucky_floor_only_raises_low_values() {
        assert_eq!(tenth_roll_points(5, true).await, (502, true));
        assert_eq!(tenth_roll_points(0, false).await, (500, true));
    }

    #[tokio::test]
    async fn lucky_rolls_cannot_be_sniped() {
        let h = Harness::new(generous());
        h.catalog.insert(character(1, 0, false));
        for _ in 0..9 {
            h.service.handle_roll(&roller(), "roller").await.unwrap();
        }
        let claim = roll_claim(&h, &roller()).await;

        h.store.seed_user(&sniper(), 10_000);
        let snipe = h.service.handle_snipe(&claim, &sniper(), "sniper").await.unwrap();
        assert_eq!(snipe, SnipeResult::NotSnipeable);
        assert_eq!(h.store.points(&sniper()), 10_000);
    }

    #[tokio::test]
    async fn concurrent_claim_and_snipe_settle_exactly_one_owner() {
        let h = Harness::default();
        h.catalog.insert(character(1, 100, false));
        h.store.seed_user(&sniper(), 1_000);
        let claim = roll_claim(&h, &roller()).await;

        let (r, s) = (roller(), sniper());
        let (claimed, sniped) = tokio::join!(
            h.service.handle_claim(&claim, &r),
            h.service.handle_snipe(&claim, &s, "sniper"),
        );
        let (claimed, sniped) = (claimed.unwrap(), sniped.unwrap());

        match (&claimed, &sniped) {
            (ClaimResult::Claimed { .. }, SnipeResult::SnipeFailed { refunded: 300, .. }) => {
                assert_eq!(h.store.owner(1), Some(roller()));
                assert_eq!(h.store.points(&sniper()), 1_000);
            }
            (ClaimResult::ClaimedByOther { bonus: 150, .. }, SnipeResult::Sniped { cost: 300, .. }) => {
                assert_eq!(h.store.owner(1), Some(sniper()));
                assert_eq!(h.store.points(&sniper()), 700);
            }
            other => panic!("both or neither resolved: {other:?}"),
        }
        assert_eq!(h.service.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn snipe_cooldown_depends_on_role() {
        let h = Harness::default();
        h.catalog.insert(character(1, 10, true));
        h.catalog.insert(character(2, 10, false));
        h.catalog.insert(character(3, 10, false));
        h.ids.push([1, 2, 3]);
        h.store.seed_user(&sniper(), 1_000);

        let main = roll_claim(&h, &roller()).await;
        let sniped = h.service.handle_snipe(&main, &sniper(), "sniper").await.unwrap();
        assert_matches!(sniped, SnipeResult::Sniped { cost: 30, cooldown_secs: 600, .. });

        let next = roll_claim(&h, &roller()).await;
        let denied = h.service.handle_snipe(&next, &sniper(), "sniper").await.unwrap();
        assert_matches!(denied, SnipeResult::OnCooldown { remaining_secs } if remaining_secs > 590 && remaining_secs <= 600);

        let other_sniper = UserId::new("other");
        h.store.seed_user(&other_sniper, 1_000);
        let side = h.service.handle_snipe(&next, &other_sniper, "other").await.unwrap();
        assert_matches!(side, SnipeResult::Sniped { cooldown_secs: 60, .. });
    }

    #[tokio::test]
    async fn one_sniper_cannot_run_two_snipes_at_once() {
        let h = Harness::default();
        h.catalog.insert(character(1, 10, true));
        h.catalog.insert(character(2, 10, true));
        h.ids.push([1, 2]);
        h.store.seed_user(&sniper(), 1_000);
        let first = roll_claim(&h, &roller()).await;
        let second = roll_claim(&h, &roller()).await;

        let s = sniper();
        let (a, b) = tokio::join!(
            h.service.handle_snipe(&first, &s, "sniper"),
            h.service.handle_snipe(&second, &s, "sniper"),
        );
        let results = [a.unwrap(), b.unwrap()];

        let won = results
            .iter()
            .filter(|r| matches!(r, SnipeResult::Sniped { .. }))
            .count();
        assert_eq!(won, 1, "{results:?}");
        assert!(results.iter().any(|r| matches!(
            r,
            SnipeResult::SnipeInProgress | SnipeResult::OnCooldown { .. }
        )));
        assert_eq!(h.store.points(&sniper()), 970);
        let owned = [h.store.owner(1), h.store.owner(2)];
        assert_eq!(owned.iter().filter(|o| **o == Some(sniper())).count(), 1);
    }

    #[tokio::test]
    async fn short_balance_cannot_snipe_and_roll_stays_open() {
        let h = Harness::default();
        h.catalog.insert(character(1, 100, false));
        h.store.seed_user(&sniper(), 299);
        let claim = roll_claim(&h, &roller()).await;

        let snipe = h.service.handle_snipe(&claim, &sniper(), "sniper").await.unwrap();
        assert_eq!(snipe, SnipeResult::InsufficientPoints { cost: 300, balance: 299 });

        let claimed = h.service.handle_claim(&claim, &roller()).await.unwrap();
        assert_matches!(claimed, ClaimResult::Claimed { .. });
    }

    #[tokio::test]
    async fn only_the_roller_claims_and_only_once() {
        let h = Harness::default();
        h.catalog.insert(character(1, 100, false));
        let claim = roll_claim(&h, &roller()).await;

        let stranger = h.service.handle_claim(&claim, &sniper()).await.unwrap();
        assert_eq!(stranger, ClaimResult::NotYourRoll);
        let own_snipe = h.service.handle_snipe(&claim, &roller(), "roller").await.unwrap();
        assert_eq!(own_snipe, SnipeResult::OwnRoll);

        h.service.handle_claim(&claim, &roller()).await.unwrap();
        let balance = h.store.points(&roller());
        let second = h.service.handle_claim(&claim, &roller()).await.unwrap();
        assert_eq!(second, ClaimResult::AlreadyResolved);
        assert_eq!(h.store.points(&roller()), balance);
    }

    #[tokio::test(start_paused = true)]
    async fn unclaimed_rolls_expire_after_the_window() {
        let h = Harness::default();
        h.catalog.insert(character(1, 100, false));
        let mut events = h.events.subscribe();
        let claim = roll_claim(&h, &roller()).await;

        tokio::time::sleep(Duration::from_secs(31)).await;
        let late = h.service.handle_claim(&claim, &roller()).await.unwrap();
        assert_eq!(late, ClaimResult::AlreadyResolved);
        assert_eq!(h.store.owner(1), None);
        assert_eq!(h.store.points(&roller()), 0);

        let event = events.try_recv().unwrap();
        assert_matches!(event.kind, GameEventKind::ClaimExpired { claim: expired } if expired == claim);
    }

    #[tokio::test]
    async fn catalog_outage_consumes_nothing() {
        let h = Harness::default();
        h.catalog.set_offline(true);

        let err = h.service.handle_roll(&roller(), "roller").await.unwrap_err();
        assert!(err.is_transient());

        let user = h.store.user(&roller()).unwrap();
        assert_eq!(user.rolls_in_period, 0);
        assert_eq!(user.lucky_roll_count, 0);
        assert!(h.store.history().is_empty());
    }

    #[tokio::test]
    async fn missing_ids_still_count_as_a_roll() {
        let h = Harness::default();
        let result = h.service.handle_roll(&roller(), "roller").await.unwrap();
        assert_matches!(
            result,
            RollResult::NoCharacterFound { attempts: 5, rolls_remaining: 2, rolls_until_lucky: 9 }
        );
        assert_eq!(h.catalog.fetches(), 5);

        let user = h.store.user(&roller()).unwrap();
        assert_eq!(user.rolls_in_period, 1);
        assert_eq!(user.lucky_roll_count, 1);
    }

    #[tokio::test]
    async fn rate_limited_attempts_leave_the_lucky_counter_alone() {
        let h = Harness::default();
        h.catalog.insert(character(1, 100, false));
        for _ in 0..3 {
            h.service.handle_roll(&roller(), "roller").await.unwrap();
        }
        let denied = h.service.handle_roll(&roller(), "roller").await.unwrap();
        assert_matches!(denied, RollResult::RateLimited { .. });
        assert_eq!(h.store.user(&roller()).unwrap().lucky_roll_count, 3);
    }

    #[tokio::test]
    async fn failed_tenth_roll_keeps_the_lucky_roll_for_the_retry() {
        let h = Harness::new(GameConfig {
            history_policy: HistoryWritePolicy::Strict,
            ..generous()
        });
        h.catalog.insert(character(1, 0, false));
        for _ in 0..9 {
            h.service.handle_roll(&roller(), "roller").await.unwrap();
        }

        h.store.set_history_offline(true);
        assert!(h.service.handle_roll(&roller(), "roller").await.is_err());
        let user = h.store.user(&roller()).unwrap();
        assert_eq!(user.lucky_roll_count, 9);
        assert_eq!(user.rolls_in_period, 9);
        assert_eq!(user.rolls_count, 9);

        h.store.set_history_offline(false);
        let retry = h.service.handle_roll(&roller(), "roller").await.unwrap();
        assert_matches!(
            retry,
            RollResult::Rolled { outcome: RollOutcome::Lucky { points: 500, .. }, .. }
        );
    }

    #[tokio::test]
    async fn lost_claim_pays_the_bonus_even_when_history_is_down() {
        let h = Harness::new(GameConfig {
            history_policy: HistoryWritePolicy::Strict,
            ..GameConfig::default()
        });
        h.catalog.insert(character(1, 100, false));
        let claim = roll_claim(&h, &roller()).await;

        let other = UserId::new("other");
        h.store.seed_owned(&other, &character(1, 100, false));
        h.store.set_history_offline(true);

        let result = h.service.handle_claim(&claim, &roller()).await.unwrap();
        assert_matches!(
            result,
            ClaimResult::ClaimedByOther { bonus: 150, balance: 150, owner: Some(ref o), .. } if *o == other
        );
        assert_eq!(h.store.points(&roller()), 150);
    }

    #[tokio::test]
    async fn held_roll_lock_turns_away_a_second_roll() {
        let h = Harness::default();
        h.catalog.insert(character(1, 100, false));
        let guard = h.service.state.roll_locks.try_acquire(&roller());
        assert!(guard.is_some());

        let result = h.service.handle_roll(&roller(), "roller").await.unwrap();
        assert_eq!(result, RollResult::RollInProgress);

        drop(guard);
        let result = h.service.handle_roll(&roller(), "roller").await.unwrap();
        assert_matches!(result, RollResult::Rolled { .. });
    }

    #[tokio::test]
    async fn strict_history_policy_fails_the_roll() {
        let h = Harness::new(GameConfig {
            history_policy: HistoryWritePolicy::Strict,
            ..GameConfig::default()
        });
        h.catalog.insert(character(1, 100, false));
        h.store.set_history_offline(true);
        assert!(h.service.handle_roll(&roller(), "roller").await.is_err());

        let relaxed = Harness::default();
        relaxed.catalog.insert(character(1, 100, false));
        relaxed.store.set_history_offline(true);
        let result = relaxed.service.handle_roll(&roller(), "roller").await.unwrap();
        assert_matches!(result, RollResult::Rolled { .. });
    }

    #[tokio::test]
    async fn button_tokens_dispatch_to_the_right_flow() {
        let h = Harness::default();
        h.catalog.insert(character(1, 100, false));
        let claim = roll_claim(&h, &roller()).await;

        let token = Interaction::Claim(claim).to_string();
        let interaction: Interaction = token.parse().unwrap();
        let result = h
            .service
            .dispatch_interaction(interaction, &roller(), "roller")
            .await
            .unwrap();
        assert_matches!(result, InteractionResult::Claim(ClaimResult::Claimed { .. }));

        let page = h
            .service
            .dispatch_interaction(
                Interaction::CollectionPage { owner: roller(), page: 0 },
                &sniper(),
                "sniper",
            )
            .await
            .unwrap();
        assert_matches!(page, InteractionResult::Collection(CollectionPage { total: 1, .. }));
    }

    #[tokio::test]
    async fn top_page_ranks_and_annotates_owners() {
        let h = Harness::default();
        let listing: Vec<Character> = (1..=30).map(|id| character(id, 1_000 - id, false)).collect();
        h.catalog.set_top(listing);
        h.store.seed_owned(&roller(), &character(27, 973, false));

        let page = h.service.top(2).await.unwrap();
        assert_eq!(page.entries.len(), 5);
        assert_eq!(page.entries[0].rank, 26);
        assert_eq!(page.entries[1].owner, Some(roller()));
    }

    #[tokio::test]
    async fn leaderboard_limit_is_clamped() {
        let h = Harness::default();
        for n in 0..60 {
            h.store.seed_user(&UserId::new(format!("u{n}")), n);
        }
        assert_eq!(h.service.leaderboard(None).await.unwrap().len(), 10);
        assert_eq!(h.service.leaderboard(Some(500)).await.unwrap().len(), 50);
        let top = h.service.leaderboard(Some(0)).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].total_points, 59);
    }
}
