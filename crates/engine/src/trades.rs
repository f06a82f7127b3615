//! Two-party character trades.
//!
//! ```text
//! AwaitingTargetOffer ──offer──▶ AwaitingConfirmations ──both confirm──▶ Completing
//!         │                              │                                 │
//!         └──────── cancel / expiry ─────┴──▶ Cancelled | Expired          ├─▶ Completed
//!                                                                          └─▶ Failed
//! ```
//!
//! At most one trade is active per unordered pair of players. Closed trades
//! leave the active registry but stay inspectable for a while so late clicks
//! can be answered with the trade's final status. The swap itself is one
//! store transaction that re-checks both ownerships under lock.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use waifu_core::error::CoreError;
use waifu_core::token::{token_millis, Interaction, TradeKey};
use waifu_core::types::{CharacterId, UserId};
use waifu_events::GameEventKind;

use crate::error::{EngineError, EngineResult};
use crate::scheduler::TaskKey;
use crate::service::GameService;

/// How long closed trades stay inspectable.
const CLOSED_RETENTION: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// How a player names the character they put up: catalog id or exact name
/// (case-insensitive) within their own collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacterRef {
    Id(CharacterId),
    Name(String),
}

impl FromStr for CharacterRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::Validation("character must not be empty".into()));
        }
        match s.parse::<CharacterId>() {
            Ok(id) if id > 0 => Ok(CharacterRef::Id(id)),
            _ => Ok(CharacterRef::Name(s.to_string())),
        }
    }
}

impl fmt::Display for CharacterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacterRef::Id(id) => write!(f, "{id}"),
            CharacterRef::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeOffer {
    pub character_id: CharacterId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    AwaitingTargetOffer,
    AwaitingConfirmations,
    /// Both confirmed; the swap is running.
    Completing,
    Completed,
    Cancelled,
    Expired,
    Failed,
}

impl TradeStatus {
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            TradeStatus::Completed | TradeStatus::Cancelled | TradeStatus::Expired | TradeStatus::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trade {
    pub key: TradeKey,
    pub initiator_offer: TradeOffer,
    pub target_offer: Option<TradeOffer>,
    pub initiator_confirmed: bool,
    pub target_confirmed: bool,
    pub status: TradeStatus,
    pub failure: Option<String>,
    #[serde(skip)]
    expires_at: Instant,
}

impl Trade {
    fn new(key: TradeKey, offer: TradeOffer, expires_at: Instant) -> Self {
        Self {
            key,
            initiator_offer: offer,
            target_offer: None,
            initiator_confirmed: false,
            target_confirmed: false,
            status: TradeStatus::AwaitingTargetOffer,
            failure: None,
            expires_at,
        }
    }

    /// Buttons the frontend should render for the trade's current state.
    pub fn interactions(&self) -> Vec<Interaction> {
        match self.status {
            TradeStatus::AwaitingConfirmations => vec![
                Interaction::TradeConfirm(self.key.clone()),
                Interaction::TradeCancel(self.key.clone()),
            ],
            TradeStatus::AwaitingTargetOffer => vec![Interaction::TradeCancel(self.key.clone())],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Party {
    Initiator,
    Target,
}

fn party_of(key: &TradeKey, user: &UserId) -> Option<Party> {
    if user == &key.initiator {
        Some(Party::Initiator)
    } else if user == &key.target {
        Some(Party::Target)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a trade action was refused. Nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TradeRejection {
    SelfTrade,
    /// The acting player does not own the named character.
    NotOwned { character: String },
    /// The pair already has an active trade.
    PairBusy { existing: TradeKey },
    NotAParty,
    /// Only the target names the second character.
    NotTarget,
    WrongStatus { status: TradeStatus },
    /// The trade is over.
    Closed { status: TradeStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TradeResult {
    Proposed { trade: Trade },
    Offered { trade: Trade },
    /// This party's confirmation is recorded; waiting on the other.
    Confirmed { trade: Trade },
    Completed { trade: Trade },
    Cancelled { trade: Trade },
    Failed { trade: Trade },
    Rejected { rejection: TradeRejection },
}

impl TradeResult {
    fn rejected(rejection: TradeRejection) -> Self {
        TradeResult::Rejected { rejection }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type PairKey = (UserId, UserId);

fn pair_key(key: &TradeKey) -> PairKey {
    if key.initiator <= key.target {
        (key.initiator.clone(), key.target.clone())
    } else {
        (key.target.clone(), key.initiator.clone())
    }
}

/// Result of looking a trade up for mutation.
enum Lookup<T> {
    Active(T),
    Closed(Trade),
    Missing,
}

#[derive(Default)]
struct Book {
    active: HashMap<TradeKey, Trade>,
    pairs: HashMap<PairKey, TradeKey>,
    closed: HashMap<TradeKey, (Trade, Instant)>,
}

impl Book {
    fn close(&mut self, key: &TradeKey, status: TradeStatus, failure: Option<String>) -> Option<Trade> {
        let mut trade = self.active.remove(key)?;
        self.pairs.remove(&pair_key(key));
        trade.status = status;
        trade.failure = failure;

        let now = Instant::now();
        self.closed
            .retain(|_, (_, closed_at)| now.duration_since(*closed_at) < CLOSED_RETENTION);
        self.closed.insert(key.clone(), (trade.clone(), now));
        Some(trade)
    }
}

#[derive(Default)]
pub struct TradeBook {
    book: Mutex<Book>,
}

impl TradeBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new trade unless the pair already has one.
    async fn open(&self, trade: Trade) -> Result<(), TradeKey> {
        let mut book = self.book.lock().await;
        let pair = pair_key(&trade.key);
        if let Some(existing) = book.pairs.get(&pair) {
            return Err(existing.clone());
        }
        book.pairs.insert(pair, trade.key.clone());
        book.active.insert(trade.key.clone(), trade);
        Ok(())
    }

    /// The trade, active or recently closed.
    pub async fn get(&self, key: &TradeKey) -> Option<Trade> {
        let book = self.book.lock().await;
        book.active
            .get(key)
            .or_else(|| book.closed.get(key).map(|(trade, _)| trade))
            .cloned()
    }

    pub async fn is_active(&self, key: &TradeKey) -> bool {
        self.book.lock().await.active.contains_key(key)
    }

    pub async fn active_count(&self) -> usize {
        self.book.lock().await.active.len()
    }

    async fn close(&self, key: &TradeKey, status: TradeStatus, failure: Option<String>) -> Option<Trade> {
        self.book.lock().await.close(key, status, failure)
    }

    async fn update<R>(&self, key: &TradeKey, f: impl FnOnce(&mut Trade) -> R) -> Lookup<R> {
        let mut book = self.book.lock().await;
        if let Some(trade) = book.active.get_mut(key) {
            return Lookup::Active(f(trade));
        }
        match book.closed.get(key) {
            Some((trade, _)) => Lookup::Closed(trade.clone()),
            None => Lookup::Missing,
        }
    }

    /// Close the trade if `allowed` accepts its current state. Returns the
    /// refused status otherwise.
    async fn close_if(
        &self,
        key: &TradeKey,
        status: TradeStatus,
        failure: Option<String>,
        allowed: impl FnOnce(&Trade) -> bool,
    ) -> Lookup<Result<Trade, TradeStatus>> {
        let mut book = self.book.lock().await;
        match book.active.get(key) {
            Some(trade) if allowed(trade) => {}
            Some(trade) => return Lookup::Active(Err(trade.status)),
            None => {
                return match book.closed.get(key) {
                    Some((trade, _)) => Lookup::Closed(trade.clone()),
                    None => Lookup::Missing,
                }
            }
        }
        match book.close(key, status, failure) {
            Some(trade) => Lookup::Active(Ok(trade)),
            None => Lookup::Missing,
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

enum ConfirmStep {
    Waiting(Trade),
    Complete(Trade),
    Refused(TradeStatus),
}

impl GameService {
    /// Look the offered character up among `user`'s own characters.
    async fn resolve_offer(
        &self,
        user: &UserId,
        character: &CharacterRef,
    ) -> EngineResult<Option<TradeOffer>> {
        let owned = match character {
            CharacterRef::Id(id) => self
                .store
                .find_owned(*id)
                .await?
                .filter(|owned| &owned.owner == user),
            CharacterRef::Name(name) => self.store.find_owned_by_name(user, name).await?,
        };
        Ok(owned.map(|owned| TradeOffer {
            character_id: owned.character_id,
            name: owned.name,
        }))
    }

    /// `initiator` offers one of their characters to `target`.
    pub async fn propose_trade(
        &self,
        initiator: &UserId,
        target: &UserId,
        character: &CharacterRef,
    ) -> EngineResult<TradeResult> {
        if initiator == target {
            return Ok(TradeResult::rejected(TradeRejection::SelfTrade));
        }
        let Some(offer) = self.resolve_offer(initiator, character).await? else {
            return Ok(TradeResult::rejected(TradeRejection::NotOwned {
                character: character.to_string(),
            }));
        };

        let key = TradeKey {
            initiator: initiator.clone(),
            target: target.clone(),
            created_at_ms: token_millis(Utc::now()),
        };
        let trade = Trade::new(key.clone(), offer, Instant::now() + self.config.trade_expiry);
        if let Err(existing) = self.state.trades.open(trade.clone()).await {
            return Ok(TradeResult::rejected(TradeRejection::PairBusy { existing }));
        }
        self.schedule_trade_expiry(key.clone());

        tracing::info!(
            initiator = %initiator,
            target = %target,
            character_id = trade.initiator_offer.character_id,
            "Trade proposed",
        );
        self.publish(GameEventKind::TradeProposed { trade: key }, None);
        Ok(TradeResult::Proposed { trade })
    }

    /// The target names the character they give in return.
    pub async fn offer_trade(
        &self,
        key: &TradeKey,
        user: &UserId,
        character: &CharacterRef,
    ) -> EngineResult<TradeResult> {
        if user != &key.target {
            let rejection = if user == &key.initiator {
                TradeRejection::NotTarget
            } else {
                TradeRejection::NotAParty
            };
            return Ok(TradeResult::rejected(rejection));
        }

        match self.state.trades.get(key).await {
            None => return Err(EngineError::not_found("trade", key)),
            Some(trade) if trade.status.is_closed() => {
                return Ok(TradeResult::rejected(TradeRejection::Closed {
                    status: trade.status,
                }))
            }
            Some(trade) if trade.status != TradeStatus::AwaitingTargetOffer => {
                return Ok(TradeResult::rejected(TradeRejection::WrongStatus {
                    status: trade.status,
                }))
            }
            Some(_) => {}
        }

        let Some(offer) = self.resolve_offer(user, character).await? else {
            return Ok(TradeResult::rejected(TradeRejection::NotOwned {
                character: character.to_string(),
            }));
        };

        let step = self
            .state
            .trades
            .update(key, |trade| {
                if trade.status != TradeStatus::AwaitingTargetOffer {
                    return Err(trade.status);
                }
                trade.target_offer = Some(offer);
                trade.status = TradeStatus::AwaitingConfirmations;
                Ok(trade.clone())
            })
            .await;

        match step {
            Lookup::Active(Ok(trade)) => {
                tracing::info!(trade = %key, "Trade offer received");
                self.publish(
                    GameEventKind::TradeOffered { trade: key.clone() },
                    Some(Interaction::TradeConfirm(key.clone()).to_string()),
                );
                Ok(TradeResult::Offered { trade })
            }
            Lookup::Active(Err(status)) => {
                Ok(TradeResult::rejected(TradeRejection::WrongStatus { status }))
            }
            Lookup::Closed(trade) => Ok(TradeResult::rejected(TradeRejection::Closed {
                status: trade.status,
            })),
            Lookup::Missing => Err(EngineError::not_found("trade", key)),
        }
    }

    /// Record `user`'s confirmation. Idempotent; the second party's
    /// confirmation performs the swap.
    pub async fn confirm_trade(&self, key: &TradeKey, user: &UserId) -> EngineResult<TradeResult> {
        let Some(party) = party_of(key, user) else {
            return Ok(TradeResult::rejected(TradeRejection::NotAParty));
        };

        let step = self
            .state
            .trades
            .update(key, |trade| {
                if trade.status != TradeStatus::AwaitingConfirmations {
                    return ConfirmStep::Refused(trade.status);
                }
                match party {
                    Party::Initiator => trade.initiator_confirmed = true,
                    Party::Target => trade.target_confirmed = true,
                }
                if trade.initiator_confirmed && trade.target_confirmed {
                    trade.status = TradeStatus::Completing;
                    ConfirmStep::Complete(trade.clone())
                } else {
                    ConfirmStep::Waiting(trade.clone())
                }
            })
            .await;

        match step {
            Lookup::Active(ConfirmStep::Waiting(trade)) => {
                tracing::debug!(trade = %key, user = %user, "Trade confirmation recorded");
                Ok(TradeResult::Confirmed { trade })
            }
            Lookup::Active(ConfirmStep::Complete(trade)) => self.complete_trade(trade).await,
            Lookup::Active(ConfirmStep::Refused(status)) => {
                Ok(TradeResult::rejected(TradeRejection::WrongStatus { status }))
            }
            Lookup::Closed(trade) => Ok(TradeResult::rejected(TradeRejection::Closed {
                status: trade.status,
            })),
            Lookup::Missing => Err(EngineError::not_found("trade", key)),
        }
    }

    async fn complete_trade(&self, trade: Trade) -> EngineResult<TradeResult> {
        let key = trade.key.clone();
        let give = trade.initiator_offer.character_id;
        let Some(take) = trade.target_offer.as_ref().map(|o| o.character_id) else {
            return Ok(self.fail_trade(&key, "target never made an offer").await);
        };

        let swapped = self.verify_and_swap(&key, give, take).await;
        match swapped {
            Ok(Ok(())) => {
                let closed = self
                    .state
                    .trades
                    .close(&key, TradeStatus::Completed, None)
                    .await;
                self.state
                    .scheduler
                    .cancel(&TaskKey::TradeExpiry(key.clone()));
                tracing::info!(trade = %key, give, take, "Trade completed");
                self.publish(
                    GameEventKind::TradeCompleted { trade: key.clone() },
                    Some(Interaction::TradeConfirm(key.clone()).to_string()),
                );
                match closed {
                    Some(trade) => Ok(TradeResult::Completed { trade }),
                    None => Err(EngineError::not_found("trade", &key)),
                }
            }
            Ok(Err(reason)) => Ok(self.fail_trade(&key, &reason).await),
            Err(e) => {
                self.resume_after_error(&key).await;
                Err(e)
            }
        }
    }

    /// Re-check both ownerships, then swap. `Ok(Err(reason))` when a
    /// precondition no longer holds.
    async fn verify_and_swap(
        &self,
        key: &TradeKey,
        give: CharacterId,
        take: CharacterId,
    ) -> EngineResult<Result<(), String>> {
        if !self.store.user_owns(&key.initiator, give).await? {
            return Ok(Err(format!("{} no longer owns character {give}", key.initiator)));
        }
        if !self.store.user_owns(&key.target, take).await? {
            return Ok(Err(format!("{} no longer owns character {take}", key.target)));
        }
        if !self
            .store
            .swap_ownership(&key.initiator, &key.target, give, take)
            .await?
        {
            return Ok(Err("ownership changed while swapping".to_string()));
        }
        Ok(Ok(()))
    }

    async fn fail_trade(&self, key: &TradeKey, reason: &str) -> TradeResult {
        let closed = self
            .state
            .trades
            .close(key, TradeStatus::Failed, Some(reason.to_string()))
            .await;
        self.state
            .scheduler
            .cancel(&TaskKey::TradeExpiry(key.clone()));
        tracing::warn!(trade = %key, reason, "Trade failed");
        self.publish(
            GameEventKind::TradeFailed {
                trade: key.clone(),
                reason: reason.to_string(),
            },
            None,
        );
        match closed {
            Some(trade) => TradeResult::Failed { trade },
            None => TradeResult::rejected(TradeRejection::Closed {
                status: TradeStatus::Failed,
            }),
        }
    }

    /// The swap hit a store error: reopen confirmations so both parties
    /// confirm again. A trade whose expiry passed meanwhile expires now.
    async fn resume_after_error(&self, key: &TradeKey) {
        let lapsed = self
            .state
            .trades
            .update(key, |trade| {
                if trade.status == TradeStatus::Completing {
                    trade.status = TradeStatus::AwaitingConfirmations;
                    trade.initiator_confirmed = false;
                    trade.target_confirmed = false;
                }
                trade.expires_at <= Instant::now()
            })
            .await;
        if matches!(lapsed, Lookup::Active(true)) {
            self.expire_trade(key).await;
        }
    }

    /// Either party cancels before completion.
    pub async fn cancel_trade(&self, key: &TradeKey, user: &UserId) -> EngineResult<TradeResult> {
        if party_of(key, user).is_none() {
            return Ok(TradeResult::rejected(TradeRejection::NotAParty));
        }
        let closed = self
            .state
            .trades
            .close_if(key, TradeStatus::Cancelled, None, |trade| {
                trade.status != TradeStatus::Completing
            })
            .await;

        match closed {
            Lookup::Active(Ok(trade)) => {
                self.state
                    .scheduler
                    .cancel(&TaskKey::TradeExpiry(key.clone()));
                tracing::info!(trade = %key, by = %user, "Trade cancelled");
                self.publish(
                    GameEventKind::TradeCancelled {
                        trade: key.clone(),
                        by: user.clone(),
                    },
                    Some(Interaction::TradeCancel(key.clone()).to_string()),
                );
                Ok(TradeResult::Cancelled { trade })
            }
            Lookup::Active(Err(status)) => {
                Ok(TradeResult::rejected(TradeRejection::WrongStatus { status }))
            }
            Lookup::Closed(trade) => Ok(TradeResult::rejected(TradeRejection::Closed {
                status: trade.status,
            })),
            Lookup::Missing => Err(EngineError::not_found("trade", key)),
        }
    }

    pub async fn trade(&self, key: &TradeKey) -> EngineResult<Trade> {
        self.state
            .trades
            .get(key)
            .await
            .ok_or_else(|| EngineError::not_found("trade", key))
    }

    fn schedule_trade_expiry(&self, key: TradeKey) {
        let service = self.clone();
        self.state.scheduler.schedule(
            TaskKey::TradeExpiry(key.clone()),
            self.config.trade_expiry,
            async move {
                service.expire_trade(&key).await;
            },
        );
    }

    /// Expire the trade unless a swap is running.
    async fn expire_trade(&self, key: &TradeKey) {
        let closed = self
            .state
            .trades
            .close_if(key, TradeStatus::Expired, None, |trade| {
                trade.status != TradeStatus::Completing
            })
            .await;
        if let Lookup::Active(Ok(_)) = closed {
            tracing::info!(trade = %key, "Trade expired");
            self.publish(GameEventKind::TradeExpired { trade: key.clone() }, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use waifu_core::config::GameConfig;

    use super::*;
    use crate::testing::{character, Harness};

    struct Pair {
        h: Harness,
        alice: UserId,
        bob: UserId,
    }

    fn pair() -> Pair {
        pair_with(GameConfig::default())
    }

    /// Alice owns character 1, Bob owns character 2.
    fn pair_with(config: GameConfig) -> Pair {
        let h = Harness::new(config);
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        h.store.seed_owned(&alice, &character(1, 10, false));
        h.store.seed_owned(&bob, &character(2, 20, true));
        Pair { h, alice, bob }
    }

    async fn offered(p: &Pair) -> TradeKey {
        let proposed = p
            .h
            .service
            .propose_trade(&p.alice, &p.bob, &CharacterRef::Id(1))
            .await
            .unwrap();
        let TradeResult::Proposed { trade } = proposed else {
            panic!("expected proposal, got {proposed:?}");
        };
        let offered = p
            .h
            .service
            .offer_trade(&trade.key, &p.bob, &"character 2".parse().unwrap())
            .await
            .unwrap();
        assert_matches!(offered, TradeResult::Offered { .. });
        trade.key
    }

    #[test]
    fn character_refs_parse_ids_and_names() {
        assert_eq!("417".parse::<CharacterRef>().unwrap(), CharacterRef::Id(417));
        assert_eq!(
            " Rem ".parse::<CharacterRef>().unwrap(),
            CharacterRef::Name("Rem".into())
        );
        assert!("  ".parse::<CharacterRef>().is_err());
    }

    #[tokio::test]
    async fn completed_trade_swaps_both_characters() {
        let p = pair();
        let key = offered(&p).await;

        let first = p.h.service.confirm_trade(&key, &p.alice).await.unwrap();
        assert_matches!(first, TradeResult::Confirmed { .. });
        // Re-confirming changes nothing.
        let again = p.h.service.confirm_trade(&key, &p.alice).await.unwrap();
        assert_matches!(again, TradeResult::Confirmed { .. });
        assert_eq!(p.h.store.owner(1), Some(p.alice.clone()));

        let done = p.h.service.confirm_trade(&key, &p.bob).await.unwrap();
        assert_matches!(done, TradeResult::Completed { trade } if trade.status == TradeStatus::Completed);

        assert_eq!(p.h.store.owner(1), Some(p.bob.clone()));
        assert_eq!(p.h.store.owner(2), Some(p.alice.clone()));
        assert!(!p.h.service.state.trades.is_active(&key).await);
        assert_eq!(p.h.service.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn only_one_trade_per_pair() {
        let p = pair();
        let _ = offered(&p).await;
        let second = p
            .h
            .service
            .propose_trade(&p.bob, &p.alice, &CharacterRef::Id(2))
            .await
            .unwrap();
        assert_matches!(
            second,
            TradeResult::Rejected { rejection: TradeRejection::PairBusy { .. } }
        );
    }

    #[tokio::test]
    async fn cannot_offer_what_you_do_not_own() {
        let p = pair();
        let result = p
            .h
            .service
            .propose_trade(&p.alice, &p.bob, &CharacterRef::Id(2))
            .await
            .unwrap();
        assert_matches!(
            result,
            TradeResult::Rejected { rejection: TradeRejection::NotOwned { .. } }
        );
        let own = p
            .h
            .service
            .propose_trade(&p.alice, &p.alice, &CharacterRef::Id(1))
            .await
            .unwrap();
        assert_matches!(own, TradeResult::Rejected { rejection: TradeRejection::SelfTrade });
    }

    #[tokio::test]
    async fn outsiders_and_initiator_cannot_act_out_of_turn() {
        let p = pair();
        let TradeResult::Proposed { trade } = p
            .h
            .service
            .propose_trade(&p.alice, &p.bob, &CharacterRef::Id(1))
            .await
            .unwrap()
        else {
            panic!("expected proposal");
        };
        let carol = UserId::new("carol");

        let by_initiator = p
            .h
            .service
            .offer_trade(&trade.key, &p.alice, &CharacterRef::Id(1))
            .await
            .unwrap();
        assert_matches!(by_initiator, TradeResult::Rejected { rejection: TradeRejection::NotTarget });

        let early = p.h.service.confirm_trade(&trade.key, &p.alice).await.unwrap();
        assert_matches!(
            early,
            TradeResult::Rejected {
                rejection: TradeRejection::WrongStatus { status: TradeStatus::AwaitingTargetOffer }
            }
        );

        let outsider = p.h.service.cancel_trade(&trade.key, &carol).await.unwrap();
        assert_matches!(outsider, TradeResult::Rejected { rejection: TradeRejection::NotAParty });
    }

    #[tokio::test]
    async fn ownership_change_before_completion_fails_the_trade() {
        let p = pair();
        let key = offered(&p).await;
        p.h.service.confirm_trade(&key, &p.alice).await.unwrap();

        // Bob's character goes elsewhere before he confirms.
        p.h.store.seed_owned(&UserId::new("carol"), &character(2, 20, true));

        let result = p.h.service.confirm_trade(&key, &p.bob).await.unwrap();
        assert_matches!(result, TradeResult::Failed { trade } if trade.failure.is_some());
        assert_eq!(p.h.store.owner(1), Some(p.alice.clone()));
        assert_eq!(p.h.store.owner(2), Some(UserId::new("carol")));
    }

    #[tokio::test]
    async fn store_failure_during_swap_reopens_confirmation() {
        let p = pair();
        let key = offered(&p).await;
        p.h.service.confirm_trade(&key, &p.alice).await.unwrap();

        p.h.store.set_offline(true);
        assert!(p.h.service.confirm_trade(&key, &p.bob).await.is_err());
        p.h.store.set_offline(false);

        let trade = p.h.service.trade(&key).await.unwrap();
        assert_eq!(trade.status, TradeStatus::AwaitingConfirmations);

        p.h.service.confirm_trade(&key, &p.alice).await.unwrap();
        let done = p.h.service.confirm_trade(&key, &p.bob).await.unwrap();
        assert_matches!(done, TradeResult::Completed { .. });
    }

    #[tokio::test]
    async fn cancel_is_terminal_and_frees_the_pair() {
        let p = pair();
        let key = offered(&p).await;
        p.h.service.confirm_trade(&key, &p.alice).await.unwrap();

        let cancelled = p.h.service.cancel_trade(&key, &p.bob).await.unwrap();
        assert_matches!(cancelled, TradeResult::Cancelled { .. });

        let late = p.h.service.confirm_trade(&key, &p.bob).await.unwrap();
        assert_matches!(
            late,
            TradeResult::Rejected { rejection: TradeRejection::Closed { status: TradeStatus::Cancelled } }
        );

        let again = p
            .h
            .service
            .propose_trade(&p.bob, &p.alice, &CharacterRef::Id(2))
            .await
            .unwrap();
        assert_matches!(again, TradeResult::Proposed { .. });
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_trade_expires_after_ten_minutes() {
        let p = pair();
        let mut events = p.h.events.subscribe();
        let TradeResult::Proposed { trade } = p
            .h
            .service
            .propose_trade(&p.alice, &p.bob, &CharacterRef::Id(1))
            .await
            .unwrap()
        else {
            panic!("expected proposal");
        };
        let key = trade.key;

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert!(p.h.service.state.trades.is_active(&key).await);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!p.h.service.state.trades.is_active(&key).await);
        assert_eq!(p.h.service.trade(&key).await.unwrap().status, TradeStatus::Expired);

        let late = p.h.service.confirm_trade(&key, &p.bob).await.unwrap();
        assert_matches!(
            late,
            TradeResult::Rejected { rejection: TradeRejection::Closed { status: TradeStatus::Expired } }
        );

        let mut saw_expiry = false;
        while let Ok(event) = events.try_recv() {
            saw_expiry |= matches!(event.kind, GameEventKind::TradeExpired { .. });
        }
        assert!(saw_expiry);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_cancels_the_expiry_timer() {
        let p = pair_with(GameConfig {
            trade_expiry: Duration::from_secs(60),
            ..GameConfig::default()
        });
        let key = offered(&p).await;
        p.h.service.confirm_trade(&key, &p.alice).await.unwrap();
        p.h.service.confirm_trade(&key, &p.bob).await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(p.h.service.trade(&key).await.unwrap().status, TradeStatus::Completed);
    }
}
