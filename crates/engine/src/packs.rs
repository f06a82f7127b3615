//! Point-purchased character packs.
//!
//! A pack is proposed, then confirmed (which spends the points and draws
//! every slot up front), then revealed one slot at a time. Revealing a slot
//! settles its ownership exactly like a roll would, minus the lucky floor
//! and the snipe window. Unconfirmed packs expire; opened packs that sit
//! too long get their remaining slots revealed automatically.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use waifu_core::character::Character;
use waifu_core::error::CoreError;
use waifu_core::points::{self, DUPLICATE_BONUS};
use waifu_core::token::{token_millis, Interaction, PackKey, PackKind};
use waifu_core::types::UserId;
use waifu_events::GameEventKind;

use crate::error::{EngineError, EngineResult};
use crate::scheduler::TaskKey;
use crate::service::GameService;

/// Top pages a guaranteed slot may come from.
const TOP_DRAW_PAGES: usize = 4;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackStatus {
    AwaitingConfirmation,
    /// Drawing slots and charging the buyer.
    Confirming,
    Opened,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotOutcome {
    Claimed { points: i64 },
    /// Someone else owns the character; the flat bonus was awarded.
    Duplicate { owner: Option<UserId>, bonus: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReveal {
    pub character: Character,
    pub outcome: SlotOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub index: usize,
    pub revealed: Option<SlotReveal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackView {
    pub key: PackKey,
    pub status: PackStatus,
    pub cost: i64,
    pub slots: Vec<SlotView>,
}

impl PackView {
    pub fn interactions(&self) -> Vec<Interaction> {
        match self.status {
            PackStatus::AwaitingConfirmation => vec![
                Interaction::PackConfirm(self.key.clone()),
                Interaction::PackCancel(self.key.clone()),
            ],
            PackStatus::Confirming => Vec::new(),
            PackStatus::Opened => self
                .slots
                .iter()
                .filter(|s| s.revealed.is_none())
                .map(|s| Interaction::PackSlotReveal {
                    pack: self.key.clone(),
                    slot: s.index,
                })
                .collect(),
        }
    }
}

struct Slot {
    character: Character,
    points: i64,
    reveal: Option<SlotReveal>,
    in_flight: bool,
}

struct PendingPack {
    key: PackKey,
    status: PackStatus,
    slots: Vec<Slot>,
    expires_at: Instant,
}

impl PendingPack {
    fn view(&self) -> PackView {
        PackView {
            key: self.key.clone(),
            status: self.status,
            cost: self.key.kind.cost(),
            slots: self
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| SlotView {
                    index,
                    revealed: slot.reveal.clone(),
                })
                .collect(),
        }
    }

    fn hidden(&self) -> usize {
        self.slots.iter().filter(|s| s.reveal.is_none()).count()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PackResult {
    Proposed { pack: PackView, balance: i64 },
    Opened { pack: PackView, balance: i64 },
    Cancelled { pack: PackKey },
    SlotRevealed {
        slot: usize,
        reveal: SlotReveal,
        /// Slots still hidden.
        remaining: usize,
    },
    AlreadyRevealed { slot: usize, reveal: SlotReveal },
    RevealInProgress,
    InsufficientPoints { cost: i64, balance: i64 },
    NotYourPack,
    WrongStatus { status: PackStatus },
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

enum RevealRefusal {
    Missing,
    WrongStatus(PackStatus),
    NoSuchSlot,
    Revealed(SlotReveal),
    InFlight,
}

#[derive(Default)]
pub struct PackBook {
    packs: Mutex<HashMap<PackKey, PendingPack>>,
}

impl PackBook {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, pack: PendingPack) {
        self.packs.lock().await.insert(pack.key.clone(), pack);
    }

    pub async fn view(&self, key: &PackKey) -> Option<PackView> {
        self.packs.lock().await.get(key).map(PendingPack::view)
    }

    pub async fn len(&self) -> usize {
        self.packs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// `AwaitingConfirmation` → `Confirming`.
    async fn begin_confirm(&self, key: &PackKey) -> Option<Result<(), PackStatus>> {
        let mut packs = self.packs.lock().await;
        let pack = packs.get_mut(key)?;
        if pack.status != PackStatus::AwaitingConfirmation {
            return Some(Err(pack.status));
        }
        pack.status = PackStatus::Confirming;
        Some(Ok(()))
    }

    /// Back to `AwaitingConfirmation` after a failed confirm. Returns true
    /// when the confirm window lapsed meanwhile and the pack was dropped.
    async fn abort_confirm(&self, key: &PackKey) -> bool {
        let mut packs = self.packs.lock().await;
        let Some(pack) = packs.get_mut(key) else {
            return false;
        };
        if pack.status == PackStatus::Confirming {
            pack.status = PackStatus::AwaitingConfirmation;
        }
        if pack.expires_at <= Instant::now() {
            packs.remove(key);
            return true;
        }
        false
    }

    async fn open(&self, key: &PackKey, drawn: Vec<Character>) -> Option<PackView> {
        let mut packs = self.packs.lock().await;
        let pack = packs.get_mut(key)?;
        pack.status = PackStatus::Opened;
        pack.slots = drawn
            .into_iter()
            .map(|character| Slot {
                points: points::character_points(&character, false),
                character,
                reveal: None,
                in_flight: false,
            })
            .collect();
        Some(pack.view())
    }

    /// Remove an unconfirmed pack. `Err` carries the status of a pack that
    /// is past that point.
    async fn remove_if_awaiting(&self, key: &PackKey) -> Option<Result<(), PackStatus>> {
        let mut packs = self.packs.lock().await;
        let status = packs.get(key)?.status;
        if status != PackStatus::AwaitingConfirmation {
            return Some(Err(status));
        }
        packs.remove(key);
        Some(Ok(()))
    }

    async fn remove(&self, key: &PackKey) {
        self.packs.lock().await.remove(key);
    }

    async fn begin_reveal(&self, key: &PackKey, index: usize) -> Result<(Character, i64), RevealRefusal> {
        let mut packs = self.packs.lock().await;
        let pack = packs.get_mut(key).ok_or(RevealRefusal::Missing)?;
        if pack.status != PackStatus::Opened {
            return Err(RevealRefusal::WrongStatus(pack.status));
        }
        let slot = pack.slots.get_mut(index).ok_or(RevealRefusal::NoSuchSlot)?;
        if let Some(reveal) = &slot.reveal {
            return Err(RevealRefusal::Revealed(reveal.clone()));
        }
        if slot.in_flight {
            return Err(RevealRefusal::InFlight);
        }
        slot.in_flight = true;
        Ok((slot.character.clone(), slot.points))
    }

    async fn abort_reveal(&self, key: &PackKey, index: usize) {
        if let Some(slot) = self
            .packs
            .lock()
            .await
            .get_mut(key)
            .and_then(|pack| pack.slots.get_mut(index))
        {
            slot.in_flight = false;
        }
    }

    /// Store the reveal and return how many slots are still hidden. A pack
    /// with nothing left hidden is removed.
    async fn finish_reveal(&self, key: &PackKey, index: usize, reveal: SlotReveal) -> usize {
        let mut packs = self.packs.lock().await;
        let Some(pack) = packs.get_mut(key) else {
            return 0;
        };
        if let Some(slot) = pack.slots.get_mut(index) {
            slot.reveal = Some(reveal);
            slot.in_flight = false;
        }
        let hidden = pack.hidden();
        if hidden == 0 {
            packs.remove(key);
        }
        hidden
    }

    /// Hidden slots nobody is currently revealing.
    async fn pending_slots(&self, key: &PackKey) -> Vec<usize> {
        self.packs.lock().await.get(key).map_or_else(Vec::new, |pack| {
            pack.slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.reveal.is_none() && !s.in_flight)
                .map(|(i, _)| i)
                .collect()
        })
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl GameService {
    /// Offer a pack to `user` if they can currently afford it. Nothing is
    /// charged until they confirm.
    pub async fn propose_pack(
        &self,
        user: &UserId,
        username: &str,
        kind: PackKind,
    ) -> EngineResult<PackResult> {
        self.store.ensure_user(user, username).await?;
        let balance = self.store.balance(user).await?;
        if balance < kind.cost() {
            return Ok(PackResult::InsufficientPoints {
                cost: kind.cost(),
                balance,
            });
        }

        let key = PackKey {
            buyer: user.clone(),
            kind,
            created_at_ms: token_millis(Utc::now()),
        };
        let pack = PendingPack {
            key: key.clone(),
            status: PackStatus::AwaitingConfirmation,
            slots: Vec::new(),
            expires_at: Instant::now() + self.config.pack_confirm_window,
        };
        let view = pack.view();
        self.state.packs.insert(pack).await;

        let service = self.clone();
        let expiring = key.clone();
        self.state.scheduler.schedule(
            TaskKey::PackConfirmExpiry(key),
            self.config.pack_confirm_window,
            async move {
                service.expire_pack(&expiring).await;
            },
        );

        tracing::info!(user = %user, kind = kind.as_str(), "Pack proposed");
        Ok(PackResult::Proposed {
            pack: view,
            balance,
        })
    }

    /// Charge the buyer and open the pack.
    ///
    /// Slots are drawn before the charge, so a catalog failure leaves the
    /// balance untouched and the pack still awaiting confirmation.
    pub async fn confirm_pack(&self, key: &PackKey, user: &UserId) -> EngineResult<PackResult> {
        if user != &key.buyer {
            return Ok(PackResult::NotYourPack);
        }
        match self.state.packs.begin_confirm(key).await {
            None => return Err(EngineError::not_found("pack", key)),
            Some(Err(status)) => return Ok(PackResult::WrongStatus { status }),
            Some(Ok(())) => {}
        }

        let drawn = match self.draw_pack(key.kind).await {
            Ok(drawn) => drawn,
            Err(e) => {
                self.abort_pack_confirm(key).await;
                return Err(e);
            }
        };

        let cost = key.kind.cost();
        let balance = match self.store.try_spend(user, cost).await {
            Ok(Some(balance)) => balance,
            Ok(None) => {
                self.state.packs.remove(key).await;
                self.state
                    .scheduler
                    .cancel(&TaskKey::PackConfirmExpiry(key.clone()));
                let balance = self.store.balance(user).await?;
                return Ok(PackResult::InsufficientPoints { cost, balance });
            }
            Err(e) => {
                self.abort_pack_confirm(key).await;
                return Err(e.into());
            }
        };

        self.state
            .scheduler
            .cancel(&TaskKey::PackConfirmExpiry(key.clone()));
        let Some(view) = self.state.packs.open(key, drawn).await else {
            self.refund(user, cost).await?;
            return Err(EngineError::not_found("pack", key));
        };

        let service = self.clone();
        let revealing = key.clone();
        self.state.scheduler.schedule(
            TaskKey::PackAutoReveal(key.clone()),
            self.config.pack_reveal_window,
            async move {
                service.auto_reveal(&revealing).await;
            },
        );

        tracing::info!(user = %user, kind = key.kind.as_str(), cost, balance, "Pack opened");
        Ok(PackResult::Opened {
            pack: view,
            balance,
        })
    }

    async fn abort_pack_confirm(&self, key: &PackKey) {
        if self.state.packs.abort_confirm(key).await {
            self.state
                .scheduler
                .cancel(&TaskKey::PackConfirmExpiry(key.clone()));
            self.announce_pack_expired(key);
        }
    }

    /// Draw every slot of a pack. Guaranteed slots come from the top
    /// listing; a random draw that finds nothing falls back to it too.
    async fn draw_pack(&self, kind: PackKind) -> EngineResult<Vec<Character>> {
        let mut drawn = Vec::with_capacity(kind.slot_count());
        for slot in 0..kind.slot_count() {
            let character = if slot < kind.guaranteed_top_slots() {
                self.draw_top().await?
            } else {
                match self.draw_random().await? {
                    Some(character) => Some(character),
                    None => self.draw_top().await?,
                }
            };
            let Some(character) = character else {
                return Err(CoreError::Unavailable("catalog returned no characters".into()).into());
            };
            drawn.push(character);
        }
        Ok(drawn)
    }

    async fn draw_top(&self) -> EngineResult<Option<Character>> {
        let page = 1 + self.ids.index(TOP_DRAW_PAGES) as u32;
        let listing = self.catalog.top(page).await?;
        if listing.is_empty() {
            return Ok(None);
        }
        let Some(pick) = listing.get(self.ids.index(listing.len())) else {
            return Ok(None);
        };
        // Listings carry no appearance; fetch the full record for the role bonus.
        Ok(Some(self.catalog.fetch(pick.id).await?.unwrap_or_else(|| pick.clone())))
    }

    pub async fn cancel_pack(&self, key: &PackKey, user: &UserId) -> EngineResult<PackResult> {
        if user != &key.buyer {
            return Ok(PackResult::NotYourPack);
        }
        match self.state.packs.remove_if_awaiting(key).await {
            None => Err(EngineError::not_found("pack", key)),
            Some(Err(status)) => Ok(PackResult::WrongStatus { status }),
            Some(Ok(())) => {
                self.state
                    .scheduler
                    .cancel(&TaskKey::PackConfirmExpiry(key.clone()));
                tracing::info!(user = %user, kind = key.kind.as_str(), "Pack cancelled");
                Ok(PackResult::Cancelled { pack: key.clone() })
            }
        }
    }

    /// Reveal one slot of an opened pack and settle its ownership.
    pub async fn reveal_slot(
        &self,
        key: &PackKey,
        user: &UserId,
        index: usize,
    ) -> EngineResult<PackResult> {
        if user != &key.buyer {
            return Ok(PackResult::NotYourPack);
        }
        let (character, points) = match self.state.packs.begin_reveal(key, index).await {
            Ok(slot) => slot,
            Err(RevealRefusal::Missing) => return Err(EngineError::not_found("pack", key)),
            Err(RevealRefusal::NoSuchSlot) => {
                return Err(CoreError::Validation(format!(
                    "pack has {} slots, no slot {index}",
                    key.kind.slot_count()
                ))
                .into())
            }
            Err(RevealRefusal::WrongStatus(status)) => {
                return Ok(PackResult::WrongStatus { status })
            }
            Err(RevealRefusal::Revealed(reveal)) => {
                return Ok(PackResult::AlreadyRevealed {
                    slot: index,
                    reveal,
                })
            }
            Err(RevealRefusal::InFlight) => return Ok(PackResult::RevealInProgress),
        };

        let (reveal, logged) = match self.settle_slot(user, character, points).await {
            Ok(settled) => settled,
            Err(e) => {
                self.state.packs.abort_reveal(key, index).await;
                return Err(e);
            }
        };
        let remaining = self
            .state
            .packs
            .finish_reveal(key, index, reveal.clone())
            .await;
        if remaining == 0 {
            self.state
                .scheduler
                .cancel(&TaskKey::PackAutoReveal(key.clone()));
        }
        logged?;

        Ok(PackResult::SlotRevealed {
            slot: index,
            reveal,
            remaining,
        })
    }

    /// Settle one slot's character for `user`. The second value is the
    /// outcome of the history append, which comes after ownership and
    /// points are final.
    async fn settle_slot(
        &self,
        user: &UserId,
        character: Character,
        points: i64,
    ) -> EngineResult<(SlotReveal, EngineResult<()>)> {
        let owner = match self.store.owner_of(character.id).await? {
            Some(owner) => Some(owner),
            None => {
                if self.store.claim_if_unowned(user, &character).await? {
                    self.store.add_points(user, points).await?;
                    let logged = self.record_history(user, &character, points, false).await;
                    tracing::info!(user = %user, character_id = character.id, points, "Pack slot claimed");
                    let reveal = SlotReveal {
                        character,
                        outcome: SlotOutcome::Claimed { points },
                    };
                    return Ok((reveal, logged));
                }
                // Lost the insert to a concurrent claim.
                self.store.owner_of(character.id).await?
            }
        };

        self.store.add_points(user, DUPLICATE_BONUS).await?;
        let logged = self
            .record_history(user, &character, DUPLICATE_BONUS, true)
            .await;
        tracing::info!(user = %user, character_id = character.id, "Pack slot was a duplicate");
        let reveal = SlotReveal {
            character,
            outcome: SlotOutcome::Duplicate {
                owner,
                bonus: DUPLICATE_BONUS,
            },
        };
        Ok((reveal, logged))
    }

    /// Reveal whatever the buyer left hidden when the reveal window ends.
    async fn auto_reveal(&self, key: &PackKey) {
        let mut revealed = Vec::new();
        for index in self.state.packs.pending_slots(key).await {
            let Ok((character, points)) = self.state.packs.begin_reveal(key, index).await else {
                continue;
            };
            match self.settle_slot(&key.buyer, character, points).await {
                Ok((reveal, logged)) => {
                    if let Err(e) = logged {
                        tracing::error!(pack = %key, slot = index, error = %e, "Auto-reveal history write failed");
                    }
                    self.state.packs.finish_reveal(key, index, reveal).await;
                    revealed.push(index);
                }
                Err(e) => {
                    tracing::error!(pack = %key, slot = index, error = %e, "Auto-reveal failed");
                    self.state.packs.abort_reveal(key, index).await;
                }
            }
        }
        // Slots that could not be settled are forfeited.
        self.state.packs.remove(key).await;

        tracing::info!(pack = %key, slots = revealed.len(), "Pack auto-revealed");
        self.publish(
            GameEventKind::PackAutoRevealed {
                pack: key.clone(),
                slots: revealed,
            },
            None,
        );
    }

    async fn expire_pack(&self, key: &PackKey) {
        if let Some(Ok(())) = self.state.packs.remove_if_awaiting(key).await {
            self.announce_pack_expired(key);
        }
    }

    fn announce_pack_expired(&self, key: &PackKey) {
        tracing::info!(pack = %key, "Pack expired unconfirmed");
        self.publish(
            GameEventKind::PackExpired { pack: key.clone() },
            Some(Interaction::PackConfirm(key.clone()).to_string()),
        );
    }

    pub async fn pack(&self, key: &PackKey) -> EngineResult<PackView> {
        self.state
            .packs
            .view(key)
            .await
            .ok_or_else(|| EngineError::not_found("pack", key))
    }
}
