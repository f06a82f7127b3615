//! Pending claims and their resolution results.
//!
//! A pending claim is `Open` until the roller claims it, someone snipes it,
//! or its window lapses. The registry only tracks workflow: which entries
//! are open and whether a claim or snipe is currently talking to the store.
//! Whether the character is actually still unowned is decided by the
//! store's conditional insert on every resolution.
//!
//! A claim and a snipe may be in flight for the same entry at once. Both
//! reach the store; exactly one insert wins and the other caller gets the
//! duplicate bonus or a refund.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use waifu_core::character::Character;
use waifu_core::token::ClaimKey;
use waifu_core::types::UserId;

/// Which resolution path is talking to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolver {
    Claim,
    Snipe,
}

#[derive(Debug, Clone)]
pub struct PendingClaim {
    pub key: ClaimKey,
    pub character: Character,
    /// Points the roller receives on a successful claim.
    pub points: i64,
    pub lucky: bool,
    pub expires_at: Instant,
    claim_in_flight: bool,
    snipe_in_flight: bool,
}

impl PendingClaim {
    pub fn new(key: ClaimKey, character: Character, points: i64, lucky: bool, expires_at: Instant) -> Self {
        Self {
            key,
            character,
            points,
            lucky,
            expires_at,
            claim_in_flight: false,
            snipe_in_flight: false,
        }
    }

    /// Lucky rolls are never snipeable.
    pub fn snipeable(&self) -> bool {
        !self.lucky
    }

    fn in_flight(&self) -> bool {
        self.claim_in_flight || self.snipe_in_flight
    }

    fn flag(&mut self, resolver: Resolver) -> &mut bool {
        match resolver {
            Resolver::Claim => &mut self.claim_in_flight,
            Resolver::Snipe => &mut self.snipe_in_flight,
        }
    }
}

/// Why a claim or snipe could not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginError {
    /// No open entry: claimed, sniped or expired already.
    Resolved,
    /// The same kind of resolution is already running.
    InFlight,
    /// Snipe attempted on a lucky roll.
    NotSnipeable,
}

#[derive(Default)]
pub struct ClaimRegistry {
    entries: Mutex<HashMap<ClaimKey, PendingClaim>>,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, claim: PendingClaim) {
        self.entries.lock().await.insert(claim.key.clone(), claim);
    }

    pub async fn get(&self, key: &ClaimKey) -> Option<PendingClaim> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Mark a resolution as started and hand back a snapshot of the entry.
    /// An entry whose window has lapsed counts as resolved even if its
    /// expiry timer has not run yet.
    pub async fn begin(&self, key: &ClaimKey, resolver: Resolver) -> Result<PendingClaim, BeginError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .ok_or(BeginError::Resolved)?;
        if resolver == Resolver::Snipe && !entry.snipeable() {
            return Err(BeginError::NotSnipeable);
        }
        let flag = entry.flag(resolver);
        if *flag {
            return Err(BeginError::InFlight);
        }
        *flag = true;
        Ok(entry.clone())
    }

    /// The store settled the character's ownership: the entry is done.
    /// Returns whether this call removed it.
    pub async fn finish(&self, key: &ClaimKey) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    /// A resolution gave up without settling ownership (insufficient
    /// points, store failure). The entry stays open unless its window lapsed
    /// meanwhile, in which case it is removed and returned as expired.
    pub async fn release(&self, key: &ClaimKey, resolver: Resolver) -> Option<PendingClaim> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(key)?;
        *entry.flag(resolver) = false;
        if !entry.in_flight() && entry.expires_at <= Instant::now() {
            return entries.remove(key);
        }
        None
    }

    /// Check-and-delete for the expiry timer. Entries with a resolution in
    /// flight are left for that resolution to finish.
    pub async fn expire(&self, key: &ClaimKey) -> Option<PendingClaim> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if !entry.in_flight() => entries.remove(key),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of the roller clicking "claim".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ClaimResult {
    Claimed {
        character: Character,
        points: i64,
        balance: i64,
    },
    /// The character was taken between the roll and the click; the
    /// duplicate bonus was awarded instead.
    ClaimedByOther {
        character: Character,
        owner: Option<UserId>,
        bonus: i64,
        balance: i64,
    },
    NotYourRoll,
    /// Already claimed, sniped, expired, or a claim is in progress.
    AlreadyResolved,
}

/// Result of a third party clicking "snipe".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SnipeResult {
    Sniped {
        character: Character,
        cost: i64,
        balance: i64,
        cooldown_secs: u64,
    },
    /// Lost the race at the store; the cost was refunded.
    SnipeFailed { character: Character, refunded: i64 },
    InsufficientPoints { cost: i64, balance: i64 },
    OnCooldown { remaining_secs: u64 },
    OwnRoll,
    /// Lucky rolls cannot be sniped.
    NotSnipeable,
    /// Another snipe on this roll, or by this sniper, is in progress.
    SnipeInProgress,
    AlreadyResolved,
}
