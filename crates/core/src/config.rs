//! Game tuning parameters.
//!
//! Values are read from the environment by the API binary; the defaults
//! here match the live game.

use std::time::Duration;

use crate::lucky::DEFAULT_LUCKY_INTERVAL;
use crate::quota::QuotaPolicy;
use crate::types::UserId;

/// What to do when an append to the roll history fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryWritePolicy {
    /// Log and carry on; the surrounding action still succeeds.
    #[default]
    BestEffort,
    /// Fail the surrounding action.
    Strict,
}

impl std::str::FromStr for HistoryWritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "best_effort" | "best-effort" => Ok(Self::BestEffort),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown history write policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Upper bound (inclusive) of valid catalog ids.
    pub max_character_id: i64,
    /// Catalog lookups attempted per roll before giving up.
    pub max_fetch_attempts: u32,
    pub quota: QuotaPolicy,
    pub lucky_interval: i32,
    /// How long a rolled character stays claimable.
    pub claim_window: Duration,
    pub snipe_cooldown_main: Duration,
    pub snipe_cooldown_other: Duration,
    /// Lifetime of an unanswered or unconfirmed trade.
    pub trade_expiry: Duration,
    /// Time to confirm a pack purchase.
    pub pack_confirm_window: Duration,
    /// Time to reveal an opened pack before the rest is revealed for you.
    pub pack_reveal_window: Duration,
    pub gift_confirm_window: Duration,
    pub history_policy: HistoryWritePolicy,
    pub admin_user_ids: Vec<UserId>,
}

impl GameConfig {
    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admin_user_ids.contains(user)
    }

    /// Cooldown a sniper receives for the given character role.
    pub fn snipe_cooldown(&self, main_role: bool) -> Duration {
        if main_role {
            self.snipe_cooldown_main
        } else {
            self.snipe_cooldown_other
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_character_id: 276_935,
            max_fetch_attempts: 5,
            quota: QuotaPolicy::default(),
            lucky_interval: DEFAULT_LUCKY_INTERVAL,
            claim_window: Duration::from_secs(30),
            snipe_cooldown_main: Duration::from_secs(600),
            snipe_cooldown_other: Duration::from_secs(60),
            trade_expiry: Duration::from_secs(600),
            pack_confirm_window: Duration::from_secs(60),
            pack_reveal_window: Duration::from_secs(600),
            gift_confirm_window: Duration::from_secs(60),
            history_policy: HistoryWritePolicy::default(),
            admin_user_ids: Vec::new(),
        }
    }
}
