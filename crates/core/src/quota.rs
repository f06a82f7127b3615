//! Rolling-window roll quota.
//!
//! Each player may roll `max_rolls` times per fixed `period`. The window is
//! persisted as `(rolls_in_period, period_start_time)` on the user row; this
//! module decides what a roll request is allowed to do with it. Consuming
//! quota is a separate store call made by the roll flow.

use std::time::Duration;

use serde::Serialize;

use crate::types::Timestamp;

/// Default rolls allowed per window.
pub const DEFAULT_MAX_ROLLS: i32 = 3;

/// Default window length.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub period: Duration,
    pub max_rolls: i32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            max_rolls: DEFAULT_MAX_ROLLS,
        }
    }
}

/// Persisted window state for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWindow {
    pub rolls_in_period: i32,
    pub period_start: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Rolls left in the window before this roll is consumed.
    pub rolls_remaining: i32,
    /// Time until the window resets. Zero when allowed.
    pub wait: Duration,
    /// The window has lapsed and must be reset before consuming.
    pub reset: bool,
}

/// Decide whether a roll may proceed at `now`.
pub fn check(window: &QuotaWindow, now: Timestamp, policy: &QuotaPolicy) -> QuotaDecision {
    let elapsed = (now - window.period_start).to_std().unwrap_or(Duration::ZERO);

    if elapsed >= policy.period {
        return QuotaDecision {
            allowed: true,
            rolls_remaining: policy.max_rolls,
            wait: Duration::ZERO,
            reset: true,
        };
    }

    if window.rolls_in_period < policy.max_rolls {
        return QuotaDecision {
            allowed: true,
            rolls_remaining: policy.max_rolls - window.rolls_in_period,
            wait: Duration::ZERO,
            reset: false,
        };
    }

    QuotaDecision {
        allowed: false,
        rolls_remaining: 0,
        wait: policy.period - elapsed,
        reset: false,
    }
}
