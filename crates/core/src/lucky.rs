//! Lucky-roll counter.
//!
//! Every `interval`-th roll a player makes is lucky. The persisted counter
//! counts rolls since the last lucky one and is reset to zero the moment a
//! lucky roll lands.

/// Default number of rolls per lucky roll.
pub const DEFAULT_LUCKY_INTERVAL: i32 = 10;

/// Result of advancing the counter by one roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LuckyAdvance {
    /// Counter value to persist.
    pub count: i32,
    /// Whether the roll that advanced the counter is lucky.
    pub lucky: bool,
}

/// Advance the counter for one roll.
pub fn advance(count: i32, interval: i32) -> LuckyAdvance {
    let next = count.saturating_add(1);
    if interval > 0 && next > 0 && next % interval == 0 {
        LuckyAdvance {
            count: 0,
            lucky: true,
        }
    } else {
        LuckyAdvance {
            count: next,
            lucky: false,
        }
    }
}

/// Rolls remaining until the next lucky roll, as shown to players.
///
/// A freshly reset counter reads as a full interval (`0` → `10`), never as
/// zero.
pub fn rolls_until_lucky(count: i32, interval: i32) -> i32 {
    if interval <= 0 {
        return 0;
    }
    interval - count.rem_euclid(interval)
}
