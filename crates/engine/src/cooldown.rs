//! Snipe cooldowns.
//!
//! A sniper holds one slot: either a snipe is in flight or a cooldown is
//! running. The slot is reserved before a snipe touches the store, so the
//! same player cannot start two snipes at once.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use waifu_core::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    InFlight,
    CoolingUntil(Instant),
}

/// Why a snipe could not reserve the sniper's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Busy {
    InFlight,
    Cooldown(Duration),
}

#[derive(Default)]
pub struct SnipeCooldowns {
    slots: DashMap<UserId, Slot>,
}

impl SnipeCooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `user`'s slot for one snipe. Lapsed cooldowns are replaced.
    pub fn reserve(&self, user: &UserId) -> Result<SnipeSlot<'_>, Busy> {
        let now = Instant::now();
        match self.slots.entry(user.clone()) {
            Entry::Occupied(mut entry) => match *entry.get() {
                Slot::InFlight => return Err(Busy::InFlight),
                Slot::CoolingUntil(until) if until > now => {
                    return Err(Busy::Cooldown(until - now));
                }
                Slot::CoolingUntil(_) => {
                    entry.insert(Slot::InFlight);
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(Slot::InFlight);
            }
        }
        Ok(SnipeSlot {
            cooldowns: self,
            user: user.clone(),
            settled: false,
        })
    }
}

/// A reserved sniper slot. Dropping it without [`SnipeSlot::start_cooldown`]
/// frees the slot.
pub struct SnipeSlot<'a> {
    cooldowns: &'a SnipeCooldowns,
    user: UserId,
    settled: bool,
}

impl SnipeSlot<'_> {
    /// The snipe won: turn the reservation into a running cooldown.
    pub fn start_cooldown(mut self, duration: Duration) {
        self.cooldowns
            .slots
            .insert(self.user.clone(), Slot::CoolingUntil(Instant::now() + duration));
        self.settled = true;
    }
}

impl Drop for SnipeSlot<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.cooldowns
                .slots
                .remove_if(&self.user, |_, slot| *slot == Slot::InFlight);
        }
    }
}
