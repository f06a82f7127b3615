//! Per-user roll locks.
//!
//! A player may have at most one roll in flight. Acquisition never waits:
//! a second roll while the first is still running is rejected outright.

use std::sync::Arc;

use dashmap::DashSet;
use waifu_core::types::UserId;

#[derive(Default)]
pub struct RollLocks {
    held: Arc<DashSet<UserId>>,
}

impl RollLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `user`, or `None` if a roll is already running.
    pub fn try_acquire(&self, user: &UserId) -> Option<RollGuard> {
        self.held.insert(user.clone()).then(|| RollGuard {
            held: Arc::clone(&self.held),
            user: user.clone(),
        })
    }

    pub fn is_held(&self, user: &UserId) -> bool {
        self.held.contains(user)
    }
}

/// Releases the roll lock on drop, whatever path the roll took.
pub struct RollGuard {
    held: Arc<DashSet<UserId>>,
    user: UserId,
}

impl Drop for RollGuard {
    fn drop(&mut self) {
        self.held.remove(&self.user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_guard_drops() {
        let locks = RollLocks::new();
        let user = UserId::new("1");

        let guard = locks.try_acquire(&user).expect("first acquire");
        assert!(locks.try_acquire(&user).is_none());
        assert!(locks.try_acquire(&UserId::new("2")).is_some());

        drop(guard);
        assert!(!locks.is_held(&user));
        assert!(locks.try_acquire(&user).is_some());
    }

    #[test]
    fn released_on_early_return() {
        fn failing_roll(locks: &RollLocks, user: &UserId) -> Result<(), &'static str> {
            let _guard = locks.try_acquire(user).ok_or("busy")?;
            Err("catalog down")
        }

        let locks = RollLocks::new();
        let user = UserId::new("1");
        assert_eq!(failing_roll(&locks, &user), Err("catalog down"));
        assert!(!locks.is_held(&user));
    }
}
