//! Delayed tasks keyed by the entity they expire.
//!
//! Every timer in the game (claim expiry, trade expiry, pack windows, gift
//! confirmation) goes through one [`Scheduler`], so pending work can be
//! counted, inspected and cancelled by key. Each task runs on its own
//! Tokio task and races its delay against a per-task
//! [`CancellationToken`]; shutting the scheduler down cancels them all.
//!
//! Cancellation is best-effort: a task whose delay has already elapsed may
//! be running when `cancel` is called. Callbacks therefore re-check the
//! state they act on.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use waifu_core::token::{ClaimKey, GiftKey, PackKey, TradeKey};

/// What a scheduled task will act on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    ClaimExpiry(ClaimKey),
    TradeExpiry(TradeKey),
    PackConfirmExpiry(PackKey),
    PackAutoReveal(PackKey),
    GiftExpiry(GiftKey),
}

struct Scheduled {
    id: u64,
    cancel: CancellationToken,
}

type TaskMap = HashMap<TaskKey, Scheduled>;

pub struct Scheduler {
    tasks: Arc<Mutex<TaskMap>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl Scheduler {
    /// Tasks are cancelled when `shutdown` is.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    /// Run `task` after `delay` unless cancelled first. Scheduling under a
    /// key that already has a task replaces (and cancels) the old one.
    pub fn schedule<F>(&self, key: TaskKey, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();

        if let Some(previous) = lock(&self.tasks).insert(
            key.clone(),
            Scheduled {
                id,
                cancel: cancel.clone(),
            },
        ) {
            previous.cancel.cancel();
        }

        let tasks = Arc::clone(&self.tasks);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(?key, "Scheduled task cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut tasks = lock(&tasks);
                        if tasks.get(&key).is_some_and(|t| t.id == id) {
                            tasks.remove(&key);
                        }
                    }
                    tracing::debug!(?key, "Scheduled task firing");
                    task.await;
                }
            }
        });
    }

    /// Cancel the task under `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &TaskKey) -> bool {
        match lock(&self.tasks).remove(key) {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, key: &TaskKey) -> bool {
        lock(&self.tasks).contains_key(key)
    }

    pub fn pending(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Cancel everything, including tasks scheduled later.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        lock(&self.tasks).clear();
    }
}

fn lock(tasks: &Mutex<TaskMap>) -> MutexGuard<'_, TaskMap> {
    tasks.lock().unwrap_or_else(|e| e.into_inner())
}
