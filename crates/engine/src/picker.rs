//! Random character id selection.

use rand::Rng;
use waifu_core::types::CharacterId;

/// Chooses which catalog ids a roll tries and which top page a premium
/// slot draws from.
pub trait IdPicker: Send + Sync {
    /// A character id in `1..=max`.
    fn character_id(&self, max: CharacterId) -> CharacterId;

    /// An index in `0..len`. `len` is never zero.
    fn index(&self, len: usize) -> usize;
}

/// Uniform picks from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdPicker for RandomIds {
    fn character_id(&self, max: CharacterId) -> CharacterId {
        rand::rng().random_range(1..=max.max(1))
    }

    fn index(&self, len: usize) -> usize {
        rand::rng().random_range(0..len.max(1))
    }
}
