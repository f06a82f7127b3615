//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod roll_history_repo;
pub mod user_character_repo;
pub mod user_repo;

pub use roll_history_repo::RollHistoryRepo;
pub use user_character_repo::UserCharacterRepo;
pub use user_repo::UserRepo;
