//! Row structs and insert DTOs.
//!
//! Each submodule contains a `FromRow` struct matching the database row and,
//! where rows are created from the engine, a create DTO.

pub mod roll_history;
pub mod user;
pub mod user_character;
