//! Waifu gacha domain logic.
//!
//! Everything in this crate is pure: no I/O, no runtime, no internal deps.
//! The storage and catalog seams are described as traits in [`ports`] and
//! implemented by the `db` and `catalog` crates.

pub mod character;
pub mod config;
pub mod error;
pub mod lucky;
pub mod outcome;
pub mod points;
pub mod ports;
pub mod quota;
pub mod token;
pub mod types;
