pub mod admin;
pub mod catalog;
pub mod interactions;
pub mod packs;
pub mod rolls;
pub mod trades;
pub mod users;

use waifu_core::error::CoreError;
use waifu_core::types::UserId;

/// Parse a player id from a request body or path segment.
pub(crate) fn parse_user(raw: &str) -> Result<UserId, CoreError> {
    UserId::parse(raw)
}

/// Parse a button token (`ClaimKey`, `TradeKey`, ...) from a path segment.
pub(crate) fn parse_token<T>(raw: &str) -> Result<T, CoreError>
where
    T: std::str::FromStr<Err = CoreError>,
{
    raw.parse()
}
