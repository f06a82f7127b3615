use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Catalog character identifier (the remote catalog's numeric id).
pub type CharacterId = i64;

/// Stable external identity of a player, as issued by the chat platform.
///
/// Ids end up inside interaction tokens, so they may not contain the token
/// delimiter or whitespace. Use [`UserId::parse`] at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an id without validation. Intended for values read back from
    /// the database, which were validated on the way in.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Validate and wrap an externally supplied id.
    pub fn parse(id: &str) -> Result<Self, CoreError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("user id must not be empty".into()));
        }
        if trimmed.len() > 32 || trimmed.contains(':') || trimmed.contains(char::is_whitespace) {
            return Err(CoreError::Validation(format!("invalid user id '{trimmed}'")));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_accepts_snowflakes() {
        let id = UserId::parse(" 153872594217598976 ").unwrap();
        assert_eq!(id.as_str(), "153872594217598976");
    }

    #[test]
    fn parse_rejects_delimiters_and_blanks() {
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("12:34").is_err());
        assert!(UserId::parse("12 34").is_err());
    }
}
