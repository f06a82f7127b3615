//! Typed interaction tokens.
//!
//! The chat frontend attaches an opaque `custom_id` string to every button
//! it renders and hands it back on click. Inside the core those strings are
//! always one of the typed keys below; the string form exists only at the
//! boundary (`Display` to encode, `FromStr` to decode).
//!
//! Wire layout (`:`-delimited, user ids never contain `:`):
//!
//! ```text
//! claim:<roller>:<character>:<issued_ms>
//! snipe:<roller>:<character>:<issued_ms>
//! collection:<owner>:<page>
//! trade_confirm:<initiator>:<target>:<created_ms>
//! trade_cancel:<initiator>:<target>:<created_ms>
//! pack_confirm:<buyer>:<kind>:<created_ms>
//! pack_cancel:<buyer>:<kind>:<created_ms>
//! pack_reveal:<buyer>:<kind>:<created_ms>:<slot>
//! gift_confirm:<admin>:<target>:<character>:<created_ms>
//! gift_cancel:<admin>:<target>:<character>:<created_ms>
//! top:<page>
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{CharacterId, Timestamp, UserId};

const DELIMITER: char = ':';

/// Millisecond precision keeps keys stable across an encode/decode trip.
pub fn token_millis(at: Timestamp) -> i64 {
    at.timestamp_millis()
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Identifies one pending claim: who rolled what, and when.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimKey {
    pub roller: UserId,
    pub character_id: CharacterId,
    pub issued_at_ms: i64,
}

/// Identifies one pending trade between two players.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeKey {
    pub initiator: UserId,
    pub target: UserId,
    pub created_at_ms: i64,
}

/// Pack tiers on sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackKind {
    Standard,
    Premium,
}

impl PackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PackKind::Standard => "standard",
            PackKind::Premium => "premium",
        }
    }

    /// Price in points.
    pub fn cost(self) -> i64 {
        match self {
            PackKind::Standard => 2_500,
            PackKind::Premium => 10_000,
        }
    }

    /// Characters per pack.
    pub fn slot_count(self) -> usize {
        5
    }

    /// Leading slots drawn from the most favorited characters.
    pub fn guaranteed_top_slots(self) -> usize {
        match self {
            PackKind::Standard => 0,
            PackKind::Premium => 1,
        }
    }
}

impl FromStr for PackKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(PackKind::Standard),
            "premium" => Ok(PackKind::Premium),
            other => Err(CoreError::Validation(format!("unknown pack kind '{other}'"))),
        }
    }
}

/// Identifies one pack purchase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackKey {
    pub buyer: UserId,
    pub kind: PackKind,
    pub created_at_ms: i64,
}

/// Identifies one admin gift awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GiftKey {
    pub admin: UserId,
    pub target: UserId,
    pub character_id: CharacterId,
    pub created_at_ms: i64,
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.roller, self.character_id, self.issued_at_ms)
    }
}

impl fmt::Display for TradeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.initiator, self.target, self.created_at_ms)
    }
}

impl fmt::Display for PackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.buyer, self.kind.as_str(), self.created_at_ms)
    }
}

impl fmt::Display for GiftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.admin, self.target, self.character_id, self.created_at_ms
        )
    }
}

impl FromStr for ClaimKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [roller, character, issued] = split_exact::<3>(s)?;
        Ok(Self {
            roller: UserId::parse(roller)?,
            character_id: parse_num(character, "character id")?,
            issued_at_ms: parse_num(issued, "timestamp")?,
        })
    }
}

impl FromStr for TradeKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [initiator, target, created] = split_exact::<3>(s)?;
        Ok(Self {
            initiator: UserId::parse(initiator)?,
            target: UserId::parse(target)?,
            created_at_ms: parse_num(created, "timestamp")?,
        })
    }
}

impl FromStr for PackKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [buyer, kind, created] = split_exact::<3>(s)?;
        Ok(Self {
            buyer: UserId::parse(buyer)?,
            kind: kind.parse()?,
            created_at_ms: parse_num(created, "timestamp")?,
        })
    }
}

impl FromStr for GiftKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [admin, target, character, created] = split_exact::<4>(s)?;
        Ok(Self {
            admin: UserId::parse(admin)?,
            target: UserId::parse(target)?,
            character_id: parse_num(character, "character id")?,
            created_at_ms: parse_num(created, "timestamp")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Interaction
// ---------------------------------------------------------------------------

/// A decoded button click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Claim(ClaimKey),
    Snipe(ClaimKey),
    CollectionPage { owner: UserId, page: u32 },
    TradeConfirm(TradeKey),
    TradeCancel(TradeKey),
    PackConfirm(PackKey),
    PackCancel(PackKey),
    PackSlotReveal { pack: PackKey, slot: usize },
    GiftConfirm(GiftKey),
    GiftCancel(GiftKey),
    TopPage { page: u32 },
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interaction::Claim(key) => write!(f, "claim:{key}"),
            Interaction::Snipe(key) => write!(f, "snipe:{key}"),
            Interaction::CollectionPage { owner, page } => write!(f, "collection:{owner}:{page}"),
            Interaction::TradeConfirm(key) => write!(f, "trade_confirm:{key}"),
            Interaction::TradeCancel(key) => write!(f, "trade_cancel:{key}"),
            Interaction::PackConfirm(key) => write!(f, "pack_confirm:{key}"),
            Interaction::PackCancel(key) => write!(f, "pack_cancel:{key}"),
            Interaction::PackSlotReveal { pack, slot } => write!(f, "pack_reveal:{pack}:{slot}"),
            Interaction::GiftConfirm(key) => write!(f, "gift_confirm:{key}"),
            Interaction::GiftCancel(key) => write!(f, "gift_cancel:{key}"),
            Interaction::TopPage { page } => write!(f, "top:{page}"),
        }
    }
}

impl FromStr for Interaction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (action, rest) = s
            .split_once(DELIMITER)
            .ok_or_else(|| invalid_token(s))?;

        match action {
            "claim" => Ok(Interaction::Claim(rest.parse()?)),
            "snipe" => Ok(Interaction::Snipe(rest.parse()?)),
            "collection" => {
                let [owner, page] = split_exact::<2>(rest)?;
                Ok(Interaction::CollectionPage {
                    owner: UserId::parse(owner)?,
                    page: parse_num(page, "page")?,
                })
            }
            "trade_confirm" => Ok(Interaction::TradeConfirm(rest.parse()?)),
            "trade_cancel" => Ok(Interaction::TradeCancel(rest.parse()?)),
            "pack_confirm" => Ok(Interaction::PackConfirm(rest.parse()?)),
            "pack_cancel" => Ok(Interaction::PackCancel(rest.parse()?)),
            "pack_reveal" => {
                let (pack, slot) = rest
                    .rsplit_once(DELIMITER)
                    .ok_or_else(|| invalid_token(s))?;
                Ok(Interaction::PackSlotReveal {
                    pack: pack.parse()?,
                    slot: parse_num(slot, "slot")?,
                })
            }
            "gift_confirm" => Ok(Interaction::GiftConfirm(rest.parse()?)),
            "gift_cancel" => Ok(Interaction::GiftCancel(rest.parse()?)),
            "top" => Ok(Interaction::TopPage {
                page: parse_num(rest, "page")?,
            }),
            _ => Err(invalid_token(s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn split_exact<const N: usize>(s: &str) -> Result<[&str; N], CoreError> {
    let parts: Vec<&str> = s.split(DELIMITER).collect();
    parts.try_into().map_err(|_| invalid_token(s))
}

fn parse_num<T: FromStr>(s: &str, what: &str) -> Result<T, CoreError> {
    s.parse()
        .map_err(|_| CoreError::Validation(format!("invalid {what} '{s}' in token")))
}

fn invalid_token(s: &str) -> CoreError {
    CoreError::Validation(format!("malformed interaction token '{s}'"))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn claim_key() -> ClaimKey {
        ClaimKey {
            roller: UserId::new("1001"),
            character_id: 417,
            issued_at_ms: 1_700_000_000_123,
        }
    }

    #[test]
    fn claim_and_snipe_share_the_key_layout() {
        let claim = Interaction::Claim(claim_key()).to_string();
        let snipe = Interaction::Snipe(claim_key()).to_string();
        assert_eq!(claim, "claim:1001:417:1700000000123");
        assert_eq!(snipe, "snipe:1001:417:1700000000123");
        assert_eq!(claim.parse::<Interaction>().unwrap(), Interaction::Claim(claim_key()));
    }

    #[test]
    fn pack_reveal_keeps_slot_separate_from_key() {
        let token = Interaction::PackSlotReveal {
            pack: PackKey {
                buyer: UserId::new("7"),
                kind: PackKind::Premium,
                created_at_ms: 42,
            },
            slot: 3,
        };
        let encoded = token.to_string();
        assert_eq!(encoded, "pack_reveal:7:premium:42:3");
        assert_eq!(encoded.parse::<Interaction>().unwrap(), token);
    }

    #[test]
    fn gift_key_parses_four_fields() {
        let parsed: Interaction = "gift_confirm:1:2:99:5".parse().unwrap();
        assert_matches!(parsed, Interaction::GiftConfirm(GiftKey { character_id: 99, .. }));
    }

    #[test]
    fn rejects_unknown_actions_and_bad_numbers() {
        assert!("frobnicate:1:2:3".parse::<Interaction>().is_err());
        assert!("claim:1001:abc:5".parse::<Interaction>().is_err());
        assert!("claim:1001:417".parse::<Interaction>().is_err());
        assert!("top".parse::<Interaction>().is_err());
        assert!("pack_confirm:1:mythic:5".parse::<Interaction>().is_err());
    }
}
