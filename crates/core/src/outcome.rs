//! What a roll produced, for the frontend to render.

use serde::Serialize;

use crate::character::Character;
use crate::token::{ClaimKey, Interaction};
use crate::types::UserId;

/// Every way a character can land in front of a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RollOutcome {
    /// Unowned character; the roller may claim it and others may snipe it.
    Fresh {
        claim: ClaimKey,
        character: Character,
        points: i64,
    },
    /// Lucky roll: point floor applied, claimable, never snipeable.
    Lucky {
        claim: ClaimKey,
        character: Character,
        points: i64,
    },
    /// Already owned by someone; the flat bonus has been awarded.
    Duplicate {
        character: Character,
        owner: UserId,
        bonus: i64,
    },
    /// Handed out directly by an admin.
    Reserved {
        character: Character,
        recipient: UserId,
    },
}

impl RollOutcome {
    pub fn character(&self) -> &Character {
        match self {
            RollOutcome::Fresh { character, .. }
            | RollOutcome::Lucky { character, .. }
            | RollOutcome::Duplicate { character, .. }
            | RollOutcome::Reserved { character, .. } => character,
        }
    }

    /// Buttons the frontend should attach, as interaction tokens.
    pub fn interactions(&self) -> Vec<Interaction> {
        match self {
            RollOutcome::Fresh { claim, .. } => vec![
                Interaction::Claim(claim.clone()),
                Interaction::Snipe(claim.clone()),
            ],
            RollOutcome::Lucky { claim, .. } => vec![Interaction::Claim(claim.clone())],
            RollOutcome::Duplicate { .. } | RollOutcome::Reserved { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character() -> Character {
        Character {
            id: 5,
            name: "Lelouch".into(),
            favorites: 150_000,
            image_url: None,
            about: None,
            appearance: None,
        }
    }

    fn key() -> ClaimKey {
        ClaimKey {
            roller: UserId::new("1"),
            character_id: 5,
            issued_at_ms: 10,
        }
    }

    #[test]
    fn lucky_rolls_offer_no_snipe_button() {
        let lucky = RollOutcome::Lucky {
            claim: key(),
            character: character(),
            points: 750,
        };
        assert_eq!(lucky.interactions(), vec![Interaction::Claim(key())]);
    }

    #[test]
    fn fresh_rolls_offer_claim_and_snipe() {
        let fresh = RollOutcome::Fresh {
            claim: key(),
            character: character(),
            points: 250,
        };
        assert_eq!(fresh.interactions().len(), 2);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let dup = RollOutcome::Duplicate {
            character: character(),
            owner: UserId::new("2"),
            bonus: 150,
        };
        let json = serde_json::to_value(&dup).unwrap();
        assert_eq!(json["kind"], "duplicate");
        assert_eq!(json["owner"], "2");
    }
}
