//! Catalog character model.
//!
//! A [`Character`] is what the catalog client returns and what gets
//! denormalized into an ownership record at claim time.

use serde::{Deserialize, Serialize};

use crate::types::CharacterId;

/// Role label the catalog uses for a series' lead characters.
pub const MAIN_ROLE: &str = "Main";

/// The character's primary series appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeAppearance {
    pub title: String,
    /// Catalog role label, e.g. `"Main"` or `"Supporting"`.
    pub role: String,
}

impl AnimeAppearance {
    pub fn is_main(&self) -> bool {
        self.role.eq_ignore_ascii_case(MAIN_ROLE)
    }
}

/// A character as supplied by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub favorites: i64,
    pub image_url: Option<String>,
    pub about: Option<String>,
    /// `None` for listings (top / search) where appearances are not fetched,
    /// and for characters without any series credit.
    pub appearance: Option<AnimeAppearance>,
}

impl Character {
    /// Whether the character's primary role is a lead role.
    pub fn is_main_role(&self) -> bool {
        self.appearance.as_ref().is_some_and(AnimeAppearance::is_main)
    }

    pub fn anime_title(&self) -> Option<&str> {
        self.appearance.as_ref().map(|a| a.title.as_str())
    }

    pub fn role(&self) -> Option<&str> {
        self.appearance.as_ref().map(|a| a.role.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_role(role: &str) -> Character {
        Character {
            id: 1,
            name: "Holo".into(),
            favorites: 10,
            image_url: None,
            about: None,
            appearance: Some(AnimeAppearance {
                title: "Spice and Wolf".into(),
                role: role.into(),
            }),
        }
    }

    #[test]
    fn main_role_is_case_insensitive() {
        assert!(with_role("Main").is_main_role());
        assert!(with_role("main").is_main_role());
        assert!(!with_role("Supporting").is_main_role());
    }

    #[test]
    fn missing_appearance_is_not_main() {
        let mut c = with_role("Main");
        c.appearance = None;
        assert!(!c.is_main_role());
        assert_eq!(c.anime_title(), None);
    }
}
