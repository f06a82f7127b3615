//! Wire shapes of the catalog's JSON responses.
//!
//! Only the fields the game reads are modelled; everything else in the
//! payload is ignored.

use serde::Deserialize;
use waifu_core::character::{AnimeAppearance, Character};

/// `{ "data": T }` envelope used by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct CharacterPayload {
    pub mal_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub favorites: Option<i64>,
    #[serde(default)]
    pub images: Option<Images>,
    #[serde(default)]
    pub about: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Images {
    #[serde(default)]
    pub jpg: Option<ImageUrls>,
    #[serde(default)]
    pub webp: Option<ImageUrls>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageUrls {
    #[serde(default)]
    pub image_url: Option<String>,
}

/// One entry of `/characters/{id}/anime`.
#[derive(Debug, Deserialize)]
pub struct AppearancePayload {
    pub role: String,
    pub anime: AnimeRef,
}

#[derive(Debug, Deserialize)]
pub struct AnimeRef {
    pub title: String,
}

impl CharacterPayload {
    fn image_url(&self) -> Option<String> {
        let images = self.images.as_ref()?;
        images
            .jpg
            .as_ref()
            .and_then(|i| i.image_url.clone())
            .or_else(|| images.webp.as_ref().and_then(|i| i.image_url.clone()))
    }

    /// Convert into the domain model. The first listed appearance is the
    /// character's primary one.
    pub fn into_character(self, appearances: &[AppearancePayload]) -> Character {
        let image_url = self.image_url();
        Character {
            id: self.mal_id,
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Unknown Character".to_string()),
            favorites: self.favorites.unwrap_or(0).max(0),
            image_url,
            about: self.about.filter(|a| !a.trim().is_empty()),
            appearance: appearances.first().map(|a| AnimeAppearance {
                title: a.anime.title.clone(),
                role: a.role.clone(),
            }),
        }
    }
}
