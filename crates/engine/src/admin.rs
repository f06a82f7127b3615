//! Admin-only operations: direct gifts and ownership removal.
//!
//! Every entry point checks the caller against the configured admin ids
//! before touching anything and fails with `Forbidden` otherwise.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use waifu_core::character::Character;
use waifu_core::outcome::RollOutcome;
use waifu_core::token::{token_millis, GiftKey, Interaction};
use waifu_core::types::{CharacterId, UserId};
use waifu_events::GameEventKind;

use crate::error::{EngineError, EngineResult};
use crate::scheduler::TaskKey;
use crate::service::GameService;

struct PendingGift {
    character: Character,
    confirming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum GiftResult {
    Proposed { gift: GiftKey, character: Character },
    Gifted { outcome: RollOutcome },
    AlreadyOwned {
        character_id: CharacterId,
        owner: Option<UserId>,
    },
    UnknownCharacter { character_id: CharacterId },
    Cancelled { gift: GiftKey },
    /// A confirmation for this gift is already running.
    InProgress,
    Removed {
        character_id: CharacterId,
        previous_owner: UserId,
    },
    NotOwned { character_id: CharacterId },
}

#[derive(Default)]
pub struct GiftBook {
    gifts: Mutex<HashMap<GiftKey, PendingGift>>,
}

impl GiftBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.gifts.lock().await.len()
    }

    async fn insert(&self, key: GiftKey, character: Character) {
        self.gifts.lock().await.insert(
            key,
            PendingGift {
                character,
                confirming: false,
            },
        );
    }

    /// `None` when unknown, `Some(Err(()))` when already confirming.
    async fn begin_confirm(&self, key: &GiftKey) -> Option<Result<Character, ()>> {
        let mut gifts = self.gifts.lock().await;
        let gift = gifts.get_mut(key)?;
        if gift.confirming {
            return Some(Err(()));
        }
        gift.confirming = true;
        Some(Ok(gift.character.clone()))
    }

    async fn abort_confirm(&self, key: &GiftKey) {
        if let Some(gift) = self.gifts.lock().await.get_mut(key) {
            gift.confirming = false;
        }
    }

    async fn finish(&self, key: &GiftKey) {
        self.gifts.lock().await.remove(key);
    }

    /// Remove unless a confirmation is running.
    async fn remove_idle(&self, key: &GiftKey) -> Option<Result<(), ()>> {
        let mut gifts = self.gifts.lock().await;
        if gifts.get(key)?.confirming {
            return Some(Err(()));
        }
        gifts.remove(key);
        Some(Ok(()))
    }
}

impl GameService {
    fn require_admin(&self, user: &UserId) -> EngineResult<()> {
        if self.config.is_admin(user) {
            Ok(())
        } else {
            tracing::warn!(user = %user, "Admin operation refused");
            Err(EngineError::forbidden("admin only"))
        }
    }

    /// Stage a gift of `character_id` to `target`, pending the admin's
    /// confirmation.
    pub async fn propose_gift(
        &self,
        admin: &UserId,
        target: &UserId,
        target_username: &str,
        character_id: CharacterId,
    ) -> EngineResult<GiftResult> {
        self.require_admin(admin)?;

        let Some(character) = self.catalog.fetch(character_id).await? else {
            return Ok(GiftResult::UnknownCharacter { character_id });
        };
        if let Some(owner) = self.store.owner_of(character_id).await? {
            return Ok(GiftResult::AlreadyOwned {
                character_id,
                owner: Some(owner),
            });
        }
        self.store.ensure_user(target, target_username).await?;

        let key = GiftKey {
            admin: admin.clone(),
            target: target.clone(),
            character_id,
            created_at_ms: token_millis(Utc::now()),
        };
        self.state.gifts.insert(key.clone(), character.clone()).await;

        let service = self.clone();
        let expiring = key.clone();
        self.state.scheduler.schedule(
            TaskKey::GiftExpiry(key.clone()),
            self.config.gift_confirm_window,
            async move {
                service.expire_gift(&expiring).await;
            },
        );

        tracing::info!(admin = %admin, target = %target, character_id, "Gift proposed");
        Ok(GiftResult::Proposed {
            gift: key,
            character,
        })
    }

    pub async fn confirm_gift(&self, key: &GiftKey, admin: &UserId) -> EngineResult<GiftResult> {
        self.require_admin(admin)?;
        if admin != &key.admin {
            return Err(EngineError::forbidden("gift belongs to another admin"));
        }
        let character = match self.state.gifts.begin_confirm(key).await {
            None => return Err(EngineError::not_found("gift", key)),
            Some(Err(())) => return Ok(GiftResult::InProgress),
            Some(Ok(character)) => character,
        };

        let won = match self.store.claim_if_unowned(&key.target, &character).await {
            Ok(won) => won,
            Err(e) => {
                self.state.gifts.abort_confirm(key).await;
                return Err(e.into());
            }
        };
        self.state.gifts.finish(key).await;
        self.state
            .scheduler
            .cancel(&TaskKey::GiftExpiry(key.clone()));

        if !won {
            let owner = self.store.owner_of(key.character_id).await?;
            tracing::warn!(gift = %key, "Gifted character was claimed first");
            return Ok(GiftResult::AlreadyOwned {
                character_id: key.character_id,
                owner,
            });
        }

        tracing::info!(admin = %admin, target = %key.target, character_id = key.character_id, "Character gifted");
        Ok(GiftResult::Gifted {
            outcome: RollOutcome::Reserved {
                character,
                recipient: key.target.clone(),
            },
        })
    }

    pub async fn cancel_gift(&self, key: &GiftKey, admin: &UserId) -> EngineResult<GiftResult> {
        self.require_admin(admin)?;
        if admin != &key.admin {
            return Err(EngineError::forbidden("gift belongs to another admin"));
        }
        match self.state.gifts.remove_idle(key).await {
            None => Err(EngineError::not_found("gift", key)),
            Some(Err(())) => Ok(GiftResult::InProgress),
            Some(Ok(())) => {
                self.state
                    .scheduler
                    .cancel(&TaskKey::GiftExpiry(key.clone()));
                tracing::info!(gift = %key, "Gift cancelled");
                Ok(GiftResult::Cancelled { gift: key.clone() })
            }
        }
    }

    /// Delete a character's ownership record, freeing it to be rolled
    /// again.
    pub async fn remove_character(
        &self,
        admin: &UserId,
        character_id: CharacterId,
    ) -> EngineResult<GiftResult> {
        self.require_admin(admin)?;

        let Some(owned) = self.store.find_owned(character_id).await? else {
            return Ok(GiftResult::NotOwned { character_id });
        };
        if !self.store.remove_ownership(character_id).await? {
            return Ok(GiftResult::NotOwned { character_id });
        }

        tracing::info!(admin = %admin, character_id, previous_owner = %owned.owner, "Ownership removed");
        self.publish(
            GameEventKind::CharacterRemoved {
                character_id,
                by: admin.clone(),
            },
            None,
        );
        Ok(GiftResult::Removed {
            character_id,
            previous_owner: owned.owner,
        })
    }

    async fn expire_gift(&self, key: &GiftKey) {
        if let Some(Ok(())) = self.state.gifts.remove_idle(key).await {
            tracing::info!(gift = %key, "Gift expired unconfirmed");
            self.publish(
                GameEventKind::GiftExpired { gift: key.clone() },
                Some(Interaction::GiftConfirm(key.clone()).to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use waifu_core::config::GameConfig;
    use waifu_core::error::CoreError;

    use super::*;
    use crate::testing::{character, Harness};

    fn admin() -> UserId {
        UserId::new("admin")
    }

    fn harness() -> Harness {
        let h = Harness::new(GameConfig {
            admin_user_ids: vec![admin()],
            ..GameConfig::default()
        });
        h.catalog.insert(character(40, 400, true));
        h
    }

    async fn proposed(h: &Harness, target: &UserId) -> GiftKey {
        let result = h
            .service
            .propose_gift(&admin(), target, "target", 40)
            .await
            .unwrap();
        let GiftResult::Proposed { gift, .. } = result else {
            panic!("expected proposal, got {result:?}");
        };
        gift
    }

    #[tokio::test]
    async fn non_admins_are_forbidden_and_change_nothing() {
        let h = harness();
        let mallory = UserId::new("mallory");
        h.store.seed_owned(&UserId::new("owner"), &character(7, 1, false));

        let gift = h.service.propose_gift(&mallory, &mallory, "mallory", 40).await;
        assert_matches!(gift, Err(EngineError::Core(CoreError::Forbidden(_))));
        let removal = h.service.remove_character(&mallory, 7).await;
        assert_matches!(removal, Err(EngineError::Core(CoreError::Forbidden(_))));

        assert_eq!(h.store.owner(7), Some(UserId::new("owner")));
        assert!(h.store.user(&mallory).is_none());
        assert_eq!(h.service.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn confirmed_gift_reserves_the_character_for_the_target() {
        let h = harness();
        let target = UserId::new("target");
        let key = proposed(&h, &target).await;

        let result = h.service.confirm_gift(&key, &admin()).await.unwrap();
        assert_matches!(
            result,
            GiftResult::Gifted { outcome: RollOutcome::Reserved { recipient, .. } } if recipient == target
        );
        assert_eq!(h.store.owner(40), Some(target.clone()));
        assert_eq!(h.store.points(&target), 0);
        assert_eq!(h.service.pending_tasks(), 0);

        let again = h.service.confirm_gift(&key, &admin()).await;
        assert_matches!(again, Err(EngineError::Core(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn gift_fails_when_claimed_in_the_meantime() {
        let h = harness();
        let target = UserId::new("target");
        let key = proposed(&h, &target).await;
        h.store.seed_owned(&UserId::new("quick"), &character(40, 400, true));

        let result = h.service.confirm_gift(&key, &admin()).await.unwrap();
        assert_matches!(result, GiftResult::AlreadyOwned { owner: Some(_), .. });
        assert_eq!(h.store.owner(40), Some(UserId::new("quick")));
    }

    #[tokio::test]
    async fn unknown_and_owned_characters_are_not_staged() {
        let h = harness();
        let target = UserId::new("target");
        let unknown = h
            .service
            .propose_gift(&admin(), &target, "target", 999)
            .await
            .unwrap();
        assert_eq!(unknown, GiftResult::UnknownCharacter { character_id: 999 });

        h.store.seed_owned(&UserId::new("owner"), &character(40, 400, true));
        let owned = h
            .service
            .propose_gift(&admin(), &target, "target", 40)
            .await
            .unwrap();
        assert_matches!(owned, GiftResult::AlreadyOwned { .. });
        assert_eq!(h.service.state.gifts.len().await, 0);
    }

    #[tokio::test]
    async fn removal_frees_the_character() {
        let h = harness();
        let owner = UserId::new("owner");
        h.store.seed_owned(&owner, &character(40, 400, true));

        let result = h.service.remove_character(&admin(), 40).await.unwrap();
        assert_eq!(
            result,
            GiftResult::Removed {
                character_id: 40,
                previous_owner: owner,
            }
        );
        assert_eq!(h.store.owner(40), None);

        let again = h.service.remove_character(&admin(), 40).await.unwrap();
        assert_eq!(again, GiftResult::NotOwned { character_id: 40 });
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_gifts_expire() {
        let h = harness();
        let target = UserId::new("target");
        let key = proposed(&h, &target).await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        let late = h.service.confirm_gift(&key, &admin()).await;
        assert_matches!(late, Err(EngineError::Core(CoreError::NotFound { .. })));
        assert_eq!(h.store.owner(40), None);
    }

    #[tokio::test]
    async fn cancelled_gift_grants_nothing() {
        let h = harness();
        let target = UserId::new("target");
        let key = proposed(&h, &target).await;

        let result = h.service.cancel_gift(&key, &admin()).await.unwrap();
        assert_matches!(result, GiftResult::Cancelled { .. });
        assert_eq!(h.store.owner(40), None);
        assert_eq!(h.service.pending_tasks(), 0);
    }
}
