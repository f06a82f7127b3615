//! In-memory ports for tests.
//!
//! [`MemoryStore`] mirrors the PostgreSQL store's semantics (conditional
//! insert, floored deduction, conditional spend, locked swap) and yields to
//! the runtime before every operation so concurrent callers interleave the
//! way they do against a real database.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use waifu_core::character::{AnimeAppearance, Character};
use waifu_core::config::GameConfig;
use waifu_core::lucky::{self, LuckyAdvance};
use waifu_core::ports::{
    CatalogError, CharacterCatalog, CollectionPage, GameStore, LeaderboardEntry, OwnedCharacter,
    OwnershipStore, PointsLedger, RollHistoryLog, RollQuotaStore, RollRecord, StoreError,
};
use waifu_core::quota::QuotaWindow;
use waifu_core::types::{CharacterId, Timestamp, UserId};
use waifu_events::EventBus;

use crate::picker::IdPicker;
use crate::service::GameService;

/// Build a catalog character. `main` sets a lead role in a placeholder
/// series.
pub fn character(id: CharacterId, favorites: i64, main: bool) -> Character {
    Character {
        id,
        name: format!("Character {id}"),
        favorites,
        image_url: Some(format!("https://cdn.example/{id}.jpg")),
        about: None,
        appearance: Some(AnimeAppearance {
            title: "Test Series".into(),
            role: if main { "Main" } else { "Supporting" }.into(),
        }),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemoryUser {
    pub username: String,
    pub total_points: i64,
    pub rolls_count: i64,
    pub rolls_in_period: i32,
    pub period_start: Timestamp,
    pub lucky_roll_count: i32,
}

impl MemoryUser {
    fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            total_points: 0,
            rolls_count: 0,
            rolls_in_period: 0,
            period_start: DateTime::<Utc>::UNIX_EPOCH,
            lucky_roll_count: 0,
        }
    }
}

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, MemoryUser>,
    owned: HashMap<CharacterId, OwnedCharacter>,
    history: Vec<RollRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    offline: AtomicBool,
    history_offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the database were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make only roll-history appends fail.
    pub fn set_history_offline(&self, offline: bool) {
        self.history_offline.store(offline, Ordering::SeqCst);
    }

    pub fn seed_user(&self, user: &UserId, points: i64) {
        let mut state = lock(&self.state);
        let row = state
            .users
            .entry(user.clone())
            .or_insert_with(|| MemoryUser::new(user.as_str()));
        row.total_points = points;
    }

    pub fn seed_owned(&self, user: &UserId, character: &Character) {
        let mut state = lock(&self.state);
        state
            .users
            .entry(user.clone())
            .or_insert_with(|| MemoryUser::new(user.as_str()));
        state
            .owned
            .insert(character.id, snapshot(user, character));
    }

    pub fn user(&self, user: &UserId) -> Option<MemoryUser> {
        lock(&self.state).users.get(user).cloned()
    }

    pub fn points(&self, user: &UserId) -> i64 {
        self.user(user).map_or(0, |u| u.total_points)
    }

    pub fn owner(&self, character_id: CharacterId) -> Option<UserId> {
        lock(&self.state)
            .owned
            .get(&character_id)
            .map(|o| o.owner.clone())
    }

    pub fn history(&self) -> Vec<RollRecord> {
        lock(&self.state).history.clone()
    }

    async fn enter(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        tokio::task::yield_now().await;
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        Ok(lock(&self.state))
    }
}

fn snapshot(user: &UserId, character: &Character) -> OwnedCharacter {
    OwnedCharacter {
        owner: user.clone(),
        character_id: character.id,
        name: character.name.clone(),
        image_url: character.image_url.clone(),
        anime_title: character.anime_title().map(str::to_string),
        role: character.role().map(str::to_string),
        favorites: character.favorites,
        claimed_at: Utc::now(),
    }
}

#[async_trait]
impl PointsLedger for MemoryStore {
    async fn ensure_user(&self, user: &UserId, username: &str) -> Result<(), StoreError> {
        let mut state = self.enter().await?;
        state
            .users
            .entry(user.clone())
            .and_modify(|u| u.username = username.to_string())
            .or_insert_with(|| MemoryUser::new(username));
        Ok(())
    }

    async fn add_points(&self, user: &UserId, points: i64) -> Result<i64, StoreError> {
        let mut state = self.enter().await?;
        Ok(state.users.get_mut(user).map_or(0, |u| {
            u.total_points += points;
            u.total_points
        }))
    }

    async fn deduct_points(&self, user: &UserId, points: i64) -> Result<i64, StoreError> {
        let mut state = self.enter().await?;
        Ok(state.users.get_mut(user).map_or(0, |u| {
            u.total_points = (u.total_points - points).max(0);
            u.total_points
        }))
    }

    async fn try_spend(&self, user: &UserId, cost: i64) -> Result<Option<i64>, StoreError> {
        let mut state = self.enter().await?;
        Ok(state
            .users
            .get_mut(user)
            .filter(|u| u.total_points >= cost)
            .map(|u| {
                u.total_points -= cost;
                u.total_points
            }))
    }

    async fn balance(&self, user: &UserId) -> Result<i64, StoreError> {
        let state = self.enter().await?;
        Ok(state.users.get(user).map_or(0, |u| u.total_points))
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let state = self.enter().await?;
        let mut entries: Vec<LeaderboardEntry> = state
            .users
            .iter()
            .map(|(id, u)| LeaderboardEntry {
                user_id: id.clone(),
                username: u.username.clone(),
                total_points: u.total_points,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then_with(|| a.user_id.as_str().cmp(b.user_id.as_str()))
        });
        entries.truncate(usize::try_from(limit.max(0)).unwrap_or(0));
        Ok(entries)
    }
}

#[async_trait]
impl RollQuotaStore for MemoryStore {
    async fn quota_window(&self, user: &UserId) -> Result<QuotaWindow, StoreError> {
        let state = self.enter().await?;
        Ok(state.users.get(user).map_or(
            QuotaWindow {
                rolls_in_period: 0,
                period_start: DateTime::<Utc>::UNIX_EPOCH,
            },
            |u| QuotaWindow {
                rolls_in_period: u.rolls_in_period,
                period_start: u.period_start,
            },
        ))
    }

    async fn reset_quota_window(&self, user: &UserId, now: Timestamp) -> Result<(), StoreError> {
        let mut state = self.enter().await?;
        if let Some(u) = state.users.get_mut(user) {
            u.rolls_in_period = 0;
            u.period_start = now;
        }
        Ok(())
    }

    async fn consume_roll(&self, user: &UserId, max_rolls: i32) -> Result<(), StoreError> {
        let mut state = self.enter().await?;
        if let Some(u) = state.users.get_mut(user) {
            u.rolls_in_period = (u.rolls_in_period + 1).min(max_rolls);
            u.rolls_count += 1;
        }
        Ok(())
    }

    async fn advance_lucky_counter(
        &self,
        user: &UserId,
        interval: i32,
    ) -> Result<LuckyAdvance, StoreError> {
        let mut state = self.enter().await?;
        Ok(match state.users.get_mut(user) {
            Some(u) => {
                let advance = lucky::advance(u.lucky_roll_count, interval);
                u.lucky_roll_count = advance.count;
                advance
            }
            None => LuckyAdvance {
                count: 0,
                lucky: false,
            },
        })
    }

    async fn lucky_count(&self, user: &UserId) -> Result<i32, StoreError> {
        let state = self.enter().await?;
        Ok(state.users.get(user).map_or(0, |u| u.lucky_roll_count))
    }

    async fn undo_roll(&self, user: &UserId, lucky_count: i32) -> Result<(), StoreError> {
        let mut state = self.enter().await?;
        if let Some(u) = state.users.get_mut(user) {
            u.rolls_in_period = (u.rolls_in_period - 1).max(0);
            u.rolls_count = (u.rolls_count - 1).max(0);
            u.lucky_roll_count = lucky_count;
        }
        Ok(())
    }
}

#[async_trait]
impl OwnershipStore for MemoryStore {
    async fn claim_if_unowned(
        &self,
        user: &UserId,
        character: &Character,
    ) -> Result<bool, StoreError> {
        let mut state = self.enter().await?;
        if !state.users.contains_key(user) || state.owned.contains_key(&character.id) {
            return Ok(false);
        }
        state.owned.insert(character.id, snapshot(user, character));
        Ok(true)
    }

    async fn owner_of(&self, character_id: CharacterId) -> Result<Option<UserId>, StoreError> {
        let state = self.enter().await?;
        Ok(state.owned.get(&character_id).map(|o| o.owner.clone()))
    }

    async fn find_owned(
        &self,
        character_id: CharacterId,
    ) -> Result<Option<OwnedCharacter>, StoreError> {
        let state = self.enter().await?;
        Ok(state.owned.get(&character_id).cloned())
    }

    async fn user_owns(
        &self,
        user: &UserId,
        character_id: CharacterId,
    ) -> Result<bool, StoreError> {
        let state = self.enter().await?;
        Ok(state
            .owned
            .get(&character_id)
            .is_some_and(|o| &o.owner == user))
    }

    async fn swap_ownership(
        &self,
        user_a: &UserId,
        user_b: &UserId,
        character_of_a: CharacterId,
        character_of_b: CharacterId,
    ) -> Result<bool, StoreError> {
        let mut state = self.enter().await?;
        let holds = |id: CharacterId, user: &UserId| {
            state.owned.get(&id).is_some_and(|o| &o.owner == user)
        };
        if !holds(character_of_a, user_a) || !holds(character_of_b, user_b) {
            return Ok(false);
        }
        let now = Utc::now();
        for (id, new_owner) in [(character_of_a, user_b), (character_of_b, user_a)] {
            if let Some(record) = state.owned.get_mut(&id) {
                record.owner = new_owner.clone();
                record.claimed_at = now;
            }
        }
        Ok(true)
    }

    async fn collection(
        &self,
        user: &UserId,
        page: u32,
        page_size: u32,
    ) -> Result<CollectionPage, StoreError> {
        let state = self.enter().await?;
        let page_size = page_size.max(1) as usize;
        let mut items: Vec<OwnedCharacter> = state
            .owned
            .values()
            .filter(|o| &o.owner == user)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.claimed_at
                .cmp(&a.claimed_at)
                .then_with(|| b.character_id.cmp(&a.character_id))
        });
        let total = items.len();
        let items = items
            .into_iter()
            .skip(page as usize * page_size)
            .take(page_size)
            .collect();
        Ok(CollectionPage {
            owner: user.clone(),
            items,
            page,
            total_pages: total.div_ceil(page_size) as u32,
            total: total as i64,
        })
    }

    async fn find_owned_by_name(
        &self,
        user: &UserId,
        name: &str,
    ) -> Result<Option<OwnedCharacter>, StoreError> {
        let state = self.enter().await?;
        let name = name.trim();
        Ok(state
            .owned
            .values()
            .filter(|o| &o.owner == user && o.name.eq_ignore_ascii_case(name))
            .min_by_key(|o| o.claimed_at)
            .cloned())
    }

    async fn remove_ownership(&self, character_id: CharacterId) -> Result<bool, StoreError> {
        let mut state = self.enter().await?;
        Ok(state.owned.remove(&character_id).is_some())
    }
}

#[async_trait]
impl RollHistoryLog for MemoryStore {
    async fn record_roll(&self, record: &RollRecord) -> Result<(), StoreError> {
        let mut state = self.enter().await?;
        if self.history_offline.load(Ordering::SeqCst) {
            return Err(StoreError::Query("rolls_history unavailable".into()));
        }
        state.history.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.enter().await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCatalog {
    characters: Mutex<HashMap<CharacterId, Character>>,
    top: Mutex<Vec<Character>>,
    offline: AtomicBool,
    fetches: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_characters(characters: impl IntoIterator<Item = Character>) -> Self {
        let catalog = Self::new();
        for c in characters {
            catalog.insert(c);
        }
        catalog
    }

    pub fn insert(&self, character: Character) {
        lock(&self.characters).insert(character.id, character);
    }

    /// Characters served by `top`, most favorited first, 25 per page.
    pub fn set_top(&self, characters: Vec<Character>) {
        for c in &characters {
            self.insert(c.clone());
        }
        *lock(&self.top) = characters;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), CatalogError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CatalogError::Status { status: 503 });
        }
        Ok(())
    }
}

const TOP_PAGE_SIZE: usize = 25;

#[async_trait]
impl CharacterCatalog for MemoryCatalog {
    async fn fetch(&self, id: CharacterId) -> Result<Option<Character>, CatalogError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(lock(&self.characters).get(&id).cloned())
    }

    async fn top(&self, page: u32) -> Result<Vec<Character>, CatalogError> {
        self.check()?;
        let skip = (page.max(1) as usize - 1) * TOP_PAGE_SIZE;
        Ok(lock(&self.top)
            .iter()
            .skip(skip)
            .take(TOP_PAGE_SIZE)
            .cloned()
            .collect())
    }

    async fn search(&self, query: &str) -> Result<Vec<Character>, CatalogError> {
        self.check()?;
        let query = query.to_lowercase();
        let mut found: Vec<Character> = lock(&self.characters)
            .values()
            .filter(|c| c.name.to_lowercase().contains(&query))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.favorites.cmp(&a.favorites));
        Ok(found)
    }

    async fn health_check(&self) -> Result<(), CatalogError> {
        self.check()
    }
}

// ---------------------------------------------------------------------------
// Id picker
// ---------------------------------------------------------------------------

/// Hands out queued ids, then `fallback` forever. Indices are always 0.
pub struct ScriptedIds {
    queue: Mutex<VecDeque<CharacterId>>,
    fallback: CharacterId,
}

impl ScriptedIds {
    pub fn new(fallback: CharacterId) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    pub fn push(&self, ids: impl IntoIterator<Item = CharacterId>) {
        lock(&self.queue).extend(ids);
    }
}

impl IdPicker for ScriptedIds {
    fn character_id(&self, _max: CharacterId) -> CharacterId {
        lock(&self.queue).pop_front().unwrap_or(self.fallback)
    }

    fn index(&self, _len: usize) -> usize {
        0
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A service wired to in-memory ports, with handles to all of them.
pub struct Harness {
    pub service: GameService,
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub ids: Arc<ScriptedIds>,
    pub events: Arc<EventBus>,
}

impl Harness {
    pub fn new(config: GameConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let ids = Arc::new(ScriptedIds::new(1));
        let events = Arc::new(EventBus::default());
        let service = GameService::new(store.clone(), catalog.clone(), config, events.clone())
            .with_id_picker(ids.clone());
        Self {
            service,
            store,
            catalog,
            ids,
            events,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(GameConfig::default())
    }
}
