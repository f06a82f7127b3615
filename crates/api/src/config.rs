use std::str::FromStr;
use std::time::Duration;

use waifu_core::config::{GameConfig, HistoryWritePolicy};
use waifu_core::quota::QuotaPolicy;
use waifu_core::types::UserId;

/// Server configuration loaded from environment variables.
///
/// All fields except the database URL have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for background tasks to drain on shutdown (default: `5`).
    pub shutdown_timeout_secs: u64,
    pub database_url: String,
    pub redis_url: String,
    /// Jikan v4 compatible catalog root.
    pub jikan_base_url: String,
    /// Catalog cache entry lifetime in seconds (default: `3600`).
    pub cache_ttl_secs: u64,
    /// Game tuning.
    pub game: GameConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                     |
    /// |-----------------------------|-----------------------------|
    /// | `HOST`                      | `0.0.0.0`                   |
    /// | `PORT`                      | `3000`                      |
    /// | `CORS_ORIGINS`              | `http://localhost:5173`     |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                        |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `5`                         |
    /// | `DATABASE_URL`              | required                    |
    /// | `REDIS_URL`                 | `redis://127.0.0.1:6379`    |
    /// | `JIKAN_BASE_URL`            | `https://api.jikan.moe/v4`  |
    /// | `CACHE_TTL`                 | `3600`                      |
    ///
    /// Game settings are listed on [`game_config_from_env`].
    ///
    /// Panics on malformed values, which is the desired behaviour at
    /// startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parse_var("PORT", 3000);

        let cors_origins = list_var("CORS_ORIGINS", "http://localhost:5173");

        let request_timeout_secs: u64 = parse_var("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs: u64 = parse_var("SHUTDOWN_TIMEOUT_SECS", 5);

        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let jikan_base_url = std::env::var("JIKAN_BASE_URL")
            .unwrap_or_else(|_| waifu_catalog::api::DEFAULT_BASE_URL.into());
        let cache_ttl_secs: u64 = parse_var("CACHE_TTL", 3600);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url,
            redis_url,
            jikan_base_url,
            cache_ttl_secs,
            game: game_config_from_env(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Game settings from the environment.
///
/// | Env Var                     | Default       |
/// |-----------------------------|---------------|
/// | `MAX_CHARACTER_ID`          | `276935`      |
/// | `ROLL_PERIOD_SECONDS`       | `10`          |
/// | `MAX_ROLLS_PER_PERIOD`      | `3`           |
/// | `CLAIM_WINDOW_SECS`         | `30`          |
/// | `TRADE_EXPIRY_SECS`         | `600`         |
/// | `SNIPE_COOLDOWN_MAIN_SECS`  | `600`         |
/// | `SNIPE_COOLDOWN_OTHER_SECS` | `60`          |
/// | `HISTORY_WRITE_POLICY`      | `best_effort` |
/// | `ADMIN_USER_IDS`            | empty         |
pub fn game_config_from_env() -> GameConfig {
    let defaults = GameConfig::default();
    let secs = |key: &str, default: Duration| Duration::from_secs(parse_var(key, default.as_secs()));

    let admin_user_ids = list_var("ADMIN_USER_IDS", "")
        .iter()
        .map(|id| {
            UserId::parse(id).unwrap_or_else(|e| panic!("Invalid ADMIN_USER_IDS entry '{id}': {e}"))
        })
        .collect();

    GameConfig {
        max_character_id: parse_var("MAX_CHARACTER_ID", defaults.max_character_id),
        quota: QuotaPolicy {
            period: secs("ROLL_PERIOD_SECONDS", defaults.quota.period),
            max_rolls: parse_var("MAX_ROLLS_PER_PERIOD", defaults.quota.max_rolls),
        },
        claim_window: secs("CLAIM_WINDOW_SECS", defaults.claim_window),
        trade_expiry: secs("TRADE_EXPIRY_SECS", defaults.trade_expiry),
        snipe_cooldown_main: secs("SNIPE_COOLDOWN_MAIN_SECS", defaults.snipe_cooldown_main),
        snipe_cooldown_other: secs("SNIPE_COOLDOWN_OTHER_SECS", defaults.snipe_cooldown_other),
        history_policy: parse_var::<HistoryWritePolicy>("HISTORY_WRITE_POLICY", defaults.history_policy),
        admin_user_ids,
        ..defaults
    }
}

fn parse_var<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} is invalid ('{raw}'): {e}")),
        Err(_) => default,
    }
}

fn list_var(key: &str, default: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_else(|_| default.into())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
