//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// `?page=`. Collection pages are zero-based, catalog pages one-based.
#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
}

/// `?limit=`, clamped by the game service.
#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// `?admin_id=` for admin routes without a request body.
#[derive(Debug, Deserialize)]
pub struct AdminParams {
    pub admin_id: String,
}

/// `?user_id=` identifying a WebSocket subscriber.
#[derive(Debug, Deserialize)]
pub struct SubscriberParams {
    pub user_id: Option<String>,
}
