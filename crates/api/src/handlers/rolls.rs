//! Handlers for rolling and resolving rolled characters.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use waifu_core::token::ClaimKey;

use crate::error::AppResult;
use crate::handlers::{parse_token, parse_user};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RollInput {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct ClickInput {
    pub user_id: String,
    pub username: Option<String>,
}

// ---------------------------------------------------------------------------
// POST /rolls
// ---------------------------------------------------------------------------

/// Roll one random character for the player.
pub async fn roll(
    State(state): State<AppState>,
    Json(input): Json<RollInput>,
) -> AppResult<impl IntoResponse> {
    let user = parse_user(&input.user_id)?;
    let result = state.game.handle_roll(&user, &input.username).await?;
    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// POST /claims/{token}/claim
// ---------------------------------------------------------------------------

/// The roller keeps the character behind `token`.
pub async fn claim(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<ClickInput>,
) -> AppResult<impl IntoResponse> {
    let key: ClaimKey = parse_token(&token)?;
    let user = parse_user(&input.user_id)?;
    let result = state.game.handle_claim(&key, &user).await?;
    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// POST /claims/{token}/snipe
// ---------------------------------------------------------------------------

/// A third party takes the character behind `token` for a fee.
pub async fn snipe(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<ClickInput>,
) -> AppResult<impl IntoResponse> {
    let key: ClaimKey = parse_token(&token)?;
    let user = parse_user(&input.user_id)?;
    let username = input.username.as_deref().unwrap_or(user.as_str());
    let result = state.game.handle_snipe(&key, &user, username).await?;
    Ok(Json(DataResponse { data: result }))
}
