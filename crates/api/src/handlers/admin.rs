//! Admin-only handlers: gifting characters and removing ownership.
//!
//! The caller names itself via `admin_id`; the game service rejects ids
//! outside `ADMIN_USER_IDS` with 403.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use waifu_core::token::GiftKey;
use waifu_core::types::CharacterId;

use crate::error::AppResult;
use crate::handlers::{parse_token, parse_user};
use crate::query::AdminParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GiftInput {
    pub admin_id: String,
    pub target: String,
    /// Display name recorded if the target has never played.
    pub target_username: Option<String>,
    pub character_id: CharacterId,
}

#[derive(Debug, Deserialize)]
pub struct AdminActionInput {
    pub admin_id: String,
}

// ---------------------------------------------------------------------------
// POST /admin/gifts
// ---------------------------------------------------------------------------

pub async fn propose_gift(
    State(state): State<AppState>,
    Json(input): Json<GiftInput>,
) -> AppResult<impl IntoResponse> {
    let admin = parse_user(&input.admin_id)?;
    let target = parse_user(&input.target)?;
    let username = input.target_username.as_deref().unwrap_or(target.as_str());

    let result = state
        .game
        .propose_gift(&admin, &target, username, input.character_id)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: result })))
}

// ---------------------------------------------------------------------------
// POST /admin/gifts/{token}/confirm
// ---------------------------------------------------------------------------

pub async fn confirm_gift(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<AdminActionInput>,
) -> AppResult<impl IntoResponse> {
    let key: GiftKey = parse_token(&token)?;
    let admin = parse_user(&input.admin_id)?;
    let result = state.game.confirm_gift(&key, &admin).await?;

    tracing::info!(admin_id = %admin, gift = %key, "Gift confirmation handled");

    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// POST /admin/gifts/{token}/cancel
// ---------------------------------------------------------------------------

pub async fn cancel_gift(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<AdminActionInput>,
) -> AppResult<impl IntoResponse> {
    let key: GiftKey = parse_token(&token)?;
    let admin = parse_user(&input.admin_id)?;
    let result = state.game.cancel_gift(&key, &admin).await?;
    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// DELETE /admin/characters/{id}?admin_id=
// ---------------------------------------------------------------------------

/// Strip a character from its owner.
pub async fn remove_character(
    State(state): State<AppState>,
    Path(character_id): Path<CharacterId>,
    Query(params): Query<AdminParams>,
) -> AppResult<impl IntoResponse> {
    let admin = parse_user(&params.admin_id)?;
    let result = state.game.remove_character(&admin, character_id).await?;
    Ok(Json(DataResponse { data: result }))
}
