//! Handlers for buying and opening character packs.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use waifu_core::token::{PackKey, PackKind};

use crate::error::AppResult;
use crate::handlers::{parse_token, parse_user};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BuyPackInput {
    pub user_id: String,
    pub username: String,
    /// `standard` or `premium`.
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct PackActionInput {
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// POST /packs
// ---------------------------------------------------------------------------

/// Offer a pack for purchase. Nothing is charged until confirmation.
pub async fn propose(
    State(state): State<AppState>,
    Json(input): Json<BuyPackInput>,
) -> AppResult<impl IntoResponse> {
    let user = parse_user(&input.user_id)?;
    let kind: PackKind = input.kind.parse()?;
    let result = state.game.propose_pack(&user, &input.username, kind).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: result })))
}

// ---------------------------------------------------------------------------
// GET /packs/{token}
// ---------------------------------------------------------------------------

pub async fn get(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    let key: PackKey = parse_token(&token)?;
    let pack = state.game.pack(&key).await?;
    Ok(Json(DataResponse { data: pack }))
}

// ---------------------------------------------------------------------------
// POST /packs/{token}/confirm
// ---------------------------------------------------------------------------

pub async fn confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<PackActionInput>,
) -> AppResult<impl IntoResponse> {
    let key: PackKey = parse_token(&token)?;
    let user = parse_user(&input.user_id)?;
    let result = state.game.confirm_pack(&key, &user).await?;
    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// POST /packs/{token}/cancel
// ---------------------------------------------------------------------------

pub async fn cancel(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<PackActionInput>,
) -> AppResult<impl IntoResponse> {
    let key: PackKey = parse_token(&token)?;
    let user = parse_user(&input.user_id)?;
    let result = state.game.cancel_pack(&key, &user).await?;
    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// POST /packs/{token}/slots/{index}/reveal
// ---------------------------------------------------------------------------

pub async fn reveal(
    State(state): State<AppState>,
    Path((token, index)): Path<(String, usize)>,
    Json(input): Json<PackActionInput>,
) -> AppResult<impl IntoResponse> {
    let key: PackKey = parse_token(&token)?;
    let user = parse_user(&input.user_id)?;
    let result = state.game.reveal_slot(&key, &user, index).await?;
    Ok(Json(DataResponse { data: result }))
}
