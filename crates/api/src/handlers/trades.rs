//! Handlers for player-to-player trades.
//!
//! A trade is addressed by its token (`initiator:target:created_ms`). The
//! initiator proposes with a character, the target answers with one, then
//! both confirm.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use waifu_core::token::TradeKey;
use waifu_engine::trades::CharacterRef;

use crate::error::AppResult;
use crate::handlers::{parse_token, parse_user};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProposeTradeInput {
    pub initiator: String,
    pub target: String,
    /// Catalog id or exact name of a character the initiator owns.
    pub character: String,
}

#[derive(Debug, Deserialize)]
pub struct OfferInput {
    pub user_id: String,
    pub character: String,
}

#[derive(Debug, Deserialize)]
pub struct TradeActionInput {
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// POST /trades
// ---------------------------------------------------------------------------

pub async fn propose(
    State(state): State<AppState>,
    Json(input): Json<ProposeTradeInput>,
) -> AppResult<impl IntoResponse> {
    let initiator = parse_user(&input.initiator)?;
    let target = parse_user(&input.target)?;
    let character: CharacterRef = input.character.parse()?;

    let result = state
        .game
        .propose_trade(&initiator, &target, &character)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: result })))
}

// ---------------------------------------------------------------------------
// GET /trades/{token}
// ---------------------------------------------------------------------------

pub async fn get(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    let key: TradeKey = parse_token(&token)?;
    let trade = state.game.trade(&key).await?;
    Ok(Json(DataResponse { data: trade }))
}

// ---------------------------------------------------------------------------
// POST /trades/{token}/offer
// ---------------------------------------------------------------------------

/// The target names the character they give in return.
pub async fn offer(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<OfferInput>,
) -> AppResult<impl IntoResponse> {
    let key: TradeKey = parse_token(&token)?;
    let user = parse_user(&input.user_id)?;
    let character: CharacterRef = input.character.parse()?;
    let result = state.game.offer_trade(&key, &user, &character).await?;
    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// POST /trades/{token}/confirm
// ---------------------------------------------------------------------------

pub async fn confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<TradeActionInput>,
) -> AppResult<impl IntoResponse> {
    let key: TradeKey = parse_token(&token)?;
    let user = parse_user(&input.user_id)?;
    let result = state.game.confirm_trade(&key, &user).await?;
    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// POST /trades/{token}/cancel
// ---------------------------------------------------------------------------

pub async fn cancel(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<TradeActionInput>,
) -> AppResult<impl IntoResponse> {
    let key: TradeKey = parse_token(&token)?;
    let user = parse_user(&input.user_id)?;
    let result = state.game.cancel_trade(&key, &user).await?;
    Ok(Json(DataResponse { data: result }))
}
