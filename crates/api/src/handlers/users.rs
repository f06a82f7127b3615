//! Read-only player views: balance, lucky progress, collection, leaderboard.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::handlers::parse_user;
use crate::query::{LimitParams, PageParams};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /users/{id}/points
pub async fn points(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user = parse_user(&user_id)?;
    let view = state.game.points(&user).await?;
    Ok(Json(DataResponse { data: view }))
}

/// GET /users/{id}/lucky
pub async fn lucky(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user = parse_user(&user_id)?;
    let view = state.game.lucky(&user).await?;
    Ok(Json(DataResponse { data: view }))
}

/// GET /users/{id}/collection?page=
///
/// Pages are zero-based, most recently claimed first.
pub async fn collection(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<PageParams>,
) -> AppResult<impl IntoResponse> {
    let user = parse_user(&user_id)?;
    let page = state
        .game
        .collection(&user, params.page.unwrap_or(0))
        .await?;
    Ok(Json(DataResponse { data: page }))
}

/// GET /leaderboard?limit=
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> AppResult<impl IntoResponse> {
    let entries = state.game.leaderboard(params.limit).await?;
    Ok(Json(DataResponse { data: entries }))
}
