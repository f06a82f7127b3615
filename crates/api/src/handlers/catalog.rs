//! Catalog browsing with current ownership attached.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use waifu_core::error::CoreError;

use crate::error::AppResult;
use crate::query::{PageParams, SearchParams};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /catalog/top?page=
pub async fn top(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> AppResult<impl IntoResponse> {
    let page = state.game.top(params.page.unwrap_or(1)).await?;
    Ok(Json(DataResponse { data: page }))
}

/// GET /catalog/search?q=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<impl IntoResponse> {
    let q = params.q.trim();
    if q.is_empty() {
        return Err(CoreError::Validation("q must not be empty".into()).into());
    }
    let hits = state.game.search(q).await?;
    Ok(Json(DataResponse { data: hits }))
}
