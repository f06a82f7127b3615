//! Handler for raw button clicks forwarded by the chat frontend.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use waifu_core::token::Interaction;

use crate::error::AppResult;
use crate::handlers::parse_user;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InteractionInput {
    /// Encoded button id, e.g. `claim:<roller>:<character>:<issued_ms>`.
    pub custom_id: String,
    pub user_id: String,
    /// Display name of the clicker; defaults to the user id.
    pub username: Option<String>,
}

// ---------------------------------------------------------------------------
// POST /interactions
// ---------------------------------------------------------------------------

/// Decode a button id and route it to the matching game operation.
pub async fn dispatch(
    State(state): State<AppState>,
    Json(input): Json<InteractionInput>,
) -> AppResult<impl IntoResponse> {
    let user = parse_user(&input.user_id)?;
    let interaction: Interaction = input.custom_id.parse()?;
    let username = input.username.as_deref().unwrap_or(user.as_str());

    tracing::debug!(user_id = %user, custom_id = %input.custom_id, "Interaction received");

    let result = state
        .game
        .dispatch_interaction(interaction, &user, username)
        .await?;

    Ok(Json(DataResponse { data: result }))
}
