use axum::routing::post;
use axum::Router;

use crate::handlers::rolls;
use crate::state::AppState;

/// Routes mounted at `/claims`.
///
/// ```text
/// POST /{token}/claim    -> claim
/// POST /{token}/snipe    -> snipe
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{token}/claim", post(rolls::claim))
        .route("/{token}/snipe", post(rolls::snipe))
}
