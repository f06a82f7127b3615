use axum::routing::{get, post};
use axum::Router;

use crate::handlers::trades;
use crate::state::AppState;

/// Routes mounted at `/trades`.
///
/// ```text
/// POST /                     -> propose
/// GET  /{token}              -> get
/// POST /{token}/offer        -> offer
/// POST /{token}/confirm      -> confirm
/// POST /{token}/cancel       -> cancel
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(trades::propose))
        .route("/{token}", get(trades::get))
        .route("/{token}/offer", post(trades::offer))
        .route("/{token}/confirm", post(trades::confirm))
        .route("/{token}/cancel", post(trades::cancel))
}
