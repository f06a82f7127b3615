use axum::routing::{delete, post};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// ```text
/// POST   /gifts                      -> propose_gift
/// POST   /gifts/{token}/confirm      -> confirm_gift
/// POST   /gifts/{token}/cancel       -> cancel_gift
/// DELETE /characters/{id}            -> remove_character (?admin_id=)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/gifts", post(admin::propose_gift))
        .route("/gifts/{token}/confirm", post(admin::confirm_gift))
        .route("/gifts/{token}/cancel", post(admin::cancel_gift))
        .route("/characters/{id}", delete(admin::remove_character))
}
