use axum::routing::{get, post};
use axum::Router;

use crate::handlers::packs;
use crate::state::AppState;

/// Routes mounted at `/packs`.
///
/// ```text
/// POST /                                 -> propose
/// GET  /{token}                          -> get
/// POST /{token}/confirm                  -> confirm
/// POST /{token}/cancel                   -> cancel
/// POST /{token}/slots/{index}/reveal     -> reveal
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(packs::propose))
        .route("/{token}", get(packs::get))
        .route("/{token}/confirm", post(packs::confirm))
        .route("/{token}/cancel", post(packs::cancel))
        .route("/{token}/slots/{index}/reveal", post(packs::reveal))
}
