use axum::routing::get;
use axum::Router;

use crate::handlers::catalog;
use crate::state::AppState;

/// Routes mounted at `/catalog`.
///
/// ```text
/// GET /top       -> top (?page=)
/// GET /search    -> search (?q=)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/top", get(catalog::top))
        .route("/search", get(catalog::search))
}
