use axum::routing::get;
use axum::Router;

use crate::handlers::users;
use crate::state::AppState;

/// Routes mounted at `/users`.
///
/// ```text
/// GET /{id}/points           -> points
/// GET /{id}/lucky            -> lucky
/// GET /{id}/collection       -> collection (?page=)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/points", get(users::points))
        .route("/{id}/lucky", get(users::lucky))
        .route("/{id}/collection", get(users::collection))
}
