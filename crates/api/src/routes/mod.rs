pub mod admin;
pub mod catalog;
pub mod claims;
pub mod health;
pub mod packs;
pub mod trades;
pub mod users;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                              WebSocket event stream
///
/// /interactions                                    encoded button click (POST)
/// /rolls                                           roll a character (POST)
///
/// /claims/{token}/claim                            roller keeps the character
/// /claims/{token}/snipe                            third party takes it
///
/// /trades                                          propose (POST)
/// /trades/{token}                                  get
/// /trades/{token}/offer                            target's counter offer
/// /trades/{token}/confirm                          confirm
/// /trades/{token}/cancel                           cancel
///
/// /packs                                           propose purchase (POST)
/// /packs/{token}                                   get
/// /packs/{token}/confirm                           pay and open
/// /packs/{token}/cancel                            cancel
/// /packs/{token}/slots/{index}/reveal              reveal one slot
///
/// /users/{id}/points                               balance
/// /users/{id}/lucky                                lucky roll progress
/// /users/{id}/collection                           owned characters (paged)
/// /leaderboard                                     top players by points
///
/// /catalog/top                                     most favorited (paged)
/// /catalog/search                                  search by name
///
/// /admin/gifts                                     propose gift (POST)
/// /admin/gifts/{token}/confirm                     confirm gift
/// /admin/gifts/{token}/cancel                      cancel gift
/// /admin/characters/{id}                           remove ownership (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket endpoint.
        .route("/ws", get(ws::ws_handler))
        // Raw button clicks from the chat frontend.
        .route("/interactions", post(handlers::interactions::dispatch))
        .route("/rolls", post(handlers::rolls::roll))
        .nest("/claims", claims::router())
        .nest("/trades", trades::router())
        .nest("/packs", packs::router())
        .nest("/users", users::router())
        .route("/leaderboard", get(handlers::users::leaderboard))
        .nest("/catalog", catalog::router())
        .nest("/admin", admin::router())
}
