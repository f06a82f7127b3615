use std::sync::Arc;

use waifu_engine::GameService;
use waifu_events::EventBus;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// The game coordinator; owns every pending claim, trade, pack and gift.
    pub game: GameService,
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (frontend clients).
    pub ws_manager: Arc<WsManager>,
    /// Bus the game publishes resolutions and expiries on.
    pub event_bus: Arc<EventBus>,
}
