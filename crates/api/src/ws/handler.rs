use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use waifu_core::types::UserId;

use crate::error::AppResult;
use crate::query::SubscriberParams;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// GET /api/v1/ws
///
/// Upgrades the connection to WebSocket. Frontends may pass `?user_id=` to
/// tag the connection with the player it serves.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<SubscriberParams>,
) -> AppResult<impl IntoResponse> {
    let user_id = params.user_id.as_deref().map(UserId::parse).transpose()?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, user_id)))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Outbound traffic comes from the manager channel; inbound frames are only
/// read to notice pongs and disconnects.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, user_id: Option<UserId>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, user_id = ?user_id, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone(), user_id).await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
