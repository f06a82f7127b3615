//! Unit tests for `WsManager` and `EventForwarder`.
//!
//! These tests exercise the WebSocket connection manager directly, without
//! performing any HTTP upgrades.

use std::sync::Arc;

use axum::extract::ws::Message;
use waifu_api::ws::{EventForwarder, WsManager};
use waifu_core::token::{ClaimKey, TradeKey};
use waifu_core::types::UserId;
use waifu_events::{EventBus, GameEvent, GameEventKind};

fn user(id: &str) -> UserId {
    UserId::new(id)
}

// ---------------------------------------------------------------------------
// Test: new manager starts with zero connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_manager_has_zero_connections() {
    let manager = WsManager::new();

    assert_eq!(manager.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: add() and remove() track the connection count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new();

    let _rx1 = manager.add("conn-1".to_string(), None).await;
    let _rx2 = manager.add("conn-2".to_string(), Some(user("alice"))).await;
    assert_eq!(manager.connection_count().await, 2);

    manager.remove("conn-1").await;
    manager.remove("nonexistent").await;
    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string(), None).await;
    let mut rx2 = manager.add("conn-2".to_string(), Some(user("bob"))).await;

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);

    let msg1 = rx1.recv().await.expect("rx1 should receive Close");
    assert!(
        matches!(msg1, Message::Close(None)),
        "Expected Close(None), got: {msg1:?}"
    );
    let msg2 = rx2.recv().await.expect("rx2 should receive Close");
    assert!(matches!(msg2, Message::Close(None)));

    // After Close, the channel should be closed (no more messages).
    assert!(
        rx1.recv().await.is_none(),
        "Channel should be closed after shutdown"
    );
}

// ---------------------------------------------------------------------------
// Test: deliver() reaches untagged connections and the listed players only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deliver_targets_participants_and_untagged() {
    let manager = WsManager::new();

    let mut bot = manager.add("bot".to_string(), None).await;
    let mut alice = manager.add("alice".to_string(), Some(user("alice"))).await;
    let mut carol = manager.add("carol".to_string(), Some(user("carol"))).await;

    let alice_id = user("alice");
    let sent = manager
        .deliver(Message::Text("trade expired".into()), &[&alice_id])
        .await;

    assert_eq!(sent, 2);
    assert!(matches!(bot.try_recv(), Ok(Message::Text(t)) if t == "trade expired"));
    assert!(matches!(alice.try_recv(), Ok(Message::Text(t)) if t == "trade expired"));
    assert!(carol.try_recv().is_err(), "carol is not involved");
}

// ---------------------------------------------------------------------------
// Test: deliver() skips closed channels without panicking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deliver_skips_closed_channels() {
    let manager = WsManager::new();

    let rx1 = manager.add("conn-1".to_string(), None).await;
    let mut rx2 = manager.add("conn-2".to_string(), None).await;
    drop(rx1);

    manager.deliver(Message::Text("still alive".into()), &[]).await;

    let msg = rx2.recv().await.expect("rx2 should receive the message");
    assert!(matches!(&msg, Message::Text(t) if *t == "still alive"));
}

// ---------------------------------------------------------------------------
// Test: ping_all() pings every connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_all_pings_every_connection() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string(), None).await;
    let mut rx2 = manager.add("conn-2".to_string(), Some(user("dave"))).await;

    manager.ping_all().await;

    assert!(matches!(rx1.recv().await, Some(Message::Ping(_))));
    assert!(matches!(rx2.recv().await, Some(Message::Ping(_))));
}

// ---------------------------------------------------------------------------
// Test: the forwarder relays bus events as JSON and stops when the bus closes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn forwarder_relays_events_until_bus_closes() {
    let manager = Arc::new(WsManager::new());
    let mut bot = manager.add("bot".to_string(), None).await;
    let mut outsider = manager.add("eve".to_string(), Some(user("eve"))).await;

    let bus = EventBus::default();
    let handle = tokio::spawn(EventForwarder::new(Arc::clone(&manager)).run(bus.subscribe()));

    bus.publish(
        GameEvent::new(GameEventKind::ClaimExpired {
            claim: ClaimKey {
                roller: user("alice"),
                character_id: 40,
                issued_at_ms: 1_000,
            },
        })
        .with_token("claim:alice:40:1000"),
    );
    bus.publish(GameEvent::new(GameEventKind::TradeCompleted {
        trade: TradeKey {
            initiator: user("alice"),
            target: user("eve"),
            created_at_ms: 2_000,
        },
    }));

    let Some(Message::Text(first)) = bot.recv().await else {
        panic!("expected a text frame");
    };
    let json: serde_json::Value = serde_json::from_str(first.as_str()).unwrap();
    assert_eq!(json["type"], "claim_expired");
    assert_eq!(json["token"], "claim:alice:40:1000");
    assert_eq!(json["claim"]["roller"], "alice");

    // eve only hears about the trade she is part of.
    let Some(Message::Text(second)) = outsider.recv().await else {
        panic!("expected a text frame");
    };
    let json: serde_json::Value = serde_json::from_str(second.as_str()).unwrap();
    assert_eq!(json["type"], "trade_completed");

    drop(bus);
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("forwarder should stop once the bus is dropped")
        .unwrap();
}
