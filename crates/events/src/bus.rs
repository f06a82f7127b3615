//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`GameEvent`]s. It is
//! shared via `Arc<EventBus>` between the game service and the WebSocket
//! forwarder.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use waifu_core::token::{ClaimKey, GiftKey, PackKey, TradeKey};
use waifu_core::types::{CharacterId, UserId};

// ---------------------------------------------------------------------------
// GameEvent
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEventKind {
    /// A pending claim was taken, by the roller or a sniper.
    ClaimResolved {
        claim: ClaimKey,
        winner: UserId,
        sniped: bool,
    },
    /// Nobody claimed the character in time.
    ClaimExpired { claim: ClaimKey },
    TradeProposed { trade: TradeKey },
    /// The target named their side; confirmations are now open.
    TradeOffered { trade: TradeKey },
    TradeCompleted { trade: TradeKey },
    TradeCancelled { trade: TradeKey, by: UserId },
    TradeExpired { trade: TradeKey },
    TradeFailed { trade: TradeKey, reason: String },
    PackExpired { pack: PackKey },
    /// The reveal window ran out and remaining slots were revealed.
    PackAutoRevealed { pack: PackKey, slots: Vec<usize> },
    GiftExpired { gift: GiftKey },
    CharacterRemoved {
        character_id: CharacterId,
        by: UserId,
    },
}

impl GameEventKind {
    /// Dot-separated event name, e.g. `"claim.expired"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            GameEventKind::ClaimResolved { .. } => "claim.resolved",
            GameEventKind::ClaimExpired { .. } => "claim.expired",
            GameEventKind::TradeProposed { .. } => "trade.proposed",
            GameEventKind::TradeOffered { .. } => "trade.offered",
            GameEventKind::TradeCompleted { .. } => "trade.completed",
            GameEventKind::TradeCancelled { .. } => "trade.cancelled",
            GameEventKind::TradeExpired { .. } => "trade.expired",
            GameEventKind::TradeFailed { .. } => "trade.failed",
            GameEventKind::PackExpired { .. } => "pack.expired",
            GameEventKind::PackAutoRevealed { .. } => "pack.auto_revealed",
            GameEventKind::GiftExpired { .. } => "gift.expired",
            GameEventKind::CharacterRemoved { .. } => "character.removed",
        }
    }

    /// Players the event concerns. Empty when it concerns nobody in
    /// particular.
    pub fn participants(&self) -> Vec<&UserId> {
        match self {
            GameEventKind::ClaimResolved { claim, winner, .. } => vec![&claim.roller, winner],
            GameEventKind::ClaimExpired { claim } => vec![&claim.roller],
            GameEventKind::TradeProposed { trade }
            | GameEventKind::TradeOffered { trade }
            | GameEventKind::TradeCompleted { trade }
            | GameEventKind::TradeCancelled { trade, .. }
            | GameEventKind::TradeExpired { trade }
            | GameEventKind::TradeFailed { trade, .. } => vec![&trade.initiator, &trade.target],
            GameEventKind::PackExpired { pack } | GameEventKind::PackAutoRevealed { pack, .. } => {
                vec![&pack.buyer]
            }
            GameEventKind::GiftExpired { gift } => vec![&gift.admin, &gift.target],
            GameEventKind::CharacterRemoved { .. } => Vec::new(),
        }
    }
}

/// A game event with its emission time.
#[derive(Debug, Clone, Serialize)]
pub struct GameEvent {
    #[serde(flatten)]
    pub kind: GameEventKind,

    /// Frontend token encoding the entity the event concerns, if it has a
    /// button to re-render.
    pub token: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl GameEvent {
    pub fn new(kind: GameEventKind) -> Self {
        Self {
            kind,
            token: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the encoded token of the affected entity.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`GameEvent`].
pub struct EventBus {
    sender: broadcast::Sender<GameEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: GameEvent) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn claim() -> ClaimKey {
        ClaimKey {
            roller: UserId::new("1"),
            character_id: 40,
            issued_at_ms: 1_000,
        }
    }

    #[test]
    fn trade_events_concern_both_parties() {
        let trade = TradeKey {
            initiator: UserId::new("1"),
            target: UserId::new("2"),
            created_at_ms: 5,
        };
        let kind = GameEventKind::TradeExpired { trade };
        assert_eq!(kind.participants(), vec![&UserId::new("1"), &UserId::new("2")]);

        let removed = GameEventKind::CharacterRemoved {
            character_id: 3,
            by: UserId::new("9"),
        };
        assert!(removed.participants().is_empty());
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            GameEvent::new(GameEventKind::ClaimExpired { claim: claim() })
                .with_token("claim:1:40:1000"),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type(), "claim.expired");
        assert_eq!(received.token.as_deref(), Some("claim:1:40:1000"));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(GameEvent::new(GameEventKind::ClaimResolved {
            claim: claim(),
            winner: UserId::new("2"),
            sniped: true,
        }));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.kind, e2.kind);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(GameEvent::new(GameEventKind::ClaimExpired { claim: claim() }));
    }

    #[test]
    fn serializes_flat_with_type_tag() {
        let event = GameEvent::new(GameEventKind::CharacterRemoved {
            character_id: 7,
            by: UserId::new("admin"),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "character_removed");
        assert_eq!(json["character_id"], 7);
        assert!(json["token"].is_null());
        assert!(json["timestamp"].is_string());
    }
}
