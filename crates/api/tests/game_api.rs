//! Integration tests for the game endpoints, run against an in-memory
//! store and catalog.

mod common;

use axum::http::StatusCode;
use common::{body_json, delete, get, post_json};
use serde_json::json;
use waifu_core::config::GameConfig;
use waifu_core::points::character_points;
use waifu_core::token::PackKind;
use waifu_core::types::UserId;
use waifu_engine::testing::{character, Harness};

/// Encode the `claim` object of a roll response as a path token.
fn claim_token(claim: &serde_json::Value) -> String {
    format!(
        "{}:{}:{}",
        claim["roller"].as_str().unwrap(),
        claim["character_id"],
        claim["issued_at_ms"]
    )
}

async fn roll(harness: &Harness, user: &str) -> serde_json::Value {
    let app = common::build_test_app(harness);
    let response = post_json(
        app,
        "/api/v1/rolls",
        json!({ "user_id": user, "username": user }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"].clone()
}

// ---------------------------------------------------------------------------
// Test: roll then claim grants the character and its points
// ---------------------------------------------------------------------------

#[tokio::test]
async fn roll_then_claim_grants_character() {
    let harness = Harness::default();
    let rolled = character(1, 200, false);
    harness.catalog.insert(rolled.clone());

    let data = roll(&harness, "alice").await;
    assert_eq!(data["result"], "rolled");
    assert_eq!(data["outcome"]["kind"], "fresh");
    assert_eq!(data["rolls_remaining"], 2);

    let token = claim_token(&data["outcome"]["claim"]);
    let app = common::build_test_app(&harness);
    let response = post_json(
        app,
        &format!("/api/v1/claims/{token}/claim"),
        json!({ "user_id": "alice" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let expected = character_points(&rolled, false);
    assert_eq!(json["data"]["result"], "claimed");
    assert_eq!(json["data"]["points"], expected);
    assert_eq!(harness.store.owner(1), Some(UserId::new("alice")));

    let app = common::build_test_app(&harness);
    let json = body_json(get(app, "/api/v1/users/alice/points").await).await;
    assert_eq!(json["data"]["balance"], expected);

    let app = common::build_test_app(&harness);
    let json = body_json(get(app, "/api/v1/users/alice/collection").await).await;
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["items"][0]["character_id"], 1);
}

// ---------------------------------------------------------------------------
// Test: a third party snipes through the API and pays the fee
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snipe_transfers_character_and_charges_fee() {
    let harness = Harness::default();
    harness.catalog.insert(character(1, 200, false));
    harness.store.seed_user(&UserId::new("bob"), 1_000);

    let data = roll(&harness, "alice").await;
    let token = claim_token(&data["outcome"]["claim"]);

    let app = common::build_test_app(&harness);
    let response = post_json(
        app,
        &format!("/api/v1/claims/{token}/snipe"),
        json!({ "user_id": "bob" }),
    )
    .await;

    let json = body_json(response).await;
    assert_eq!(json["data"]["result"], "sniped");
    assert_eq!(json["data"]["cost"], 600);
    assert_eq!(json["data"]["balance"], 400);
    assert_eq!(json["data"]["cooldown_secs"], 60);
    assert_eq!(harness.store.owner(1), Some(UserId::new("bob")));
}

// ---------------------------------------------------------------------------
// Test: button clicks are decoded and routed through /interactions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn interaction_from_wrong_user_is_rejected_in_band() {
    let harness = Harness::default();
    harness.catalog.insert(character(1, 20, false));

    let data = roll(&harness, "alice").await;
    let token = claim_token(&data["outcome"]["claim"]);

    let app = common::build_test_app(&harness);
    let response = post_json(
        app,
        "/api/v1/interactions",
        json!({ "custom_id": format!("claim:{token}"), "user_id": "bob" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["interaction"], "claim");
    assert_eq!(json["data"]["payload"]["result"], "not_your_roll");
    assert_eq!(harness.store.owner(1), None);
}

#[tokio::test]
async fn malformed_interaction_returns_400() {
    let harness = Harness::default();
    let app = common::build_test_app(&harness);

    let response = post_json(
        app,
        "/api/v1/interactions",
        json!({ "custom_id": "teleport:somewhere", "user_id": "bob" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Test: the fourth roll in a period is rate limited
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fourth_roll_is_rate_limited() {
    let harness = Harness::default();
    harness.catalog.insert(character(1, 20, false));

    for _ in 0..3 {
        assert_eq!(roll(&harness, "alice").await["result"], "rolled");
    }

    let data = roll(&harness, "alice").await;
    assert_eq!(data["result"], "rate_limited");
    assert_eq!(data["rolls_remaining"], 0);
    assert!(data["wait_ms"].as_u64().unwrap() > 0);
}

// ---------------------------------------------------------------------------
// Test: a store outage surfaces as 503
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_outage_returns_503() {
    let harness = Harness::default();
    harness.catalog.insert(character(1, 20, false));
    harness.store.set_offline(true);
    let app = common::build_test_app(&harness);

    let response = post_json(
        app,
        "/api/v1/rolls",
        json!({ "user_id": "alice", "username": "alice" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "SERVICE_UNAVAILABLE");
}

// ---------------------------------------------------------------------------
// Test: unknown and malformed trade tokens
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_trade_returns_404() {
    let harness = Harness::default();
    let app = common::build_test_app(&harness);

    let response = get(app, "/api/v1/trades/alice:bob:123").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_trade_token_returns_400() {
    let harness = Harness::default();
    let app = common::build_test_app(&harness);

    let response = get(app, "/api/v1/trades/garbage").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: a full trade over HTTP swaps both characters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trade_flow_swaps_characters() {
    let harness = Harness::default();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    harness.store.seed_user(&alice, 0);
    harness.store.seed_user(&bob, 0);
    harness.store.seed_owned(&alice, &character(10, 50, false));
    harness.store.seed_owned(&bob, &character(20, 80, true));

    let app = common::build_test_app(&harness);
    let response = post_json(
        app,
        "/api/v1/trades",
        json!({ "initiator": "alice", "target": "bob", "character": "10" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["result"], "proposed");
    let key = &json["data"]["trade"]["key"];
    let token = format!(
        "{}:{}:{}",
        key["initiator"].as_str().unwrap(),
        key["target"].as_str().unwrap(),
        key["created_at_ms"]
    );

    let app = common::build_test_app(&harness);
    let response = post_json(
        app,
        &format!("/api/v1/trades/{token}/offer"),
        json!({ "user_id": "bob", "character": "Character 20" }),
    )
    .await;
    assert_eq!(body_json(response).await["data"]["result"], "offered");

    for user in ["alice", "bob"] {
        let app = common::build_test_app(&harness);
        post_json(
            app,
            &format!("/api/v1/trades/{token}/confirm"),
            json!({ "user_id": user }),
        )
        .await;
    }

    assert_eq!(harness.store.owner(10), Some(bob));
    assert_eq!(harness.store.owner(20), Some(alice));

    let app = common::build_test_app(&harness);
    let json = body_json(get(app, &format!("/api/v1/trades/{token}")).await).await;
    assert_eq!(json["data"]["status"], "completed");
}

// ---------------------------------------------------------------------------
// Test: buying a pack without enough points is answered in band
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pack_purchase_checks_balance() {
    let harness = Harness::default();
    harness.store.seed_user(&UserId::new("alice"), 10);
    let app = common::build_test_app(&harness);

    let response = post_json(
        app,
        "/api/v1/packs",
        json!({ "user_id": "alice", "username": "alice", "kind": "standard" }),
    )
    .await;

    let json = body_json(response).await;
    assert_eq!(json["data"]["result"], "insufficient_points");
    assert_eq!(json["data"]["cost"], PackKind::Standard.cost());
    assert_eq!(json["data"]["balance"], 10);
}

#[tokio::test]
async fn unknown_pack_kind_returns_400() {
    let harness = Harness::default();
    let app = common::build_test_app(&harness);

    let response = post_json(
        app,
        "/api/v1/packs",
        json!({ "user_id": "alice", "username": "alice", "kind": "legendary" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: admin endpoints
// ---------------------------------------------------------------------------

fn admin_config() -> GameConfig {
    GameConfig {
        admin_user_ids: vec![UserId::new("root")],
        ..GameConfig::default()
    }
}

#[tokio::test]
async fn non_admin_gift_returns_403() {
    let harness = Harness::new(admin_config());
    harness.catalog.insert(character(5, 10, false));
    let app = common::build_test_app(&harness);

    let response = post_json(
        app,
        "/api/v1/admin/gifts",
        json!({ "admin_id": "mallory", "target": "bob", "character_id": 5 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");
}

#[tokio::test]
async fn admin_gift_then_removal() {
    let harness = Harness::new(admin_config());
    harness.catalog.insert(character(5, 10, false));

    let app = common::build_test_app(&harness);
    let response = post_json(
        app,
        "/api/v1/admin/gifts",
        json!({ "admin_id": "root", "target": "bob", "character_id": 5 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let gift = &json["data"]["gift"];
    let token = format!(
        "{}:{}:{}:{}",
        gift["admin"].as_str().unwrap(),
        gift["target"].as_str().unwrap(),
        gift["character_id"],
        gift["created_at_ms"]
    );

    let app = common::build_test_app(&harness);
    let response = post_json(
        app,
        &format!("/api/v1/admin/gifts/{token}/confirm"),
        json!({ "admin_id": "root" }),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["result"], "gifted");
    assert_eq!(json["data"]["outcome"]["kind"], "reserved");
    assert_eq!(harness.store.owner(5), Some(UserId::new("bob")));
    assert_eq!(harness.store.points(&UserId::new("bob")), 0);

    let app = common::build_test_app(&harness);
    let response = delete(app, "/api/v1/admin/characters/5?admin_id=root").await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["result"], "removed");
    assert_eq!(harness.store.owner(5), None);
}

// ---------------------------------------------------------------------------
// Test: read-side endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn leaderboard_orders_by_points() {
    let harness = Harness::default();
    harness.store.seed_user(&UserId::new("low"), 5);
    harness.store.seed_user(&UserId::new("high"), 500);
    let app = common::build_test_app(&harness);

    let json = body_json(get(app, "/api/v1/leaderboard?limit=1").await).await;

    let entries = json["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["user_id"], "high");
}

#[tokio::test]
async fn lucky_progress_is_reported() {
    let harness = Harness::default();
    harness.catalog.insert(character(1, 20, false));
    roll(&harness, "alice").await;
    let app = common::build_test_app(&harness);

    let json = body_json(get(app, "/api/v1/users/alice/lucky").await).await;

    assert_eq!(json["data"]["count"], 1);
    assert_eq!(json["data"]["rolls_until_lucky"], 9);
}

#[tokio::test]
async fn empty_search_returns_400() {
    let harness = Harness::default();
    let app = common::build_test_app(&harness);

    let response = get(app, "/api/v1/catalog/search?q=%20").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn top_page_lists_owners() {
    let harness = Harness::default();
    let top = character(7, 9_000, true);
    harness.catalog.set_top(vec![top.clone()]);
    harness.store.seed_owned(&UserId::new("carol"), &top);
    let app = common::build_test_app(&harness);

    let json = body_json(get(app, "/api/v1/catalog/top").await).await;

    assert_eq!(json["data"]["page"], 1);
    assert_eq!(json["data"]["entries"][0]["rank"], 1);
    assert_eq!(json["data"]["entries"][0]["owner"], "carol");
}
