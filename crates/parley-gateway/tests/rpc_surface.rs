// Drive the router in-process: the full operation surface over POST /rpc.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use parley_core::config::ParleyConfig;
use parley_gateway::{build_router, AppState};
use parley_protocol::frames::ResFrame;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    build_router(Arc::new(AppState::new(ParleyConfig::default())))
}

async fn rpc(
    router: &Router,
    session: Option<&str>,
    method: &str,
    params: Value,
) -> ResFrame {
    let frame = json!({"type": "req", "id": "t1", "method": method, "params": params});
    let mut builder = Request::builder()
        .method("POST")
        .uri("/rpc")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(session) = session {
        builder = builder.header("x-parley-session", session);
    }
    let request = builder.body(Body::from(frame.to_string())).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn payload(res: &ResFrame) -> &Value {
    assert!(res.ok, "expected ok frame, got error: {:?}", res.error);
    res.payload.as_ref().unwrap()
}

fn err_code(res: &ResFrame) -> &str {
    assert!(!res.ok, "expected error frame");
    &res.error.as_ref().unwrap().code
}

#[tokio::test]
async fn health_endpoint_responds() {
    let router = app();
    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_check_method_needs_no_session() {
    let router = app();
    let res = rpc(&router, None, "health_check", json!({})).await;
    assert!(payload(&res).as_str().unwrap().contains("healthy"));
}

#[tokio::test]
async fn unknown_method_is_invalid_request() {
    let router = app();
    let res = rpc(&router, Some("s"), "no_such_method", json!({})).await;
    assert_eq!(err_code(&res), "INVALID_REQUEST");
}

#[tokio::test]
async fn session_is_required_for_posting() {
    let router = app();
    let res = rpc(&router, None, "post_message", json!({"channel_id": "chn_x"})).await;
    assert_eq!(err_code(&res), "NO_SESSION");
}

#[tokio::test]
async fn two_player_exchange_over_the_wire() {
    let router = app();

    let created = rpc(
        &router,
        None,
        "create_channel",
        json!({"name": "Pair", "slots": ["invite:a", "invite:b"]}),
    )
    .await;
    let created = payload(&created);
    let channel_id = created["channel_id"].as_str().unwrap().to_string();
    let invites: Vec<String> = created["invites"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(invites.len(), 2);

    let join_a = rpc(
        &router,
        Some("sess_a"),
        "join_channel",
        json!({"invite_or_rejoin": invites[0]}),
    )
    .await;
    assert!(payload(&join_a)["rejoin_token"]
        .as_str()
        .unwrap()
        .starts_with("tok_"));

    let join_b = rpc(
        &router,
        Some("sess_b"),
        "join_channel",
        json!({"invite_or_rejoin": invites[1]}),
    )
    .await;
    payload(&join_b);

    let posted = rpc(
        &router,
        Some("sess_a"),
        "post_message",
        json!({"channel_id": channel_id, "body": {"text": "hi"}}),
    )
    .await;
    let msg_id = payload(&posted)["msg_id"].as_u64().unwrap();

    // a string body is wrapped as {"text": ...}
    rpc(
        &router,
        Some("sess_b"),
        "post_message",
        json!({"channel_id": channel_id, "body": "hey"}),
    )
    .await;

    let synced = rpc(
        &router,
        Some("sess_b"),
        "sync_messages",
        json!({"channel_id": channel_id, "cursor": 0, "timeout_ms": 0}),
    )
    .await;
    let synced = payload(&synced);
    let messages = synced["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["id"].as_u64().unwrap(), msg_id);
    assert_eq!(messages[1]["body"]["text"], json!("hey"));
    assert_eq!(synced["cursor"].as_u64().unwrap(), msg_id + 1);

    // non-member cannot read
    let res = rpc(
        &router,
        Some("sess_z"),
        "sync_messages",
        json!({"channel_id": channel_id, "timeout_ms": 0}),
    )
    .await;
    assert_eq!(err_code(&res), "NOT_MEMBER");
}

#[tokio::test]
async fn declared_bot_is_attached_and_disclosable() {
    let router = app();

    let created = rpc(
        &router,
        None,
        "create_channel",
        json!({
            "name": "Guessing",
            "slots": ["bot:ref", "invite:a", "invite:b"],
            "bots": [{
                "name": "GuessBot",
                "version": "1.0",
                "code_ref": "builtin://GuessBot",
                "manifest": {
                    "summary": "number guessing referee",
                    "hooks": ["on_init", "on_join", "on_message"],
                    "emits": ["judge"],
                    "params": {"range": [1, 100], "target": 42}
                }
            }]
        }),
    )
    .await;
    let created = payload(&created);
    let channel_id = created["channel_id"].as_str().unwrap().to_string();
    let invite = created["invites"][0].as_str().unwrap().to_string();

    let joined = rpc(
        &router,
        Some("sess_a"),
        "join_channel",
        json!({"invite_or_rejoin": invite}),
    )
    .await;
    let bots = payload(&joined)["bots"].as_array().unwrap().clone();
    assert_eq!(bots.len(), 1);
    let bot_id = bots[0]["bot_id"].as_str().unwrap().to_string();
    assert_eq!(bot_id, "bot_GuessBot_0");

    let synced = rpc(
        &router,
        Some("sess_a"),
        "sync_messages",
        json!({"channel_id": channel_id, "cursor": 0, "timeout_ms": 0}),
    )
    .await;
    let messages = payload(&synced)["messages"].as_array().unwrap().clone();
    let attach = messages
        .iter()
        .find(|m| m["body"]["type"] == json!("bot:attach"))
        .expect("bot:attach announced");

    let code = rpc(
        &router,
        Some("sess_a"),
        "get_bot_code",
        json!({"channel_id": channel_id, "bot_id": bot_id}),
    )
    .await;
    let code = payload(&code);
    assert_eq!(code["code_hash"], attach["body"]["code_hash"]);
    assert_eq!(code["manifest_hash"], attach["body"]["manifest_hash"]);
    assert_eq!(
        code["code_hash"].as_str().unwrap(),
        parley_core::hash::code_hash("builtin://GuessBot")
    );

    // transparency is member-gated
    let res = rpc(
        &router,
        Some("sess_z"),
        "get_bot_code",
        json!({"channel_id": channel_id, "bot_id": bot_id}),
    )
    .await;
    assert_eq!(err_code(&res), "NOT_MEMBER");

    let info = rpc(
        &router,
        Some("sess_a"),
        "get_channel_info",
        json!({"channel_id": channel_id}),
    )
    .await;
    assert_eq!(payload(&info)["bots"].as_array().unwrap().len(), 1);

    let listed = rpc(&router, None, "list_channels", json!({})).await;
    assert_eq!(payload(&listed)["total"].as_u64().unwrap(), 1);
}

#[tokio::test]
async fn game_move_round_trip_over_the_wire() {
    let router = app();

    let created = rpc(
        &router,
        None,
        "create_channel",
        json!({
            "name": "Game",
            "slots": ["bot:ref", "invite:a", "invite:b"],
            "bots": [{
                "name": "GuessBot",
                "code_ref": "builtin://GuessBot",
                "manifest": {"params": {"range": [1, 100], "target": 42}}
            }]
        }),
    )
    .await;
    let created = payload(&created);
    let channel_id = created["channel_id"].as_str().unwrap().to_string();
    let invites: Vec<String> = created["invites"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();

    for (invite, session) in invites.iter().zip(["sess_a", "sess_b"]) {
        let res = rpc(
            &router,
            Some(session),
            "join_channel",
            json!({"invite_or_rejoin": invite}),
        )
        .await;
        payload(&res);
    }

    let synced = rpc(
        &router,
        Some("sess_a"),
        "sync_messages",
        json!({"channel_id": channel_id, "cursor": 0, "timeout_ms": 0}),
    )
    .await;
    let messages = payload(&synced)["messages"].as_array().unwrap().clone();
    let named = messages
        .iter()
        .filter(|m| m["body"]["type"] == json!("bot:turn"))
        .next_back()
        .expect("bot:turn after both joins")["body"]["player"]
        .as_str()
        .unwrap()
        .to_string();

    let moved = rpc(
        &router,
        Some(&named),
        "make_game_move",
        json!({"channel_id": channel_id, "game": "guess", "action": "guess", "value": 42}),
    )
    .await;
    payload(&moved);

    let synced = rpc(
        &router,
        Some("sess_a"),
        "sync_messages",
        json!({"channel_id": channel_id, "cursor": 0, "timeout_ms": 0}),
    )
    .await;
    let messages = payload(&synced)["messages"].as_array().unwrap().clone();
    assert!(messages
        .iter()
        .any(|m| m["body"]["type"] == json!("judge") && m["body"]["result"] == json!("correct")));
    let reveal = messages
        .iter()
        .find(|m| m["body"]["type"] == json!("bot:reveal"))
        .expect("reveal posted");
    assert_eq!(reveal["body"]["target"], json!(42));
    assert_eq!(reveal["body"]["verified"], json!(true));
}

#[tokio::test]
async fn update_channel_is_admin_gated_over_the_wire() {
    let router = app();

    let created = rpc(
        &router,
        None,
        "create_channel",
        json!({"name": "Locked", "slots": ["invite:a"]}),
    )
    .await;
    let created = payload(&created);
    let channel_id = created["channel_id"].as_str().unwrap().to_string();
    let invite = created["invites"][0].as_str().unwrap().to_string();

    let res = rpc(
        &router,
        Some("sess_a"),
        "join_channel",
        json!({"invite_or_rejoin": invite}),
    )
    .await;
    payload(&res);

    let res = rpc(
        &router,
        Some("sess_a"),
        "update_channel",
        json!({"channel_id": channel_id, "ops": [{"type": "rename", "name": "X"}]}),
    )
    .await;
    assert_eq!(err_code(&res), "NOT_ADMIN");
}
