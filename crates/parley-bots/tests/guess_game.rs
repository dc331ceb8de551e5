// End-to-end referee round-trip: attach, commit, joins, turns, judge, reveal.

use std::sync::Arc;

use parley_bots::{BotDefinition, BotManager, BotRegistry};
use parley_channels::types::{Message, MessageKind};
use parley_channels::ChannelStore;
use parley_core::config::SandboxConfig;
use serde_json::{json, Value};

fn runtime() -> (Arc<ChannelStore>, BotManager) {
    let store = Arc::new(ChannelStore::new());
    let manager = BotManager::new(
        Arc::clone(&store),
        BotRegistry::with_builtins(),
        SandboxConfig::default(),
    );
    (store, manager)
}

fn referee_def(target: i64) -> BotDefinition {
    serde_json::from_value(json!({
        "name": "GuessBot",
        "version": "1.0",
        "code_ref": "builtin://GuessBot",
        "manifest": {
            "summary": "number guessing referee",
            "hooks": ["on_init", "on_join", "on_message"],
            "emits": ["judge", "bot:turn", "bot:reveal"],
            "params": {"range": [1, 100], "target": target}
        }
    }))
    .unwrap()
}

async fn log_bodies(store: &ChannelStore, channel_id: &str, session: &str) -> Vec<Value> {
    store
        .sync_messages(channel_id, session, 0, 0)
        .await
        .unwrap()
        .messages
        .into_iter()
        .map(|m| m.body)
        .collect()
}

fn find_type<'a>(bodies: &'a [Value], ty: &str) -> Option<&'a Value> {
    bodies.iter().find(|b| b.get("type") == Some(&json!(ty)))
}

/// Drive a user post the way the facade does: append, then fan out to bots.
async fn user_post(
    store: &ChannelStore,
    manager: &BotManager,
    channel_id: &str,
    sender: &str,
    body: Value,
) {
    let receipt = store
        .post_message(channel_id, sender, MessageKind::User, body.clone())
        .unwrap();
    let message = Message {
        id: receipt.msg_id,
        channel_id: channel_id.to_string(),
        sender: sender.to_string(),
        kind: MessageKind::User,
        body,
        ts: receipt.ts,
    };
    manager.dispatch_message(channel_id, &message).await;
}

async fn setup_game(
    target: i64,
) -> (Arc<ChannelStore>, BotManager, String, String) {
    let (store, manager) = runtime();
    let created = store
        .create_channel(
            "Guess",
            &[
                "bot:ref".to_string(),
                "invite:a".to_string(),
                "invite:b".to_string(),
            ],
            &[],
        )
        .unwrap();
    let channel_id = created.channel_id.clone();

    manager
        .attach_bot(&channel_id, referee_def(target))
        .await
        .unwrap();

    store.join_channel(&created.invites[0], "sess_a").unwrap();
    manager.dispatch_join(&channel_id, "sess_a").await;
    store.join_channel(&created.invites[1], "sess_b").unwrap();
    manager.dispatch_join(&channel_id, "sess_b").await;

    let bodies = log_bodies(&store, &channel_id, "sess_a").await;
    let named = find_type(&bodies, "bot:turn")
        .expect("bot:turn after second join")["player"]
        .as_str()
        .unwrap()
        .to_string();
    (store, manager, channel_id, named)
}

#[tokio::test]
async fn attach_commits_before_any_join() {
    let (store, manager) = runtime();
    let created = store
        .create_channel(
            "Guess",
            &["bot:ref".to_string(), "invite:a".to_string()],
            &[],
        )
        .unwrap();
    manager
        .attach_bot(&created.channel_id, referee_def(42))
        .await
        .unwrap();
    store.join_channel(&created.invites[0], "sess_a").unwrap();

    let bodies = log_bodies(&store, &created.channel_id, "sess_a").await;
    assert!(find_type(&bodies, "bot:attach").is_some());
    assert!(find_type(&bodies, "bot:manifest").is_some());
    assert!(find_type(&bodies, "prompt").is_some());
    let commit = find_type(&bodies, "bot:commit").expect("commitment posted at init");
    assert_eq!(commit["commit"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn game_starts_on_second_join_and_names_a_player() {
    let (store, _manager, channel_id, named) = setup_game(42).await;
    let bodies = log_bodies(&store, &channel_id, "sess_a").await;

    let start = find_type(&bodies, "game_start").expect("game_start after second join");
    let players: Vec<&str> = start["players"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap())
        .collect();
    assert_eq!(players.len(), 2);
    assert!(players.contains(&named.as_str()));
}

#[tokio::test]
async fn correct_guess_is_judged_and_target_revealed() {
    let (store, manager, channel_id, named) = setup_game(42).await;

    user_post(
        &store,
        &manager,
        &channel_id,
        &named,
        json!({"type": "move", "game": "guess", "action": "guess", "value": 42}),
    )
    .await;

    let bodies = log_bodies(&store, &channel_id, "sess_a").await;
    let judge = find_type(&bodies, "judge").expect("judge posted");
    assert_eq!(judge["result"], json!("correct"));
    assert_eq!(judge["player"], json!(named));

    let reveal = find_type(&bodies, "bot:reveal").expect("reveal posted");
    assert_eq!(reveal["target"], json!(42));
    assert_eq!(reveal["verified"], json!(true));

    let end = find_type(&bodies, "game_end").expect("game_end posted");
    assert_eq!(end["winner"], json!(named));
}

#[tokio::test]
async fn wrong_guess_gets_hint_and_turn_passes() {
    let (store, manager, channel_id, named) = setup_game(42).await;

    user_post(
        &store,
        &manager,
        &channel_id,
        &named,
        json!({"type": "move", "game": "guess", "action": "guess", "value": 90}),
    )
    .await;

    let bodies = log_bodies(&store, &channel_id, "sess_a").await;
    let judge = find_type(&bodies, "judge").expect("judge posted");
    assert_eq!(judge["result"], json!("high"));
    assert_eq!(judge["hint"], json!("cold"));

    // turn passed to the other player
    let last_turn = bodies
        .iter()
        .filter(|b| b.get("type") == Some(&json!("bot:turn")))
        .next_back()
        .unwrap();
    assert_ne!(last_turn["player"], json!(named));
    assert!(find_type(&bodies, "bot:reveal").is_none(), "game still running");
}

#[tokio::test]
async fn out_of_turn_move_is_a_violation_not_an_error() {
    let (store, manager, channel_id, named) = setup_game(42).await;
    let other = if named == "sess_a" { "sess_b" } else { "sess_a" };

    user_post(
        &store,
        &manager,
        &channel_id,
        other,
        json!({"type": "move", "game": "guess", "action": "guess", "value": 10}),
    )
    .await;

    let bodies = log_bodies(&store, &channel_id, "sess_a").await;
    let violation = find_type(&bodies, "violation").expect("violation control message");
    assert_eq!(violation["reason"], json!("BAD_TURN"));
    assert!(find_type(&bodies, "judge").is_none());
}

#[tokio::test]
async fn malformed_moves_are_bad_move_violations() {
    let (store, manager, channel_id, named) = setup_game(42).await;

    user_post(
        &store,
        &manager,
        &channel_id,
        &named,
        json!({"type": "move", "game": "guess", "action": "guess", "value": 9000}),
    )
    .await;

    let bodies = log_bodies(&store, &channel_id, "sess_a").await;
    let violation = find_type(&bodies, "violation").expect("violation control message");
    assert_eq!(violation["reason"], json!("BAD_MOVE"));
}

#[tokio::test]
async fn concede_ends_the_game_for_the_remaining_player() {
    let (store, manager, channel_id, named) = setup_game(42).await;
    let other = if named == "sess_a" { "sess_b" } else { "sess_a" };

    user_post(
        &store,
        &manager,
        &channel_id,
        &named,
        json!({"type": "move", "game": "guess", "action": "concede", "value": 0}),
    )
    .await;

    let bodies = log_bodies(&store, &channel_id, "sess_a").await;
    let end = find_type(&bodies, "game_end").expect("game ends after concede");
    assert_eq!(end["winner"], json!(other));
    assert_eq!(end["reason"], json!("concede"));
    assert_eq!(find_type(&bodies, "bot:reveal").unwrap()["verified"], json!(true));
}
