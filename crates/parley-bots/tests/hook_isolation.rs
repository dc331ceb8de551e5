// Hook failures stay contained: a panicking or overrunning bot never blocks
// other bots, poisons its channel, or lands effects past its deadline.

use std::sync::Arc;
use std::time::Duration;

use parley_bots::{BotContext, BotClass, BotDefinition, BotHooks, BotManager, BotRegistry};
use parley_channels::types::{Message, MessageKind};
use parley_channels::ChannelStore;
use parley_core::config::SandboxConfig;
use serde_json::{json, Value};

struct PanicBotClass;

impl BotClass for PanicBotClass {
    fn name(&self) -> &'static str {
        "PanicBot"
    }

    fn instantiate(
        &self,
        _ctx: &BotContext,
        _params: &Value,
    ) -> parley_bots::error::Result<Box<dyn BotHooks>> {
        Ok(Box::new(PanicBot))
    }
}

struct PanicBot;

impl BotHooks for PanicBot {
    fn on_message(&mut self, _ctx: &BotContext, _msg: &Message) -> parley_bots::error::Result<()> {
        panic!("intentional test panic");
    }
}

struct SlowBotClass;

impl BotClass for SlowBotClass {
    fn name(&self) -> &'static str {
        "SlowBot"
    }

    fn instantiate(
        &self,
        _ctx: &BotContext,
        _params: &Value,
    ) -> parley_bots::error::Result<Box<dyn BotHooks>> {
        Ok(Box::new(SlowBot))
    }
}

struct SlowBot;

impl BotHooks for SlowBot {
    fn on_message(&mut self, ctx: &BotContext, _msg: &Message) -> parley_bots::error::Result<()> {
        ctx.post(MessageKind::Bot, json!({"type": "before_deadline"}))?;
        std::thread::sleep(Duration::from_millis(300));
        // past the 100ms deadline: the context must refuse this
        ctx.post(MessageKind::Bot, json!({"type": "after_deadline"}))?;
        Ok(())
    }
}

fn runtime(hook_timeout_ms: u64) -> (Arc<ChannelStore>, BotManager) {
    let store = Arc::new(ChannelStore::new());
    let registry = BotRegistry::with_builtins();
    registry.register(Arc::new(PanicBotClass));
    registry.register(Arc::new(SlowBotClass));
    let config = SandboxConfig {
        hook_timeout_ms,
        ..SandboxConfig::default()
    };
    let manager = BotManager::new(Arc::clone(&store), registry, config);
    (store, manager)
}

fn def(name: &str) -> BotDefinition {
    serde_json::from_value(json!({"name": name, "code_ref": format!("builtin://{name}")})).unwrap()
}

async fn setup(
    hook_timeout_ms: u64,
    bot_names: &[&str],
) -> (Arc<ChannelStore>, BotManager, String) {
    let (store, manager) = runtime(hook_timeout_ms);
    let created = store
        .create_channel("Iso", &["invite:a".to_string()], &[])
        .unwrap();
    store.join_channel(&created.invites[0], "sess_a").unwrap();
    for name in bot_names {
        manager.attach_bot(&created.channel_id, def(name)).await.unwrap();
    }
    (store, manager, created.channel_id)
}

async fn user_post(
    store: &ChannelStore,
    manager: &BotManager,
    channel_id: &str,
    body: Value,
) {
    let receipt = store
        .post_message(channel_id, "sess_a", MessageKind::User, body.clone())
        .unwrap();
    let message = Message {
        id: receipt.msg_id,
        channel_id: channel_id.to_string(),
        sender: "sess_a".to_string(),
        kind: MessageKind::User,
        body,
        ts: receipt.ts,
    };
    manager.dispatch_message(channel_id, &message).await;
}

#[tokio::test]
async fn panicking_bot_does_not_starve_the_others() {
    // PanicBot is attached first, so it panics before EchoBot runs
    let (store, manager, channel_id) = setup(5_000, &["PanicBot", "EchoBot"]).await;

    user_post(&store, &manager, &channel_id, json!({"text": "hello"})).await;

    let bodies: Vec<Value> = store
        .sync_messages(&channel_id, "sess_a", 0, 0)
        .await
        .unwrap()
        .messages
        .into_iter()
        .map(|m| m.body)
        .collect();
    let echoes: Vec<&Value> = bodies
        .iter()
        .filter(|b| b.get("type") == Some(&json!("echo")))
        .collect();
    assert_eq!(echoes.len(), 1);
    assert_eq!(echoes[0]["text"], json!("hello"));

    // the channel is not poisoned: the next dispatch works too
    user_post(&store, &manager, &channel_id, json!({"text": "again"})).await;
    let bodies: Vec<Value> = store
        .sync_messages(&channel_id, "sess_a", 0, 0)
        .await
        .unwrap()
        .messages
        .into_iter()
        .map(|m| m.body)
        .collect();
    assert!(bodies
        .iter()
        .any(|b| b.get("text") == Some(&json!("again")) && b.get("type") == Some(&json!("echo"))));
}

#[tokio::test]
async fn overrunning_hook_keeps_pre_deadline_posts_only() {
    let (store, manager, channel_id) = setup(100, &["SlowBot"]).await;

    user_post(&store, &manager, &channel_id, json!({"text": "go"})).await;

    // give the abandoned hook thread time to attempt its late post
    tokio::time::sleep(Duration::from_millis(400)).await;

    let bodies: Vec<Value> = store
        .sync_messages(&channel_id, "sess_a", 0, 0)
        .await
        .unwrap()
        .messages
        .into_iter()
        .map(|m| m.body)
        .collect();

    assert!(
        bodies.iter().any(|b| b.get("type") == Some(&json!("before_deadline"))),
        "post issued before the deadline is durable"
    );
    assert!(
        !bodies.iter().any(|b| b.get("type") == Some(&json!("after_deadline"))),
        "post attempted after the deadline is refused"
    );
}

#[tokio::test]
async fn inline_bot_with_denied_import_fails_at_attach() {
    let (store, manager) = runtime(5_000);
    let created = store
        .create_channel("Sandbox", &["invite:a".to_string()], &[])
        .unwrap();

    let bad: BotDefinition = serde_json::from_value(json!({
        "name": "Bad",
        "inline_code": "import os\nclass Bad:\n    def __init__(self, ctx, p): pass",
    }))
    .unwrap();
    let err = manager.attach_bot(&created.channel_id, bad).await.unwrap_err();
    assert_eq!(err.code(), "IMPORT_DENIED");

    // nothing was attached or announced
    assert!(manager.get_channel_bots(&created.channel_id).is_empty());
}

#[tokio::test]
async fn inline_bot_with_allowlisted_imports_attaches() {
    let (store, manager) = runtime(5_000);
    let created = store
        .create_channel("Sandbox", &["invite:a".to_string()], &[])
        .unwrap();
    store.join_channel(&created.invites[0], "sess_a").unwrap();

    let source = "import random\nimport json\n\nclass EchoBot:\n    def __init__(self, ctx, params):\n        pass\n";
    let good: BotDefinition = serde_json::from_value(json!({
        "name": "EchoBot",
        "inline_code": source,
    }))
    .unwrap();
    let receipt = manager
        .attach_bot(&created.channel_id, good)
        .await
        .unwrap();
    assert_eq!(receipt.code_hash, parley_core::hash::code_hash(source));

    // disclosure returns the very source that was hashed
    let code = manager
        .get_bot_code(&created.channel_id, &receipt.bot_id)
        .unwrap();
    assert_eq!(code.inline_code.as_deref(), Some(source));
    assert!(code.code_ref.is_none());
}
