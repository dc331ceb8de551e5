//! Concrete RPC method handler functions.
//!
//! Each function extracts its parameters, calls the appropriate `AppState`
//! subsystem, and returns a `ResFrame`. `dispatch::route` is the only caller —
//! keep this module free of I/O side-effects beyond the subsystem calls.

use serde_json::Value;
use tracing::{error, warn};

use parley_bots::BotDefinition;
use parley_channels::types::{BotSpec, Message, MessageKind};
use parley_channels::ChannelError;
use parley_protocol::frames::ResFrame;

use crate::app::AppState;

fn channel_err(req_id: &str, e: &ChannelError) -> ResFrame {
    ResFrame::err(req_id, e.code(), &e.to_string())
}

fn bot_err(req_id: &str, e: &parley_bots::BotError) -> ResFrame {
    ResFrame::err(req_id, e.code(), &e.to_string())
}

fn require_str<'a>(
    params: Option<&'a Value>,
    key: &str,
) -> Result<&'a str, String> {
    params
        .and_then(|p| p.get(key))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing '{key}' field"))
}

// ---------------------------------------------------------------------------
// health_check
// ---------------------------------------------------------------------------

pub async fn handle_health_check(req_id: &str) -> ResFrame {
    ResFrame::ok(
        req_id,
        format!(
            "Parley server healthy at {}",
            chrono::Utc::now().to_rfc3339()
        ),
    )
}

// ---------------------------------------------------------------------------
// create_channel
// ---------------------------------------------------------------------------

/// Params: `{ "name": string, "slots": ["kind:label", ...], "bots"?: [BotDefinition] }`
///
/// Declared bots are attached after the channel exists; per-bot attach
/// failures are logged without failing the create, matching long-poll
/// clients that inspect the log for `bot:attach` anyway.
pub async fn handle_create_channel(
    params: Option<&Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let name = match require_str(params, "name") {
        Ok(s) => s,
        Err(msg) => return ResFrame::err(req_id, "INVALID_REQUEST", &msg),
    };

    let slots: Vec<String> = match params
        .and_then(|p| p.get("slots"))
        .and_then(|v| v.as_array())
    {
        Some(arr) if !arr.is_empty() => arr
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => return ResFrame::err(req_id, "INVALID_REQUEST", "'slots' must be a non-empty array"),
    };

    let bot_defs: Vec<BotDefinition> = match params.and_then(|p| p.get("bots")) {
        None | Some(Value::Null) => Vec::new(),
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(defs) => defs,
            Err(e) => {
                return ResFrame::err(req_id, "INVALID_REQUEST", &format!("invalid bots: {e}"))
            }
        },
    };

    let bot_specs: Vec<BotSpec> = bot_defs
        .iter()
        .map(|d| BotSpec {
            name: d.name.clone(),
            version: d.version.clone(),
            summary: d
                .manifest
                .as_ref()
                .and_then(|m| m.get("summary"))
                .and_then(|s| s.as_str())
                .unwrap_or("")
                .to_string(),
        })
        .collect();

    let created = match app.store.create_channel(name, &slots, &bot_specs) {
        Ok(created) => created,
        Err(e) => return channel_err(req_id, &e),
    };

    for def in bot_defs {
        let bot_name = def.name.clone();
        if let Err(e) = app.bots.attach_bot(&created.channel_id, def).await {
            error!(channel = %created.channel_id, bot = %bot_name, error = %e, "bot attach failed");
        }
    }

    match app.store.channel_view(&created.channel_id) {
        Ok(view) => ResFrame::ok(
            req_id,
            serde_json::json!({
                "channel_id": created.channel_id,
                "invites": created.invites,
                "view": view,
            }),
        ),
        Err(e) => channel_err(req_id, &e),
    }
}

// ---------------------------------------------------------------------------
// join_channel
// ---------------------------------------------------------------------------

/// Params: `{ "invite_or_rejoin": string }` (`invite_code` accepted as an alias)
pub async fn handle_join_channel(
    params: Option<&Value>,
    req_id: &str,
    session: &str,
    app: &AppState,
) -> ResFrame {
    let credential = match require_str(params, "invite_or_rejoin")
        .or_else(|_| require_str(params, "invite_code"))
    {
        Ok(s) => s,
        Err(_) => {
            return ResFrame::err(req_id, "INVALID_REQUEST", "missing 'invite_or_rejoin' field")
        }
    };

    let joined = match app.store.join_channel(credential, session) {
        Ok(joined) => joined,
        Err(e) => return channel_err(req_id, &e),
    };

    app.bots.dispatch_join(&joined.channel_id, session).await;

    let bots = app.bots.get_channel_bots(&joined.channel_id);
    match app.store.channel_view(&joined.channel_id) {
        Ok(view) => ResFrame::ok(
            req_id,
            serde_json::json!({
                "channel_id": joined.channel_id,
                "slot_id": joined.slot_id,
                "rejoin_token": joined.rejoin_token,
                "view": view,
                "bots": bots,
            }),
        ),
        Err(e) => channel_err(req_id, &e),
    }
}

// ---------------------------------------------------------------------------
// post_message
// ---------------------------------------------------------------------------

/// Params: `{ "channel_id": string, "kind"?: string, "body"?: object|string }`
///
/// A string body is wrapped as `{"text": ...}`; a missing body becomes `{}`.
pub async fn handle_post_message(
    params: Option<&Value>,
    req_id: &str,
    session: &str,
    app: &AppState,
) -> ResFrame {
    let channel_id = match require_str(params, "channel_id") {
        Ok(s) => s,
        Err(msg) => return ResFrame::err(req_id, "INVALID_REQUEST", &msg),
    };

    let kind: MessageKind = match params
        .and_then(|p| p.get("kind"))
        .and_then(|v| v.as_str())
        .unwrap_or("user")
        .parse()
    {
        Ok(kind) => kind,
        Err(e) => return ResFrame::err(req_id, "INVALID_REQUEST", &e.to_string()),
    };

    let body = match params.and_then(|p| p.get("body")) {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::String(text)) => serde_json::json!({"text": text}),
        Some(obj @ Value::Object(_)) => obj.clone(),
        Some(other) => {
            return ResFrame::err(
                req_id,
                "INVALID_REQUEST",
                &format!("invalid body type: {other}"),
            )
        }
    };

    post_and_dispatch(req_id, session, app, channel_id, kind, body).await
}

// ---------------------------------------------------------------------------
// make_game_move
// ---------------------------------------------------------------------------

/// Params: `{ "channel_id": string, "game": string, "action": string, "value": any }`
pub async fn handle_make_game_move(
    params: Option<&Value>,
    req_id: &str,
    session: &str,
    app: &AppState,
) -> ResFrame {
    let channel_id = match require_str(params, "channel_id") {
        Ok(s) => s,
        Err(msg) => return ResFrame::err(req_id, "INVALID_REQUEST", &msg),
    };
    let game = match require_str(params, "game") {
        Ok(s) => s,
        Err(msg) => return ResFrame::err(req_id, "INVALID_REQUEST", &msg),
    };
    let action = match require_str(params, "action") {
        Ok(s) => s,
        Err(msg) => return ResFrame::err(req_id, "INVALID_REQUEST", &msg),
    };
    let value = params
        .and_then(|p| p.get("value"))
        .cloned()
        .unwrap_or(Value::Null);

    let body = serde_json::json!({
        "type": "move",
        "game": game,
        "action": action,
        "value": value,
    });

    post_and_dispatch(req_id, session, app, channel_id, MessageKind::User, body).await
}

/// Append a transport-originated message, then fan it out to attached bots.
/// System-kind posts skip the fan-out.
async fn post_and_dispatch(
    req_id: &str,
    session: &str,
    app: &AppState,
    channel_id: &str,
    kind: MessageKind,
    body: Value,
) -> ResFrame {
    let receipt = match app.store.post_message(channel_id, session, kind, body.clone()) {
        Ok(receipt) => receipt,
        Err(e) => return channel_err(req_id, &e),
    };

    if kind != MessageKind::System {
        let message = Message {
            id: receipt.msg_id,
            channel_id: channel_id.to_string(),
            sender: session.to_string(),
            kind,
            body,
            ts: receipt.ts.clone(),
        };
        app.bots.dispatch_message(channel_id, &message).await;
    }

    ResFrame::ok(req_id, receipt)
}

// ---------------------------------------------------------------------------
// sync_messages
// ---------------------------------------------------------------------------

/// Params: `{ "channel_id": string, "cursor"?: number, "timeout_ms"?: number }`
pub async fn handle_sync_messages(
    params: Option<&Value>,
    req_id: &str,
    session: &str,
    app: &AppState,
) -> ResFrame {
    let channel_id = match require_str(params, "channel_id") {
        Ok(s) => s,
        Err(msg) => return ResFrame::err(req_id, "INVALID_REQUEST", &msg),
    };

    let cursor = params
        .and_then(|p| p.get("cursor"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    let timeout_ms = params
        .and_then(|p| p.get("timeout_ms"))
        .and_then(|v| v.as_u64())
        .unwrap_or(app.config.sync.default_timeout_ms)
        .min(app.config.sync.max_timeout_ms);

    match app
        .store
        .sync_messages(channel_id, session, cursor, timeout_ms)
        .await
    {
        Ok(result) => ResFrame::ok(req_id, result),
        Err(e) => channel_err(req_id, &e),
    }
}

// ---------------------------------------------------------------------------
// get_channel_info
// ---------------------------------------------------------------------------

/// Params: `{ "channel_id": string }`
pub async fn handle_get_channel_info(
    params: Option<&Value>,
    req_id: &str,
    session: &str,
    app: &AppState,
) -> ResFrame {
    let channel_id = match require_str(params, "channel_id") {
        Ok(s) => s,
        Err(msg) => return ResFrame::err(req_id, "INVALID_REQUEST", &msg),
    };

    match app.store.is_member(channel_id, session) {
        Ok(true) => {}
        Ok(false) => {
            return ResFrame::err(req_id, "NOT_MEMBER", "not a channel member")
        }
        Err(e) => return channel_err(req_id, &e),
    }

    match app.store.channel_view(channel_id) {
        Ok(view) => ResFrame::ok(
            req_id,
            serde_json::json!({
                "view": view,
                "bots": app.bots.get_channel_bots(channel_id),
            }),
        ),
        Err(e) => channel_err(req_id, &e),
    }
}

// ---------------------------------------------------------------------------
// get_bot_code
// ---------------------------------------------------------------------------

/// Params: `{ "channel_id": string, "bot_id": string }`
///
/// The transparency endpoint: any member receives the exact content the
/// attach-time hashes cover, for independent verification.
pub async fn handle_get_bot_code(
    params: Option<&Value>,
    req_id: &str,
    session: &str,
    app: &AppState,
) -> ResFrame {
    let channel_id = match require_str(params, "channel_id") {
        Ok(s) => s,
        Err(msg) => return ResFrame::err(req_id, "INVALID_REQUEST", &msg),
    };
    let bot_id = match require_str(params, "bot_id") {
        Ok(s) => s,
        Err(msg) => return ResFrame::err(req_id, "INVALID_REQUEST", &msg),
    };

    match app.store.is_member(channel_id, session) {
        Ok(true) => {}
        Ok(false) => {
            return ResFrame::err(req_id, "NOT_MEMBER", "not a channel member")
        }
        Err(e) => return channel_err(req_id, &e),
    }

    match app.bots.get_bot_code(channel_id, bot_id) {
        Ok(code) => ResFrame::ok(req_id, code),
        Err(e) => bot_err(req_id, &e),
    }
}

// ---------------------------------------------------------------------------
// list_channels
// ---------------------------------------------------------------------------

pub async fn handle_list_channels(req_id: &str, app: &AppState) -> ResFrame {
    let channels = app.store.list_channels();
    ResFrame::ok(
        req_id,
        serde_json::json!({
            "total": channels.len(),
            "channels": channels,
        }),
    )
}

// ---------------------------------------------------------------------------
// update_channel
// ---------------------------------------------------------------------------

/// Params: `{ "channel_id": string, "ops": [op, ...] }`
///
/// After the ops land, their bot-lifecycle consequences run: `set_bot`
/// attaches the named definition, `remove_bot` detaches the instance that
/// held the slot.
pub async fn handle_update_channel(
    params: Option<&Value>,
    req_id: &str,
    session: &str,
    app: &AppState,
) -> ResFrame {
    let channel_id = match require_str(params, "channel_id") {
        Ok(s) => s,
        Err(msg) => return ResFrame::err(req_id, "INVALID_REQUEST", &msg),
    };

    let raw_ops: Vec<Value> = match params.and_then(|p| p.get("ops")).and_then(|v| v.as_array()) {
        Some(arr) => arr.clone(),
        None => return ResFrame::err(req_id, "INVALID_REQUEST", "'ops' must be an array"),
    };

    // Resolve remove_bot targets before the slots are cleared.
    let mut detach_names: Vec<String> = Vec::new();
    for raw in &raw_ops {
        if raw.get("type").and_then(|v| v.as_str()) == Some("remove_bot") {
            if let Some(slot_id) = raw.get("slot_id").and_then(|v| v.as_str()) {
                if let Ok(Some(occupant)) = app.store.slot_occupant(channel_id, slot_id) {
                    if let Some(name) = occupant.strip_prefix("bot:") {
                        detach_names.push(name.to_string());
                    }
                }
            }
        }
    }

    let result = match app.store.update_channel(channel_id, session, &raw_ops) {
        Ok(result) => result,
        Err(e) => return channel_err(req_id, &e),
    };

    for name in detach_names {
        if !app.bots.detach_bot(channel_id, &name) {
            warn!(channel = %channel_id, bot = %name, "remove_bot had no attached instance");
        }
    }

    for raw in &raw_ops {
        if raw.get("type").and_then(|v| v.as_str()) != Some("set_bot") {
            continue;
        }
        let Some(def_value) = raw.get("bot_def") else { continue };
        match serde_json::from_value::<BotDefinition>(def_value.clone()) {
            Ok(def) => {
                let bot_name = def.name.clone();
                if let Err(e) = app.bots.attach_bot(channel_id, def).await {
                    error!(channel = %channel_id, bot = %bot_name, error = %e, "set_bot attach failed");
                }
            }
            Err(e) => {
                warn!(channel = %channel_id, error = %e, "set_bot carried an unparseable bot_def");
            }
        }
    }

    match app.store.channel_view(channel_id) {
        Ok(view) => ResFrame::ok(req_id, serde_json::json!({"ok": result.ok, "view": view})),
        Err(e) => channel_err(req_id, &e),
    }
}
