//! Bot lifecycle: attachment, hook dispatch, state, and code retrieval.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use parley_channels::store::PostReceipt;
use parley_channels::types::{bot_sender, Message, MessageKind};
use parley_channels::{ChannelError, ChannelStore};
use parley_core::config::SandboxConfig;

use crate::context::BotContext;
use crate::definition::{BotDefinition, BUILTIN_SCHEME};
use crate::error::{BotError, Result};
use crate::registry::BotRegistry;
use crate::sandbox;
use crate::traits::BotClass;

struct BotState {
    value: Value,
    version: u64,
}

/// Runtime record of one bot attached to one channel.
pub struct BotInstance {
    pub bot_id: String,
    pub def: BotDefinition,
    class: Arc<dyn BotClass>,
    state: Mutex<BotState>,
    pub created_at: String,
}

/// Shared interior of the BotManager — the Context holds an Arc to this so
/// re-entrant posts from hooks need no reference back through the manager.
pub(crate) struct ManagerShared {
    pub(crate) store: Arc<ChannelStore>,
    /// channel id → attached instances, in attach order.
    instances: DashMap<String, Vec<Arc<BotInstance>>>,
    pub(crate) registry: BotRegistry,
    pub(crate) config: SandboxConfig,
}

impl ManagerShared {
    fn find_instance(&self, channel_id: &str, bot_id: &str) -> Option<Arc<BotInstance>> {
        self.instances
            .get(channel_id)
            .and_then(|v| v.iter().find(|i| i.bot_id == bot_id).cloned())
    }

    /// Post under the bot's synthesized identity, decorating the body with
    /// the bot id and current state version.
    pub(crate) fn post_message_from_bot(
        &self,
        channel_id: &str,
        bot_id: &str,
        kind: MessageKind,
        body: Value,
    ) -> Result<PostReceipt> {
        let mut decorated = match body {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        decorated.insert("bot_id".to_string(), Value::String(bot_id.to_string()));
        decorated.insert(
            "state_version".to_string(),
            Value::from(self.get_bot_state_version(channel_id, bot_id)),
        );

        let receipt = self.store.post_message(
            channel_id,
            &bot_sender(bot_id),
            kind,
            Value::Object(decorated),
        )?;
        Ok(receipt)
    }

    pub(crate) fn get_bot_state(&self, channel_id: &str, bot_id: &str) -> Value {
        self.find_instance(channel_id, bot_id)
            .map(|i| i.state.lock().expect("bot state poisoned").value.clone())
            .unwrap_or(Value::Null)
    }

    pub(crate) fn set_bot_state(&self, channel_id: &str, bot_id: &str, value: Value) {
        if let Some(instance) = self.find_instance(channel_id, bot_id) {
            let mut state = instance.state.lock().expect("bot state poisoned");
            state.value = value;
            state.version += 1;
        }
    }

    pub(crate) fn get_bot_state_version(&self, channel_id: &str, bot_id: &str) -> u64 {
        self.find_instance(channel_id, bot_id)
            .map(|i| i.state.lock().expect("bot state poisoned").version)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachReceipt {
    pub bot_id: String,
    pub code_hash: String,
    pub manifest_hash: String,
}

/// Listing entry for `get_channel_bots`.
#[derive(Debug, Clone, Serialize)]
pub struct BotOverview {
    pub bot_id: String,
    pub name: String,
    pub version: String,
    pub manifest: Option<Value>,
    pub created_at: String,
    pub state_version: u64,
}

/// Full disclosure record for the transparency protocol.
#[derive(Debug, Clone, Serialize)]
pub struct BotCode {
    pub bot_id: String,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_code: Option<String>,
    pub manifest: Option<Value>,
    pub code_hash: String,
    pub manifest_hash: String,
}

enum HookInvocation {
    Init,
    Join(String),
    Message(Box<Message>),
}

impl HookInvocation {
    fn name(&self) -> &'static str {
        match self {
            HookInvocation::Init => "on_init",
            HookInvocation::Join(_) => "on_join",
            HookInvocation::Message(_) => "on_message",
        }
    }
}

/// Bot runtime for the whole process. Cheap to clone.
#[derive(Clone)]
pub struct BotManager {
    shared: Arc<ManagerShared>,
}

impl BotManager {
    pub fn new(store: Arc<ChannelStore>, registry: BotRegistry, config: SandboxConfig) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                store,
                instances: DashMap::new(),
                registry,
                config,
            }),
        }
    }

    /// Attach a bot to a channel: resolve its class, seat it, hash its
    /// content, announce the attachment, and run `on_init`.
    ///
    /// Resolution failures (denied imports, unknown classes) fail the attach;
    /// an `on_init` failure is logged and isolated like any other hook error.
    pub async fn attach_bot(
        &self,
        channel_id: &str,
        def: BotDefinition,
    ) -> Result<AttachReceipt> {
        if !self.shared.store.channel_exists(channel_id) {
            return Err(BotError::Channel(ChannelError::ChannelNotFound {
                id: channel_id.to_string(),
            }));
        }

        let class = self.resolve_class(&def)?;
        let code_hash = def.code_hash()?;
        let manifest_hash = def.manifest_hash();

        let instance = {
            let mut attached = self
                .shared
                .instances
                .entry(channel_id.to_string())
                .or_default();
            let bot_id = format!("bot_{}_{}", def.name, attached.len());
            let instance = Arc::new(BotInstance {
                bot_id,
                def,
                class,
                state: Mutex::new(BotState {
                    value: Value::Null,
                    version: 0,
                }),
                created_at: chrono::Utc::now().to_rfc3339(),
            });
            attached.push(Arc::clone(&instance));
            instance
        };

        self.shared.store.seat_bot(channel_id, &instance.def.name)?;
        self.shared.store.register_bot(channel_id, &instance.bot_id)?;

        self.shared.store.append_system(
            channel_id,
            serde_json::json!({
                "type": "bot:attach",
                "bot_id": instance.bot_id,
                "name": instance.def.name,
                "code_hash": code_hash,
                "manifest_hash": manifest_hash,
            }),
        )?;
        if instance.def.manifest.is_some() {
            self.shared.store.append_system(
                channel_id,
                serde_json::json!({
                    "type": "bot:manifest",
                    "bot_id": instance.bot_id,
                    "manifest_excerpt": instance.def.manifest_excerpt(),
                }),
            )?;
        }

        info!(
            channel = %channel_id,
            bot = %instance.bot_id,
            code_hash = %code_hash,
            "bot attached"
        );

        self.call_hook(channel_id, &instance.bot_id, HookInvocation::Init)
            .await;

        Ok(AttachReceipt {
            bot_id: instance.bot_id.clone(),
            code_hash,
            manifest_hash,
        })
    }

    fn resolve_class(&self, def: &BotDefinition) -> Result<Arc<dyn BotClass>> {
        if let Some(code_ref) = def.code_ref.as_deref() {
            let name = code_ref.strip_prefix(BUILTIN_SCHEME).ok_or_else(|| {
                BotError::BadDefinition(format!("unsupported code_ref: {code_ref}"))
            })?;
            let name = name.rsplit('/').next().unwrap_or(name);
            return self
                .shared
                .registry
                .lookup(name)
                .ok_or_else(|| BotError::NoBotClass(format!("unknown builtin bot: {name}")));
        }

        if let Some(source) = def.inline_code.as_deref() {
            let screened = sandbox::screen_source(source, &def.name)?;
            return self
                .shared
                .registry
                .lookup(&screened.class_name)
                .ok_or_else(|| {
                    BotError::NoBotClass(format!(
                        "no executable class registered for {}",
                        screened.class_name
                    ))
                });
        }

        Err(BotError::BadDefinition(
            "bot definition requires inline_code or code_ref".to_string(),
        ))
    }

    /// Detach the instance attached under the given bot name, cleaning up its
    /// registration and workspace. Returns whether an instance was found.
    pub fn detach_bot(&self, channel_id: &str, bot_name: &str) -> bool {
        let removed = {
            let Some(mut attached) = self.shared.instances.get_mut(channel_id) else {
                return false;
            };
            match attached.iter().position(|i| i.def.name == bot_name) {
                Some(pos) => attached.remove(pos),
                None => return false,
            }
        };

        if let Err(e) = self.shared.store.unregister_bot(channel_id, &removed.bot_id) {
            warn!(channel = %channel_id, bot = %removed.bot_id, error = %e, "unregister failed");
        }

        let workspace = std::path::PathBuf::from(&self.shared.config.workspace_root)
            .join(format!("{channel_id}_{}", removed.bot_id));
        if workspace.exists() {
            if let Err(e) = std::fs::remove_dir_all(&workspace) {
                warn!(bot = %removed.bot_id, error = %e, "workspace cleanup failed");
            }
        }

        info!(channel = %channel_id, bot = %removed.bot_id, "bot detached");
        true
    }

    /// Fan a transport-originated message out to every attached bot.
    /// Per-bot failures are logged and isolated.
    pub async fn dispatch_message(&self, channel_id: &str, message: &Message) {
        for instance in self.snapshot(channel_id) {
            self.call_hook(
                channel_id,
                &instance.bot_id,
                HookInvocation::Message(Box::new(message.clone())),
            )
            .await;
        }
    }

    /// Notify every attached bot that a session joined.
    pub async fn dispatch_join(&self, channel_id: &str, session_id: &str) {
        for instance in self.snapshot(channel_id) {
            self.call_hook(
                channel_id,
                &instance.bot_id,
                HookInvocation::Join(session_id.to_string()),
            )
            .await;
        }
    }

    /// Attached-instance snapshot: taken under the map guard, iterated
    /// outside it, so re-entrant posts from hooks cannot deadlock.
    fn snapshot(&self, channel_id: &str) -> Vec<Arc<BotInstance>> {
        self.shared
            .instances
            .get(channel_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    async fn call_hook(&self, channel_id: &str, bot_id: &str, invocation: HookInvocation) {
        let Some(instance) = self.shared.find_instance(channel_id, bot_id) else {
            return;
        };

        let hook = invocation.name();
        let ctx = BotContext::new(Arc::clone(&self.shared), channel_id, bot_id, hook);
        let expired = ctx.expiry_handle();
        let class = Arc::clone(&instance.class);
        let params = instance.def.params();
        let timeout_ms = self.shared.config.hook_timeout_ms;

        let result = sandbox::run_hook(hook, timeout_ms, move || {
            let mut bot = class.instantiate(&ctx, &params)?;
            match invocation {
                HookInvocation::Init => bot.on_init(&ctx),
                HookInvocation::Join(session_id) => bot.on_join(&ctx, &session_id),
                HookInvocation::Message(msg) => bot.on_message(&ctx, &msg),
            }
        })
        .await;

        if let Err(e) = result {
            if matches!(e, BotError::HookTimeout { .. }) {
                expired.store(true, std::sync::atomic::Ordering::Release);
            }
            warn!(channel = %channel_id, bot = %bot_id, hook, error = %e, "bot hook failed");
        }
    }

    // ── State accessors ────────────────────────────────────────────────────

    pub fn get_bot_state(&self, channel_id: &str, bot_id: &str) -> Value {
        self.shared.get_bot_state(channel_id, bot_id)
    }

    pub fn set_bot_state(&self, channel_id: &str, bot_id: &str, state: Value) {
        self.shared.set_bot_state(channel_id, bot_id, state)
    }

    pub fn get_bot_state_version(&self, channel_id: &str, bot_id: &str) -> u64 {
        self.shared.get_bot_state_version(channel_id, bot_id)
    }

    /// Post under a bot identity — the Context calls through the shared
    /// interior; this is the host-facing equivalent.
    pub fn post_message_from_bot(
        &self,
        channel_id: &str,
        bot_id: &str,
        kind: MessageKind,
        body: Value,
    ) -> Result<PostReceipt> {
        self.shared
            .post_message_from_bot(channel_id, bot_id, kind, body)
    }

    // ── Listing & transparency ─────────────────────────────────────────────

    pub fn get_channel_bots(&self, channel_id: &str) -> Vec<BotOverview> {
        self.snapshot(channel_id)
            .iter()
            .map(|i| BotOverview {
                bot_id: i.bot_id.clone(),
                name: i.def.name.clone(),
                version: i.def.version.clone(),
                manifest: i.def.manifest.clone(),
                created_at: i.created_at.clone(),
                state_version: i.state.lock().expect("bot state poisoned").version,
            })
            .collect()
    }

    /// Disclosure record for any channel member: the exact content the
    /// attach-time hashes were computed over, plus those hashes.
    pub fn get_bot_code(&self, channel_id: &str, bot_id: &str) -> Result<BotCode> {
        let instance =
            self.shared
                .find_instance(channel_id, bot_id)
                .ok_or_else(|| BotError::BotNotFound {
                    id: bot_id.to_string(),
                })?;
        Ok(BotCode {
            bot_id: instance.bot_id.clone(),
            name: instance.def.name.clone(),
            version: instance.def.version.clone(),
            code_ref: instance.def.code_ref.clone(),
            inline_code: instance.def.inline_code.clone(),
            manifest: instance.def.manifest.clone(),
            code_hash: instance.def.code_hash()?,
            manifest_hash: instance.def.manifest_hash(),
        })
    }
}
