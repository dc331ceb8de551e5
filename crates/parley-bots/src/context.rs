//! The capability handed to a bot for one hook invocation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use parley_channels::store::PostReceipt;
use parley_channels::types::MessageKind;

use crate::error::{BotError, Result};
use crate::manager::ManagerShared;

/// Ephemeral, re-created per hook call. Everything a bot may do — post into
/// its channel, read and replace its private state, scratch files in its
/// workspace — goes through here.
pub struct BotContext {
    pub channel_id: String,
    pub bot_id: String,
    /// Private scratch directory for this (channel, bot), created once here
    /// and removed when the bot is detached.
    pub workspace: PathBuf,
    shared: Arc<ManagerShared>,
    hook: String,
    /// Set by the runtime when this invocation overruns its deadline; from
    /// then on every effectful call is refused.
    expired: Arc<AtomicBool>,
}

impl BotContext {
    pub(crate) fn new(
        shared: Arc<ManagerShared>,
        channel_id: &str,
        bot_id: &str,
        hook: &str,
    ) -> Self {
        let workspace = PathBuf::from(&shared.config.workspace_root)
            .join(format!("{channel_id}_{bot_id}"));
        if let Err(e) = std::fs::create_dir_all(&workspace) {
            warn!(channel = %channel_id, bot = %bot_id, error = %e, "workspace creation failed");
        }
        Self {
            channel_id: channel_id.to_string(),
            bot_id: bot_id.to_string(),
            workspace,
            shared,
            hook: hook.to_string(),
            expired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn expiry_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.expired)
    }

    fn check_deadline(&self) -> Result<()> {
        if self.expired.load(Ordering::Acquire) {
            return Err(BotError::HookTimeout {
                hook: self.hook.clone(),
                ms: self.shared.config.hook_timeout_ms,
            });
        }
        Ok(())
    }

    /// Post a message into the channel under this bot's synthesized identity.
    /// The body is decorated with the bot id and current state version.
    pub fn post(&self, kind: MessageKind, body: Value) -> Result<PostReceipt> {
        self.check_deadline()?;
        self.shared
            .post_message_from_bot(&self.channel_id, &self.bot_id, kind, body)
    }

    /// Copy of this bot's private state; `Value::Null` before the first
    /// `set_state`.
    pub fn get_state(&self) -> Value {
        self.shared.get_bot_state(&self.channel_id, &self.bot_id)
    }

    /// Replace the private state, bumping the version. Must complete before
    /// the hook deadline — late writes are refused.
    pub fn set_state(&self, state: Value) -> Result<()> {
        self.check_deadline()?;
        self.shared
            .set_bot_state(&self.channel_id, &self.bot_id, state);
        Ok(())
    }

    pub fn state_version(&self) -> u64 {
        self.shared
            .get_bot_state_version(&self.channel_id, &self.bot_id)
    }
}
