//! The typed plugin seams of the bot runtime.
//!
//! A `BotClass` is a named factory for bot objects; a `BotHooks` object lives
//! for exactly one hook invocation. Constructors must be idempotent given
//! persisted state: load state through the Context when present, initialize
//! and persist it otherwise. Holding references between invocations is not
//! possible by construction — the object is dropped when the hook returns.

use serde_json::Value;

use parley_channels::Message;

use crate::context::BotContext;
use crate::error::Result;

/// Event hooks a bot may implement. All default to no-ops; hooks run on a
/// blocking thread under the sandbox deadline and must not block forever.
#[allow(unused_variables)]
pub trait BotHooks: Send {
    /// Called once right after the bot is attached to a channel.
    fn on_init(&mut self, ctx: &BotContext) -> Result<()> {
        Ok(())
    }

    /// Called when a session binds a slot in the channel.
    fn on_join(&mut self, ctx: &BotContext, session_id: &str) -> Result<()> {
        Ok(())
    }

    /// Called for every transport-originated message in the channel.
    fn on_message(&mut self, ctx: &BotContext, msg: &Message) -> Result<()> {
        Ok(())
    }
}

/// A compiled-in bot implementation, resolvable by name from the registry.
pub trait BotClass: Send + Sync {
    /// Registry name; `builtin://<name>` code refs and screened inline
    /// classes resolve against it.
    fn name(&self) -> &'static str;

    /// Build a fresh bot object for one hook invocation.
    fn instantiate(&self, ctx: &BotContext, params: &Value) -> Result<Box<dyn BotHooks>>;
}
