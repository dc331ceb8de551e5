//! Minimal builtin: echoes user text back into the channel.

use serde_json::{json, Value};

use parley_channels::types::{Message, MessageKind};

use crate::context::BotContext;
use crate::error::Result;
use crate::traits::{BotClass, BotHooks};

pub struct EchoBotClass;

impl BotClass for EchoBotClass {
    fn name(&self) -> &'static str {
        "EchoBot"
    }

    fn instantiate(&self, _ctx: &BotContext, _params: &Value) -> Result<Box<dyn BotHooks>> {
        Ok(Box::new(EchoBot))
    }
}

struct EchoBot;

impl BotHooks for EchoBot {
    fn on_init(&mut self, ctx: &BotContext) -> Result<()> {
        ctx.post(MessageKind::Bot, json!({"type": "ready"}))?;
        Ok(())
    }

    fn on_message(&mut self, ctx: &BotContext, msg: &Message) -> Result<()> {
        if msg.kind != MessageKind::User {
            return Ok(());
        }
        if let Some(text) = msg.body.get("text").and_then(|t| t.as_str()) {
            ctx.post(MessageKind::Bot, json!({"type": "echo", "text": text}))?;
        }
        Ok(())
    }
}
