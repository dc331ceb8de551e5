//! Bot definitions: the content-addressed source material for an attachment.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use parley_core::hash;

use crate::error::{BotError, Result};

/// Scheme prefix resolving a code reference against the builtin registry.
pub const BUILTIN_SCHEME: &str = "builtin://";

/// Source material for a bot: exactly one of inline code or a code reference,
/// plus an optional manifest. Identity is `(code_hash, manifest_hash)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotDefinition {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Value>,
    /// Secret-bearing overlay, already redacted by the caller. Never hashed,
    /// never echoed back through `get_bot_code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_redacted: Option<HashMap<String, String>>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl BotDefinition {
    /// The hashable code content: inline source text, or the reference string.
    pub fn code_content(&self) -> Result<&str> {
        if let Some(code) = self.inline_code.as_deref() {
            return Ok(code);
        }
        if let Some(code_ref) = self.code_ref.as_deref() {
            return Ok(code_ref);
        }
        Err(BotError::BadDefinition(
            "bot definition requires inline_code or code_ref".to_string(),
        ))
    }

    pub fn code_hash(&self) -> Result<String> {
        Ok(hash::code_hash(self.code_content()?))
    }

    /// Manifest hash over canonical JSON; an absent manifest hashes as `{}`.
    pub fn manifest_hash(&self) -> String {
        let empty = Value::Object(Default::default());
        hash::manifest_hash(self.manifest.as_ref().unwrap_or(&empty))
    }

    /// Free-form params handed to the bot constructor.
    pub fn params(&self) -> Value {
        self.manifest
            .as_ref()
            .and_then(|m| m.get("params"))
            .cloned()
            .unwrap_or(Value::Object(Default::default()))
    }

    /// The declared excerpt posted in the `bot:manifest` system message.
    pub fn manifest_excerpt(&self) -> Value {
        let manifest = self.manifest.as_ref();
        let pick = |key: &str| {
            manifest
                .and_then(|m| m.get(key))
                .cloned()
                .unwrap_or(Value::Array(Vec::new()))
        };
        serde_json::json!({
            "name": self.name,
            "version": self.version,
            "summary": manifest
                .and_then(|m| m.get("summary"))
                .and_then(|s| s.as_str())
                .unwrap_or(""),
            "hooks": pick("hooks"),
            "emits": pick("emits"),
        })
    }
}
