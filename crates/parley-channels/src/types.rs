use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChannelError;

/// Sender string used for server-emitted system messages.
pub const SYSTEM_SENDER: &str = "system";

/// Prefix marking a synthesized bot identity in sender / filled_by strings.
pub const BOT_SENDER_PREFIX: &str = "bot:";

/// Synthesized sender identity for a bot (`bot:<id or name>`).
pub fn bot_sender(id: &str) -> String {
    format!("{BOT_SENDER_PREFIX}{id}")
}

/// What kind of principal a slot seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// Seat for an attached bot; admin by default.
    Bot,
    /// Seat redeemed by a human session via a one-time invite.
    Invite,
}

impl SlotKind {
    /// Admin flag a freshly created or yielded slot of this kind carries.
    pub fn default_admin(self) -> bool {
        matches!(self, SlotKind::Bot)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SlotKind::Bot => "bot",
            SlotKind::Invite => "invite",
        }
    }
}

impl std::str::FromStr for SlotKind {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bot" => Ok(SlotKind::Bot),
            "invite" => Ok(SlotKind::Invite),
            other => Err(ChannelError::Malformed(format!("unknown slot kind '{other}'"))),
        }
    }
}

/// A participant seat inside a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    /// Stable within the channel, assigned at creation (`s0`, `s1`, …).
    pub slot_id: String,
    pub kind: SlotKind,
    pub label: String,
    /// Session id, or `bot:<name>` for bot-bound slots. None while vacant.
    pub filled_by: Option<String>,
    pub admin: bool,
}

/// Parse a `"kind:label"` slot spec. The label defaults to `<kind>_<index>`
/// when omitted, mirroring how channels are usually created from the CLI.
pub fn parse_slot_spec(spec: &str, index: usize) -> Result<(SlotKind, String), ChannelError> {
    let (kind_str, label) = match spec.split_once(':') {
        Some((k, l)) if !l.is_empty() => (k, l.to_string()),
        Some((k, _)) => (k, format!("{k}_{index}")),
        None => (spec, format!("{spec}_{index}")),
    };
    let kind: SlotKind = kind_str.parse()?;
    Ok((kind, label))
}

/// Message category on the channel log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Bot,
    System,
    Control,
}

impl std::str::FromStr for MessageKind {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageKind::User),
            "bot" => Ok(MessageKind::Bot),
            "system" => Ok(MessageKind::System),
            "control" => Ok(MessageKind::Control),
            other => Err(ChannelError::Malformed(format!(
                "unknown message kind '{other}'"
            ))),
        }
    }
}

/// One immutable entry on a channel's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Strictly monotonic within the channel; never reused.
    pub id: u64,
    pub channel_id: String,
    /// Session id, `bot:<bot_id>`, or `system`.
    pub sender: String,
    pub kind: MessageKind,
    /// Schemaless structured payload.
    pub body: Value,
    /// RFC 3339 timestamp assigned at append time.
    pub ts: String,
}

/// Channel composition as shown to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelView {
    pub channel_id: String,
    pub name: String,
    pub slots: Vec<Slot>,
    pub created_at: String,
}

/// Minimal bot description used for the `bots_announced` system message and
/// for binding declared bots to bot-kind slots at channel creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSpec {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub summary: String,
}
