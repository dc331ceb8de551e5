//! In-memory channel records: slots, message logs, invites, rejoin tokens.
//!
//! The store is shared process-wide behind an `Arc`. The channel table is a
//! `DashMap` keyed by channel id; each channel's mutable state sits behind its
//! own `Mutex`, with a `Notify` beside it so long-pollers wake on appends.
//! The small global tables (invites, rejoin tokens) use plain mutexes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info};

use parley_core::id;

use crate::error::{ChannelError, Result};
use crate::types::{
    bot_sender, parse_slot_spec, BotSpec, ChannelView, Message, MessageKind, Slot, SlotKind,
    BOT_SENDER_PREFIX, SYSTEM_SENDER,
};

pub(crate) struct ChannelState {
    pub(crate) channel_id: String,
    pub(crate) name: String,
    pub(crate) slots: Vec<Slot>,
    pub(crate) messages: Vec<Message>,
    /// Ids of bots currently attached, maintained by the bot runtime through
    /// `register_bot` / `unregister_bot`. Drives the bot-sender member check.
    pub(crate) bots: Vec<String>,
    pub(crate) created_at: String,
}

impl ChannelState {
    pub(crate) fn view(&self) -> ChannelView {
        ChannelView {
            channel_id: self.channel_id.clone(),
            name: self.name.clone(),
            slots: self.slots.clone(),
            created_at: self.created_at.clone(),
        }
    }

    pub(crate) fn is_member(&self, principal: &str) -> bool {
        if let Some(bot_id) = principal.strip_prefix(BOT_SENDER_PREFIX) {
            return self.bots.iter().any(|b| b == bot_id);
        }
        self.slots
            .iter()
            .any(|s| s.filled_by.as_deref() == Some(principal))
    }

    pub(crate) fn is_admin(&self, principal: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.admin && s.filled_by.as_deref() == Some(principal))
    }

    pub(crate) fn slot_mut(&mut self, slot_id: &str) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.slot_id == slot_id)
    }
}

pub(crate) struct ChannelHandle {
    pub(crate) state: Mutex<ChannelState>,
    pub(crate) notify: Notify,
}

#[derive(Debug, Clone)]
struct InviteRecord {
    channel_id: String,
    slot_id: String,
    /// Session that consumed the code. Re-presenting the code is idempotent
    /// for that session only.
    consumed_by: Option<String>,
}

#[derive(Debug, Clone)]
struct RejoinRecord {
    channel_id: String,
    slot_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostReceipt {
    pub msg_id: u64,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateChannelResult {
    pub channel_id: String,
    pub invites: Vec<String>,
    pub view: ChannelView,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinResult {
    pub channel_id: String,
    pub slot_id: String,
    pub rejoin_token: String,
    pub view: ChannelView,
}

/// Debug listing entry for one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub channel_id: String,
    pub name: String,
    pub slots: Vec<Slot>,
    pub message_count: usize,
    pub bots: Vec<String>,
}

/// Process-wide channel engine.
pub struct ChannelStore {
    channels: DashMap<String, Arc<ChannelHandle>>,
    invites: Mutex<HashMap<String, InviteRecord>>,
    rejoin_tokens: Mutex<HashMap<String, RejoinRecord>>,
    msg_seq: AtomicU64,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            invites: Mutex::new(HashMap::new()),
            rejoin_tokens: Mutex::new(HashMap::new()),
            msg_seq: AtomicU64::new(0),
        }
    }

    pub(crate) fn handle(&self, channel_id: &str) -> Result<Arc<ChannelHandle>> {
        self.channels
            .get(channel_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ChannelError::ChannelNotFound {
                id: channel_id.to_string(),
            })
    }

    pub(crate) fn next_message_id(&self) -> u64 {
        self.msg_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Create a channel from `"kind:label"` slot specs.
    ///
    /// Invite-kind slots each get a freshly minted one-time code. Bot-kind
    /// slots are pre-bound to a declared bot when its name matches the slot
    /// label; otherwise they stay vacant until a bot is attached. When any
    /// bots are declared a single `bots_announced` system message opens the
    /// log.
    pub fn create_channel(
        &self,
        name: &str,
        slot_specs: &[String],
        bots: &[BotSpec],
    ) -> Result<CreateChannelResult> {
        let channel_id = id::mint(id::CHANNEL_PREFIX);

        let mut slots = Vec::with_capacity(slot_specs.len());
        let mut invite_codes = Vec::new();
        let mut invite_records = Vec::new();

        for (i, spec) in slot_specs.iter().enumerate() {
            let (kind, label) = parse_slot_spec(spec, i)?;
            let slot_id = format!("s{i}");

            let filled_by = match kind {
                SlotKind::Bot => bots
                    .iter()
                    .find(|b| b.name == label)
                    .map(|b| bot_sender(&b.name)),
                SlotKind::Invite => {
                    let code = id::mint(id::INVITE_PREFIX);
                    invite_codes.push(code.clone());
                    invite_records.push((
                        code,
                        InviteRecord {
                            channel_id: channel_id.clone(),
                            slot_id: slot_id.clone(),
                            consumed_by: None,
                        },
                    ));
                    None
                }
            };

            slots.push(Slot {
                slot_id,
                kind,
                label,
                filled_by,
                admin: kind.default_admin(),
            });
        }

        let state = ChannelState {
            channel_id: channel_id.clone(),
            name: name.to_string(),
            slots,
            messages: Vec::new(),
            bots: Vec::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let handle = Arc::new(ChannelHandle {
            state: Mutex::new(state),
            notify: Notify::new(),
        });
        self.channels.insert(channel_id.clone(), handle);

        {
            let mut table = self.invites.lock().expect("invite table poisoned");
            table.extend(invite_records);
        }

        if !bots.is_empty() {
            self.append_system(
                &channel_id,
                serde_json::json!({
                    "type": "bots_announced",
                    "bots": bots.iter().map(|b| serde_json::json!({
                        "name": b.name,
                        "version": b.version,
                        "summary": b.summary,
                    })).collect::<Vec<_>>(),
                }),
            )?;
        }

        info!(channel = %channel_id, name, slots = slot_specs.len(), "channel created");

        let view = self.channel_view(&channel_id)?;
        Ok(CreateChannelResult {
            channel_id,
            invites: invite_codes,
            view,
        })
    }

    /// Bind a session to a slot using an invite code or a rejoin token.
    ///
    /// Invites are single-use: the first successful bind records the consuming
    /// session, and only that session may re-present the code (idempotently).
    /// Rejoin tokens re-bind their slot to the presenting session and stay
    /// valid until the slot is reassigned. Every successful join mints a fresh
    /// rejoin token.
    pub fn join_channel(&self, credential: &str, session_id: &str) -> Result<JoinResult> {
        if credential.starts_with(&format!("{}_", id::REJOIN_PREFIX)) {
            self.join_via_rejoin(credential, session_id)
        } else if credential.starts_with(&format!("{}_", id::INVITE_PREFIX)) {
            self.join_via_invite(credential, session_id)
        } else {
            Err(ChannelError::InviteInvalid)
        }
    }

    fn join_via_invite(&self, code: &str, session_id: &str) -> Result<JoinResult> {
        let record = {
            let table = self.invites.lock().expect("invite table poisoned");
            table.get(code).cloned().ok_or(ChannelError::InviteInvalid)?
        };

        if let Some(ref consumer) = record.consumed_by {
            if consumer != session_id {
                return Err(ChannelError::InviteInvalid);
            }
        }

        let handle = self.handle(&record.channel_id)?;
        {
            let mut state = handle.state.lock().expect("channel state poisoned");
            let slot = state.slot_mut(&record.slot_id).ok_or_else(|| {
                ChannelError::SlotNotFound {
                    id: record.slot_id.clone(),
                }
            })?;

            match slot.filled_by.as_deref() {
                None => slot.filled_by = Some(session_id.to_string()),
                Some(holder) if holder == session_id => {} // idempotent rebind
                Some(_) => return Err(ChannelError::SlotAlreadyFilled),
            }
        }

        {
            let mut table = self.invites.lock().expect("invite table poisoned");
            if let Some(entry) = table.get_mut(code) {
                entry.consumed_by = Some(session_id.to_string());
            }
        }

        debug!(channel = %record.channel_id, slot = %record.slot_id, "invite redeemed");
        self.finish_join(&record.channel_id, &record.slot_id)
    }

    fn join_via_rejoin(&self, token: &str, session_id: &str) -> Result<JoinResult> {
        let record = {
            let table = self.rejoin_tokens.lock().expect("rejoin table poisoned");
            table
                .get(token)
                .cloned()
                .ok_or(ChannelError::InviteInvalid)?
        };

        let handle = self.handle(&record.channel_id)?;
        {
            let mut state = handle.state.lock().expect("channel state poisoned");
            let slot = state.slot_mut(&record.slot_id).ok_or_else(|| {
                ChannelError::SlotNotFound {
                    id: record.slot_id.clone(),
                }
            })?;
            // The token is the credential; it re-binds the slot to whoever
            // presents it, covering reconnects under a fresh session id.
            slot.filled_by = Some(session_id.to_string());
        }

        debug!(channel = %record.channel_id, slot = %record.slot_id, "rejoin token redeemed");
        self.finish_join(&record.channel_id, &record.slot_id)
    }

    fn finish_join(&self, channel_id: &str, slot_id: &str) -> Result<JoinResult> {
        let token = id::mint(id::REJOIN_PREFIX);
        {
            let mut table = self.rejoin_tokens.lock().expect("rejoin table poisoned");
            table.insert(
                token.clone(),
                RejoinRecord {
                    channel_id: channel_id.to_string(),
                    slot_id: slot_id.to_string(),
                },
            );
        }
        Ok(JoinResult {
            channel_id: channel_id.to_string(),
            slot_id: slot_id.to_string(),
            rejoin_token: token,
            view: self.channel_view(channel_id)?,
        })
    }

    /// Invalidate every rejoin token pointing at the given slot. Called when
    /// an admin op reassigns the slot.
    pub(crate) fn drop_rejoin_tokens(&self, channel_id: &str, slot_id: &str) {
        let mut table = self.rejoin_tokens.lock().expect("rejoin table poisoned");
        table.retain(|_, r| !(r.channel_id == channel_id && r.slot_id == slot_id));
    }

    /// Append a message from a member principal (session or attached bot).
    pub fn post_message(
        &self,
        channel_id: &str,
        sender: &str,
        kind: MessageKind,
        body: Value,
    ) -> Result<PostReceipt> {
        let handle = self.handle(channel_id)?;
        let receipt = {
            let mut state = handle.state.lock().expect("channel state poisoned");
            if !state.is_member(sender) {
                return Err(ChannelError::NotMember {
                    principal: sender.to_string(),
                });
            }
            self.append_locked(channel_id, &mut state, sender, kind, body)
        };
        handle.notify.notify_waiters();
        Ok(receipt)
    }

    /// Internal entry point for server-emitted system messages. Not exposed
    /// on the transport; bypasses the member check.
    pub fn append_system(&self, channel_id: &str, body: Value) -> Result<PostReceipt> {
        let handle = self.handle(channel_id)?;
        let receipt = {
            let mut state = handle.state.lock().expect("channel state poisoned");
            self.append_locked(
                channel_id,
                &mut state,
                SYSTEM_SENDER,
                MessageKind::System,
                body,
            )
        };
        handle.notify.notify_waiters();
        Ok(receipt)
    }

    pub(crate) fn append_locked(
        &self,
        channel_id: &str,
        state: &mut ChannelState,
        sender: &str,
        kind: MessageKind,
        body: Value,
    ) -> PostReceipt {
        let msg_id = self.next_message_id();
        let ts = chrono::Utc::now().to_rfc3339();
        state.messages.push(Message {
            id: msg_id,
            channel_id: channel_id.to_string(),
            sender: sender.to_string(),
            kind,
            body,
            ts: ts.clone(),
        });
        PostReceipt { msg_id, ts }
    }

    // ── Bot attachment bookkeeping ─────────────────────────────────────────

    /// Record an attached bot id so `bot:<id>` senders pass the member check.
    pub fn register_bot(&self, channel_id: &str, bot_id: &str) -> Result<()> {
        let handle = self.handle(channel_id)?;
        let mut state = handle.state.lock().expect("channel state poisoned");
        if !state.bots.iter().any(|b| b == bot_id) {
            state.bots.push(bot_id.to_string());
        }
        Ok(())
    }

    pub fn unregister_bot(&self, channel_id: &str, bot_id: &str) -> Result<()> {
        let handle = self.handle(channel_id)?;
        let mut state = handle.state.lock().expect("channel state poisoned");
        state.bots.retain(|b| b != bot_id);
        Ok(())
    }

    /// Bind an attached bot into a seat: the first bot-kind slot that is
    /// vacant or already reserved for this bot name. Appends a new bot slot
    /// when none qualifies. Returns the slot id used.
    pub fn seat_bot(&self, channel_id: &str, bot_name: &str) -> Result<String> {
        let identity = bot_sender(bot_name);
        let handle = self.handle(channel_id)?;
        let mut state = handle.state.lock().expect("channel state poisoned");

        if let Some(slot) = state.slots.iter_mut().find(|s| {
            s.kind == SlotKind::Bot
                && (s.filled_by.is_none() || s.filled_by.as_deref() == Some(identity.as_str()))
        }) {
            slot.filled_by = Some(identity);
            slot.admin = true;
            return Ok(slot.slot_id.clone());
        }

        let slot_id = format!("s{}", state.slots.len());
        state.slots.push(Slot {
            slot_id: slot_id.clone(),
            kind: SlotKind::Bot,
            label: identity.clone(),
            filled_by: Some(identity),
            admin: true,
        });
        Ok(slot_id)
    }

    // ── Read accessors ─────────────────────────────────────────────────────

    pub fn channel_view(&self, channel_id: &str) -> Result<ChannelView> {
        let handle = self.handle(channel_id)?;
        let state = handle.state.lock().expect("channel state poisoned");
        Ok(state.view())
    }

    pub fn is_member(&self, channel_id: &str, principal: &str) -> Result<bool> {
        let handle = self.handle(channel_id)?;
        let state = handle.state.lock().expect("channel state poisoned");
        Ok(state.is_member(principal))
    }

    pub fn is_admin(&self, channel_id: &str, principal: &str) -> Result<bool> {
        let handle = self.handle(channel_id)?;
        let state = handle.state.lock().expect("channel state poisoned");
        Ok(state.is_admin(principal))
    }

    /// Current occupant of a slot, if any.
    pub fn slot_occupant(&self, channel_id: &str, slot_id: &str) -> Result<Option<String>> {
        let handle = self.handle(channel_id)?;
        let state = handle.state.lock().expect("channel state poisoned");
        state
            .slots
            .iter()
            .find(|s| s.slot_id == slot_id)
            .map(|s| s.filled_by.clone())
            .ok_or_else(|| ChannelError::SlotNotFound {
                id: slot_id.to_string(),
            })
    }

    pub fn channel_exists(&self, channel_id: &str) -> bool {
        self.channels.contains_key(channel_id)
    }

    /// Debug listing of every channel. Sorted by id for deterministic output.
    pub fn list_channels(&self) -> Vec<ChannelSummary> {
        let mut result: Vec<ChannelSummary> = self
            .channels
            .iter()
            .map(|entry| {
                let state = entry.value().state.lock().expect("channel state poisoned");
                ChannelSummary {
                    channel_id: state.channel_id.clone(),
                    name: state.name.clone(),
                    slots: state.slots.clone(),
                    message_count: state.messages.len(),
                    bots: state.bots.clone(),
                }
            })
            .collect();
        result.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        result
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}
