//! Admin operations on a channel.
//!
//! A batch of ops is applied atomically: every op is parsed and its slot id
//! validated before the first mutation, so a bad op never leaves a channel
//! half-updated. Each applied op appends exactly one `<op_type>_applied`
//! system message carrying the op record verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{ChannelError, Result};
use crate::store::ChannelStore;
use crate::types::{bot_sender, ChannelView, MessageKind, SlotKind, SYSTEM_SENDER};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminOp {
    /// Rebind a slot to a bot: kind becomes bot, `filled_by = bot:<name>`,
    /// admin set. Code loading happens separately, as a consequence.
    SetBot { slot_id: String, bot_def: Value },
    /// Vacate a slot; bot-kind slots also lose admin.
    RemoveBot { slot_id: String },
    /// Change a slot's kind, vacating it and resetting admin to the kind's
    /// default.
    YieldSlot { slot_id: String, to: SlotKind },
    /// Replace the channel's human name.
    Rename { name: String },
    SetAdmin { slot_id: String, admin: bool },
}

impl AdminOp {
    pub fn op_type(&self) -> &'static str {
        match self {
            AdminOp::SetBot { .. } => "set_bot",
            AdminOp::RemoveBot { .. } => "remove_bot",
            AdminOp::YieldSlot { .. } => "yield_slot",
            AdminOp::Rename { .. } => "rename",
            AdminOp::SetAdmin { .. } => "set_admin",
        }
    }

    fn slot_id(&self) -> Option<&str> {
        match self {
            AdminOp::SetBot { slot_id, .. }
            | AdminOp::RemoveBot { slot_id }
            | AdminOp::YieldSlot { slot_id, .. }
            | AdminOp::SetAdmin { slot_id, .. } => Some(slot_id),
            AdminOp::Rename { .. } => None,
        }
    }

    /// True when applying this op reassigns the slot, which must drop any
    /// rejoin tokens still pointing at it.
    fn reassigns_slot(&self) -> bool {
        matches!(
            self,
            AdminOp::SetBot { .. } | AdminOp::RemoveBot { .. } | AdminOp::YieldSlot { .. }
        )
    }

    /// Parse a raw op record. Unknown `type` values yield `BAD_OP`.
    pub fn parse(raw: &Value) -> Result<AdminOp> {
        let op_type = raw
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("<missing>")
            .to_string();
        let op: AdminOp = serde_json::from_value(raw.clone())
            .map_err(|_| ChannelError::BadOp { op: op_type })?;
        if let AdminOp::SetBot { bot_def, .. } = &op {
            if bot_def.get("name").and_then(|v| v.as_str()).is_none() {
                return Err(ChannelError::Malformed(
                    "set_bot bot_def requires a name".to_string(),
                ));
            }
        }
        Ok(op)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    pub ok: bool,
    pub view: ChannelView,
}

impl ChannelStore {
    /// Apply a batch of admin ops. The caller must hold an admin-flagged
    /// slot. Raw op records are echoed into the per-op system messages.
    pub fn update_channel(
        &self,
        channel_id: &str,
        session_id: &str,
        raw_ops: &[Value],
    ) -> Result<UpdateResult> {
        let ops: Vec<AdminOp> = raw_ops
            .iter()
            .map(AdminOp::parse)
            .collect::<Result<Vec<_>>>()?;

        let handle = self.handle(channel_id)?;
        let mut reassigned_slots = Vec::new();
        {
            let mut state = handle.state.lock().expect("channel state poisoned");

            if !state.is_admin(session_id) {
                return Err(ChannelError::NotAdmin {
                    principal: session_id.to_string(),
                });
            }

            // Validate the whole batch before mutating anything.
            for op in &ops {
                if let Some(slot_id) = op.slot_id() {
                    if !state.slots.iter().any(|s| s.slot_id == slot_id) {
                        return Err(ChannelError::SlotNotFound {
                            id: slot_id.to_string(),
                        });
                    }
                }
            }

            for (op, raw) in ops.iter().zip(raw_ops) {
                match op {
                    AdminOp::SetBot { slot_id, bot_def } => {
                        let name = bot_def
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        if let Some(slot) = state.slot_mut(slot_id) {
                            slot.kind = SlotKind::Bot;
                            slot.filled_by = Some(bot_sender(&name));
                            slot.admin = true;
                        }
                    }
                    AdminOp::RemoveBot { slot_id } => {
                        if let Some(slot) = state.slot_mut(slot_id) {
                            slot.filled_by = None;
                            if slot.kind == SlotKind::Bot {
                                slot.admin = false;
                            }
                        }
                    }
                    AdminOp::YieldSlot { slot_id, to } => {
                        if let Some(slot) = state.slot_mut(slot_id) {
                            slot.kind = *to;
                            slot.filled_by = None;
                            slot.admin = to.default_admin();
                        }
                    }
                    AdminOp::Rename { name } => {
                        state.name = name.clone();
                    }
                    AdminOp::SetAdmin { slot_id, admin } => {
                        if let Some(slot) = state.slot_mut(slot_id) {
                            slot.admin = *admin;
                        }
                    }
                }

                if op.reassigns_slot() {
                    if let Some(slot_id) = op.slot_id() {
                        reassigned_slots.push(slot_id.to_string());
                    }
                }

                let body = serde_json::json!({
                    "type": format!("{}_applied", op.op_type()),
                    "op": raw,
                });
                self.append_locked(channel_id, &mut state, SYSTEM_SENDER, MessageKind::System, body);
            }
        }
        handle.notify.notify_waiters();

        for slot_id in &reassigned_slots {
            self.drop_rejoin_tokens(channel_id, slot_id);
        }

        info!(channel = %channel_id, ops = ops.len(), "admin ops applied");

        Ok(UpdateResult {
            ok: true,
            view: self.channel_view(channel_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_known_ops() {
        let op = AdminOp::parse(&json!({"type": "rename", "name": "new"})).unwrap();
        assert_eq!(op.op_type(), "rename");

        let op =
            AdminOp::parse(&json!({"type": "yield_slot", "slot_id": "s0", "to": "invite"}))
                .unwrap();
        assert_eq!(op.op_type(), "yield_slot");
    }

    #[test]
    fn parse_unknown_op_is_bad_op() {
        let err = AdminOp::parse(&json!({"type": "explode", "slot_id": "s0"})).unwrap_err();
        assert_eq!(err.code(), "BAD_OP");
    }

    #[test]
    fn parse_set_bot_requires_name() {
        let err =
            AdminOp::parse(&json!({"type": "set_bot", "slot_id": "s0", "bot_def": {}}))
                .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }
}
