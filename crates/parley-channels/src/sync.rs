//! Long-poll message delivery with watermark cursors.
//!
//! Every append signals the channel's `Notify`; any number of concurrent
//! waiters wake, re-snapshot the log, and either return new messages or go
//! back to waiting. Dropping a waiter future (transport disconnect) releases
//! it with no cleanup required.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::{ChannelError, Result};
use crate::store::ChannelStore;
use crate::types::{ChannelView, Message};

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub messages: Vec<Message>,
    pub cursor: u64,
    /// Channel composition, included exactly when the reply carries zero new
    /// messages — cheap for pollers, absent from data-bearing replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<ChannelView>,
}

impl ChannelStore {
    /// Return every message with id greater than `cursor`.
    ///
    /// With no new messages and `timeout_ms > 0`, parks on the channel's
    /// notifier until an append, the deadline, or cancellation. The returned
    /// cursor is the greatest id among the returned messages, or the input
    /// cursor unchanged when the reply is empty — it never regresses and
    /// never skips past an unseen id.
    pub async fn sync_messages(
        &self,
        channel_id: &str,
        session_id: &str,
        cursor: u64,
        timeout_ms: u64,
    ) -> Result<SyncResult> {
        let handle = self.handle(channel_id)?;
        {
            let state = handle.state.lock().expect("channel state poisoned");
            if !state.is_member(session_id) {
                return Err(ChannelError::NotMember {
                    principal: session_id.to_string(),
                });
            }
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            // Register interest before snapshotting, so an append racing with
            // the snapshot cannot be missed.
            let notified = handle.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = handle.state.lock().expect("channel state poisoned");
                let new: Vec<Message> = state
                    .messages
                    .iter()
                    .filter(|m| m.id > cursor)
                    .cloned()
                    .collect();

                if !new.is_empty() {
                    let max_id = new.iter().map(|m| m.id).max().unwrap_or(cursor);
                    return Ok(SyncResult {
                        messages: new,
                        cursor: max_id,
                        view: None,
                    });
                }

                if timeout_ms == 0 {
                    return Ok(SyncResult {
                        messages: Vec::new(),
                        cursor,
                        view: Some(state.view()),
                    });
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let state = handle.state.lock().expect("channel state poisoned");
                return Ok(SyncResult {
                    messages: Vec::new(),
                    cursor,
                    view: Some(state.view()),
                });
            }
        }
    }
}
