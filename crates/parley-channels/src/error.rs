use thiserror::Error;

/// Errors surfaced by the channel engine.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not found: {id}")]
    ChannelNotFound { id: String },

    #[error("Slot not found: {id}")]
    SlotNotFound { id: String },

    #[error("Not a channel member: {principal}")]
    NotMember { principal: String },

    #[error("Not a channel admin: {principal}")]
    NotAdmin { principal: String },

    #[error("Invite invalid or already consumed")]
    InviteInvalid,

    #[error("Slot already filled by another session")]
    SlotAlreadyFilled,

    #[error("Unknown admin op: {op}")]
    BadOp { op: String },

    #[error("Malformed request: {0}")]
    Malformed(String),
}

impl ChannelError {
    /// Short error code string sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::ChannelNotFound { .. } => "CHANNEL_NOT_FOUND",
            ChannelError::SlotNotFound { .. } => "SLOT_NOT_FOUND",
            ChannelError::NotMember { .. } => "NOT_MEMBER",
            ChannelError::NotAdmin { .. } => "NOT_ADMIN",
            ChannelError::InviteInvalid => "INVITE_INVALID",
            ChannelError::SlotAlreadyFilled => "SLOT_ALREADY_FILLED",
            ChannelError::BadOp { .. } => "BAD_OP",
            ChannelError::Malformed(_) => "INVALID_REQUEST",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
