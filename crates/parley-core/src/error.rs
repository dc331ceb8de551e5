use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel not found: {id}")]
    ChannelNotFound { id: String },

    #[error("Bot not found: {id}")]
    BotNotFound { id: String },

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

    #[error("Import denied: {module}")]
    ImportDenied { module: String },

    #[error("Compile error: {0}")]
    CompileError(String),

    #[error("Bot hook '{hook}' exceeded {ms}ms deadline")]
    HookTimeout { hook: String, ms: u64 },

    #[error("No bot class: {0}")]
    NoBotClass(String),

    #[error("Missing session id")]
    NoSession,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Short error code string returned to clients in RPC error shapes.
    pub fn code(&self) -> &'static str {
        match self {
            ParleyError::Config(_) => "CONFIG_ERROR",
            ParleyError::ChannelNotFound { .. } => "CHANNEL_NOT_FOUND",
            ParleyError::BotNotFound { .. } => "BOT_NOT_FOUND",
            ParleyError::SlotNotFound { .. } => "SLOT_NOT_FOUND",
            ParleyError::NotMember { .. } => "NOT_MEMBER",
            ParleyError::NotAdmin { .. } => "NOT_ADMIN",
            ParleyError::InviteInvalid => "INVITE_INVALID",
            ParleyError::SlotAlreadyFilled => "SLOT_ALREADY_FILLED",
            ParleyError::BadOp { .. } => "BAD_OP",
            ParleyError::ImportDenied { .. } => "IMPORT_DENIED",
            ParleyError::CompileError(_) => "COMPILE_ERROR",
            ParleyError::HookTimeout { .. } => "HOOK_TIMEOUT",
            ParleyError::NoBotClass(_) => "NO_BOT_CLASS",
            ParleyError::NoSession => "NO_SESSION",
            ParleyError::InvalidRequest(_) => "INVALID_REQUEST",
            ParleyError::Serialization(_) => "INTERNAL_ERROR",
            ParleyError::Io(_) => "INTERNAL_ERROR",
            ParleyError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
