use parley_channels::ChannelError;
use thiserror::Error;

/// Errors surfaced by the bot runtime.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Bot not found: {id}")]
    BotNotFound { id: String },

    #[error("Import denied: {module}")]
    ImportDenied { module: String },

    #[error("Compile error: {0}")]
    CompileError(String),

    #[error("No bot class: {0}")]
    NoBotClass(String),

    #[error("Bot hook '{hook}' exceeded {ms}ms deadline")]
    HookTimeout { hook: String, ms: u64 },

    #[error("Bad bot definition: {0}")]
    BadDefinition(String),

    #[error("Bot runtime error: {0}")]
    Internal(String),
}

impl BotError {
    /// Short error code string sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            BotError::Channel(e) => e.code(),
            BotError::BotNotFound { .. } => "BOT_NOT_FOUND",
            BotError::ImportDenied { .. } => "IMPORT_DENIED",
            BotError::CompileError(_) => "COMPILE_ERROR",
            BotError::NoBotClass(_) => "NO_BOT_CLASS",
            BotError::HookTimeout { .. } => "HOOK_TIMEOUT",
            BotError::BadDefinition(_) => "INVALID_REQUEST",
            BotError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
