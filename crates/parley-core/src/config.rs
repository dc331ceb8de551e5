use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Protocol constants — clients depend on these defaults
pub const DEFAULT_PORT: u16 = 9201;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const HOOK_TIMEOUT_MS: u64 = 5_000; // wall-clock deadline per bot hook
pub const SYNC_DEFAULT_TIMEOUT_MS: u64 = 25_000; // long-poll wait when caller omits timeout_ms
pub const SYNC_MAX_TIMEOUT_MS: u64 = 60_000; // hard cap on caller-supplied timeout_ms

/// Top-level config (parley.toml + PARLEY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            sandbox: SandboxConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Bot execution limits and workspace placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Wall-clock deadline for a single hook invocation, in milliseconds.
    #[serde(default = "default_hook_timeout_ms")]
    pub hook_timeout_ms: u64,
    /// Root directory for per-(channel, bot) workspace directories.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            hook_timeout_ms: HOOK_TIMEOUT_MS,
            workspace_root: default_workspace_root(),
        }
    }
}

/// Long-poll timing for sync_messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_sync_max_timeout_ms")]
    pub max_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: SYNC_DEFAULT_TIMEOUT_MS,
            max_timeout_ms: SYNC_MAX_TIMEOUT_MS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_hook_timeout_ms() -> u64 {
    HOOK_TIMEOUT_MS
}
fn default_sync_timeout_ms() -> u64 {
    SYNC_DEFAULT_TIMEOUT_MS
}
fn default_sync_max_timeout_ms() -> u64 {
    SYNC_MAX_TIMEOUT_MS
}
fn default_workspace_root() -> String {
    std::env::temp_dir()
        .join("parley-workspaces")
        .to_string_lossy()
        .into_owned()
}

impl ParleyConfig {
    /// Load config from a TOML file with PARLEY_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ./parley.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("parley.toml");

        let config: ParleyConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PARLEY_").split("_"))
            .extract()
            .map_err(|e| crate::error::ParleyError::Config(e.to_string()))?;

        Ok(config)
    }
}
