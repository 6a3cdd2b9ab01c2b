//! Static configuration that cannot be changed at runtime.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Static configuration loaded once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_telegram")]
    pub telegram: TelegramConfig,

    #[serde(default = "default_auth")]
    pub auth: AuthConfig,

    #[serde(default = "default_scheduler")]
    pub scheduler: SchedulerConfig,

    #[serde(default = "default_hub")]
    pub hub: HubConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Upper bound for a single storage call before it is reported as failed
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

impl StorageConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Telegram bot transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token. Chat ingestion is disabled when unset.
    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Pause between a transport conflict and reopening the update channel
    #[serde(default = "default_reconnect_grace_secs")]
    pub reconnect_grace_secs: u64,

    #[serde(default = "default_locale")]
    pub locale: String,
}

impl TelegramConfig {
    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }
}

/// Access token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_secret")]
    pub token_secret: String,

    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    #[serde(default = "default_init_data_max_age_secs")]
    pub init_data_max_age_secs: u64,
}

impl AuthConfig {
    pub fn uses_default_secret(&self) -> bool {
        self.token_secret == DEFAULT_TOKEN_SECRET
    }
}

/// Recurring payment scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_interval_secs")]
    pub interval_secs: u64,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Live event hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Outbound queue bound per live client; overflowing it disconnects the client
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    30
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
        operation_timeout_secs: default_operation_timeout_secs(),
    }
}

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_operation_timeout_secs() -> u64 {
    5
}

pub(crate) fn default_telegram() -> TelegramConfig {
    TelegramConfig {
        bot_token: None,
        api_base_url: default_api_base_url(),
        poll_timeout_secs: default_poll_timeout_secs(),
        reconnect_grace_secs: default_reconnect_grace_secs(),
        locale: default_locale(),
    }
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_reconnect_grace_secs() -> u64 {
    5
}

fn default_locale() -> String {
    "en".to_string()
}

pub(crate) fn default_auth() -> AuthConfig {
    AuthConfig {
        token_secret: default_token_secret(),
        token_ttl_secs: default_token_ttl_secs(),
        init_data_max_age_secs: default_init_data_max_age_secs(),
    }
}

/// Placeholder secret used when none is configured. Tokens signed with it
/// can be forged by anyone who has read this file.
pub const DEFAULT_TOKEN_SECRET: &str = "change-me-in-production";

fn default_token_secret() -> String {
    DEFAULT_TOKEN_SECRET.to_string()
}

fn default_token_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_init_data_max_age_secs() -> u64 {
    24 * 60 * 60
}

pub(crate) fn default_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        interval_secs: default_scheduler_interval_secs(),
    }
}

fn default_scheduler_interval_secs() -> u64 {
    60 * 60
}

pub(crate) fn default_hub() -> HubConfig {
    HubConfig {
        client_queue_capacity: default_client_queue_capacity(),
    }
}

fn default_client_queue_capacity() -> usize {
    256
}
