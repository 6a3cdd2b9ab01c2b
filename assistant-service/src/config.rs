//! Service configuration.
//!
//! Everything is read once at startup from an optional `config` file and
//! `ASSISTANT__*` environment variables.

mod loader;
mod static_config;

pub use loader::load_static_config;
pub use static_config::{
    AuthConfig, HubConfig, SchedulerConfig, ServerConfig, StaticConfig, StorageConfig,
    TelegramConfig,
};
