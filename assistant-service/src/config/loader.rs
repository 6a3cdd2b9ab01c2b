//! Configuration loading from files and environment variables.

use config::{Config, Environment, File};

use crate::error::{ServiceError, ServiceResult};

use super::static_config::StaticConfig;

/// Load static configuration from file and env vars
pub fn load_static_config() -> ServiceResult<StaticConfig> {
    let config: StaticConfig = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("ASSISTANT")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize static config: {}", e),
        })?;

    if config.hub.client_queue_capacity == 0 {
        return Err(ServiceError::Config {
            message: "hub.client_queue_capacity must be at least 1".to_string(),
        });
    }
    if config.scheduler.interval_secs == 0 {
        return Err(ServiceError::Config {
            message: "scheduler.interval_secs must be at least 1".to_string(),
        });
    }

    Ok(config)
}
