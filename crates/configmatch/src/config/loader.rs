use std::path::Path;

use crate::config::ControllerConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/controller-config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ControllerConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ControllerConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: ControllerConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &ControllerConfig) -> Result<(), ConfigError> {
    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }

    if config.requeue.base_delay_ms > config.requeue.max_delay_ms {
        return Err(ConfigError::Validation {
            message: format!(
                "requeue.base_delay_ms ({}) exceeds requeue.max_delay_ms ({})",
                config.requeue.base_delay_ms, config.requeue.max_delay_ms
            ),
        });
    }

    if let Err(e) = config
        .logging
        .filter
        .parse::<tracing_subscriber::EnvFilter>()
    {
        return Err(ConfigError::Validation {
            message: format!("Invalid logging.filter '{}': {}", config.logging.filter, e),
        });
    }

    Ok(())
}
