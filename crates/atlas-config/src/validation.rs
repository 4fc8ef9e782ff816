// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Every problem is collected before reporting, so a single run lists all of
//! them.

use crate::{AtlasSplitterConfig, ConfigError, ConfigResult, IdStrategy};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error", "off"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Id range [{min_id}, {max_id}] is empty")]
    EmptyIdRange { min_id: u32, max_id: u32 },

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every failed check
pub fn validate_config(config: &AtlasSplitterConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_ids(config, &mut errors);
    validate_splitting(config, &mut errors);
    validate_logging(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_ids(config: &AtlasSplitterConfig, errors: &mut Vec<ConfigValidationError>) {
    let ids = &config.ids;
    if ids.min_id > ids.max_id {
        errors.push(ConfigValidationError::EmptyIdRange {
            min_id: ids.min_id,
            max_id: ids.max_id,
        });
    }

    match ids.strategy {
        IdStrategy::Sequential => {}
        IdStrategy::ReservedRange => {
            if ids.min_id == 0 {
                errors.push(ConfigValidationError::InvalidValue {
                    field: "ids.min_id".to_string(),
                    reason: "0 is the background label".to_string(),
                });
            }
        }
        IdStrategy::AcronymHash => {
            if ids.min_id == 0 {
                errors.push(ConfigValidationError::InvalidValue {
                    field: "ids.min_id".to_string(),
                    reason: "0 is the background label".to_string(),
                });
            }
            if ids.min_id == ids.max_id {
                errors.push(ConfigValidationError::InvalidValue {
                    field: "ids.max_id".to_string(),
                    reason: "acronym hashing needs max_id > min_id".to_string(),
                });
            }
        }
    }
}

fn validate_splitting(config: &AtlasSplitterConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.splitting.min_parallel_voxels == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "splitting.min_parallel_voxels".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
}

fn validate_logging(config: &AtlasSplitterConfig, errors: &mut Vec<ConfigValidationError>) {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("'{}' is not one of {:?}", config.logging.level, LOG_LEVELS),
        });
    }
    for name in &config.logging.debug_crates {
        if name.trim().is_empty() {
            errors.push(ConfigValidationError::InvalidValue {
                field: "logging.debug_crates".to_string(),
                reason: "empty crate name".to_string(),
            });
        }
    }
}
