// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Settings are layered in three tiers:
//! 1. TOML file (base values, every field optional)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)
//!
//! The merged result is validated before it is returned.

use crate::validation::validate_config;
use crate::{AtlasSplitterConfig, ConfigError, ConfigResult};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "atlas_splitter.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "ATLAS_SPLITTER_CONFIG_PATH";

/// Find the atlas splitter configuration file
///
/// Search order:
/// 1. `ATLAS_SPLITTER_CONFIG_PATH` environment variable
/// 2. Current working directory: `./atlas_splitter.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        search_paths.extend(
            cwd.ancestors()
                .skip(1)
                .take(5)
                .map(|dir| dir.join(CONFIG_FILE_NAME)),
        );
    }

    if let Some(found) = search_paths.iter().find(|path| path.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for
///   and built-in defaults are used when none exists.
/// * `cli_args` - Optional CLI argument overrides keyed by dotted field name
///
/// # Errors
///
/// Returns error if an explicit file is missing, contains invalid TOML, or the
/// merged configuration fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<AtlasSplitterConfig> {
    let mut config = match config_path {
        Some(path) => load_config_from_str(&fs::read_to_string(path)?)?,
        None => match find_config_file() {
            Ok(path) => load_config_from_str(&fs::read_to_string(path)?)?,
            // An explicitly named file that is missing stays an error
            Err(err) if env::var(CONFIG_PATH_ENV).is_ok() => return Err(err),
            Err(_) => AtlasSplitterConfig::default(),
        },
    };

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    validate_config(&config)?;
    Ok(config)
}

/// Parse configuration TOML without applying overrides
pub fn load_config_from_str(content: &str) -> ConfigResult<AtlasSplitterConfig> {
    Ok(toml::from_str(content)?)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `ATLAS_SPLITTER_ID_STRATEGY` -> `ids.strategy`
/// - `ATLAS_SPLITTER_MIN_ID` -> `ids.min_id`
/// - `ATLAS_SPLITTER_MAX_ID` -> `ids.max_id`
/// - `ATLAS_SPLITTER_PARALLEL` -> `splitting.parallel`
/// - `ATLAS_SPLITTER_UNDEFINED_VOXELS` -> `splitting.undefined_voxels`
/// - `ATLAS_SPLITTER_LOG_LEVEL` -> `logging.level`
///
/// Values that fail to parse leave the field unchanged and are logged as
/// warnings.
pub fn apply_environment_overrides(config: &mut AtlasSplitterConfig) {
    apply_overrides_with(config, |key| env::var(key).ok());
}

/// Apply environment-style overrides from an arbitrary lookup
///
/// Returns the variables whose values were rejected.
pub fn apply_overrides_with<F>(config: &mut AtlasSplitterConfig, lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    let mut rejected = Vec::new();
    let read = |key: &'static str| lookup(key).map(|value| (key, value));

    if let Some(strategy) = read("ATLAS_SPLITTER_ID_STRATEGY")
        .and_then(|kv| parse_override(kv, |v| v.parse().ok(), &mut rejected))
    {
        config.ids.strategy = strategy;
    }
    if let Some(min_id) = read("ATLAS_SPLITTER_MIN_ID")
        .and_then(|kv| parse_override(kv, |v| v.parse().ok(), &mut rejected))
    {
        config.ids.min_id = min_id;
    }
    if let Some(max_id) = read("ATLAS_SPLITTER_MAX_ID")
        .and_then(|kv| parse_override(kv, |v| v.parse().ok(), &mut rejected))
    {
        config.ids.max_id = max_id;
    }
    if let Some(parallel) = read("ATLAS_SPLITTER_PARALLEL")
        .and_then(|kv| parse_override(kv, parse_bool, &mut rejected))
    {
        config.splitting.parallel = parallel;
    }
    if let Some(policy) = read("ATLAS_SPLITTER_UNDEFINED_VOXELS")
        .and_then(|kv| parse_override(kv, |v| v.parse().ok(), &mut rejected))
    {
        config.splitting.undefined_voxels = policy;
    }
    let non_empty = |v: &str| Some(v.trim()).filter(|v| !v.is_empty()).map(str::to_string);
    if let Some(level) = read("ATLAS_SPLITTER_LOG_LEVEL")
        .and_then(|kv| parse_override(kv, non_empty, &mut rejected))
    {
        config.logging.level = level;
    }
    rejected
}

/// Parse one environment value, warning and recording the variable when it is rejected
fn parse_override<T>(
    (key, value): (&'static str, String),
    parse: impl Fn(&str) -> Option<T>,
    rejected: &mut Vec<&'static str>,
) -> Option<T> {
    let parsed = parse(&value);
    if parsed.is_none() {
        warn!(target: "atlas-config", "Ignoring {}={:?}: not a valid value", key, value);
        rejected.push(key);
    }
    parsed
}

/// Apply CLI argument overrides to configuration
///
/// Keys are dotted field paths, e.g. `ids.strategy` or `splitting.parallel`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for an unknown key or an unparsable value
pub fn apply_cli_overrides(
    config: &mut AtlasSplitterConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    for (key, value) in cli_args {
        let invalid = || ConfigError::InvalidValue(format!("{} = {}", key, value));
        match key.as_str() {
            "ids.strategy" => config.ids.strategy = value.parse().map_err(|_| invalid())?,
            "ids.min_id" => config.ids.min_id = value.parse().map_err(|_| invalid())?,
            "ids.max_id" => config.ids.max_id = value.parse().map_err(|_| invalid())?,
            "splitting.parallel" => {
                config.splitting.parallel = parse_bool(value).ok_or_else(invalid)?
            }
            "splitting.min_parallel_voxels" => {
                config.splitting.min_parallel_voxels = value.parse().map_err(|_| invalid())?
            }
            "splitting.undefined_voxels" => {
                config.splitting.undefined_voxels = value.parse().map_err(|_| invalid())?
            }
            "splitting.check_after_each_rule" => {
                config.splitting.check_after_each_rule = parse_bool(value).ok_or_else(invalid)?
            }
            "logging.level" => config.logging.level = value.clone(),
            "logging.format" => config.logging.format = value.parse().map_err(|_| invalid())?,
            _ => {
                return Err(ConfigError::InvalidValue(format!(
                    "unknown configuration key '{}'",
                    key
                )))
            }
        }
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
