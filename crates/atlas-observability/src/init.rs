// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Installs a global `tracing` subscriber writing to stderr, as text or as one
//! JSON object per event, filtered by the configured level plus per-crate
//! debug flags.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::{parse_debug_flags, CrateDebugFlags};
use atlas_config::{LogFormat, LoggingConfig};

/// `EnvFilter` directives for `config` combined with `debug_flags`
pub fn filter_directives(config: &LoggingConfig, debug_flags: &CrateDebugFlags) -> String {
    let mut flags = debug_flags.clone();
    flags.merge(CrateDebugFlags::from_crate_list(&config.debug_crates));

    let level = config.level.trim().to_ascii_lowercase();
    let base_level = match level.as_str() {
        "" => "info",
        "warning" => "warn",
        other => other,
    };
    flags.to_filter_string(base_level)
}

/// Initialize the global subscriber
///
/// # Errors
///
/// Fails if the level is not a valid filter directive or a global subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig, debug_flags: &CrateDebugFlags) -> Result<()> {
    let directives = filter_directives(config, debug_flags);
    let env_filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter '{}'", directives))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| anyhow!("Failed to install log subscriber: {}", err))?;

    tracing::debug!(
        target: "atlas-observability",
        "Logging initialized ({}, filter '{}')", config.format, directives
    );
    Ok(())
}

/// Initialize logging with default settings plus flags from the command
/// line and `ATLAS_SPLITTER_DEBUG`
pub fn init_logging_default() -> Result<()> {
    init_logging(&LoggingConfig::default(), &parse_debug_flags())
}
