// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `atlas_splitter.toml`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lower bound of the acronym-hash id range
pub const MIN_CUSTOM_ID: u32 = 20_000;
/// Upper bound of the acronym-hash id range
pub const MAX_CUSTOM_ID: u32 = 30_000;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AtlasSplitterConfig {
    pub ids: IdAllocationConfig,
    pub splitting: SplittingConfig,
    pub logging: LoggingConfig,
}

/// How new region ids are chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Smallest id above everything in use
    #[default]
    Sequential,
    /// Smallest free id inside `[min_id, max_id]`
    ReservedRange,
    /// Derived from the sha256 digest of the new region's acronym
    AcronymHash,
}

impl FromStr for IdStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "reserved_range" | "range" => Ok(Self::ReservedRange),
            "acronym_hash" | "hash" => Ok(Self::AcronymHash),
            other => Err(format!("unknown id strategy '{}'", other)),
        }
    }
}

/// Id allocation configuration (`[ids]`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IdAllocationConfig {
    pub strategy: IdStrategy,
    pub min_id: u32,
    pub max_id: u32,
}

impl Default for IdAllocationConfig {
    fn default() -> Self {
        Self {
            strategy: IdStrategy::Sequential,
            min_id: 0,
            max_id: u32::MAX,
        }
    }
}

impl IdAllocationConfig {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn reserved_range(min_id: u32, max_id: u32) -> Self {
        Self {
            strategy: IdStrategy::ReservedRange,
            min_id,
            max_id,
        }
    }

    /// Acronym-hash ids in `[MIN_CUSTOM_ID, MAX_CUSTOM_ID)`
    pub fn acronym_hash() -> Self {
        Self {
            strategy: IdStrategy::AcronymHash,
            min_id: MIN_CUSTOM_ID,
            max_id: MAX_CUSTOM_ID,
        }
    }
}

/// What to do with voxels whose criterion input is undefined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedVoxelPolicy {
    /// Assign them to the rule's default target
    #[default]
    DefaultTarget,
    /// Abort the rule
    Reject,
}

impl FromStr for UndefinedVoxelPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "default_target" | "default" => Ok(Self::DefaultTarget),
            "reject" | "error" => Ok(Self::Reject),
            other => Err(format!("unknown undefined-voxel policy '{}'", other)),
        }
    }
}

/// Splitting engine configuration (`[splitting]`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SplittingConfig {
    /// Classify voxels on the rayon pool
    pub parallel: bool,
    /// Selections smaller than this are classified sequentially
    pub min_parallel_voxels: usize,
    pub undefined_voxels: UndefinedVoxelPolicy,
    /// Run the consistency checker after every rule
    pub check_after_each_rule: bool,
}

impl Default for SplittingConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            min_parallel_voxels: 4096,
            undefined_voxels: UndefinedVoxelPolicy::DefaultTarget,
            check_after_each_rule: true,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration (`[logging]`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
    /// Crates logged at debug level regardless of `level`
    pub debug_crates: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            debug_crates: Vec::new(),
        }
    }
}
