// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # atlas-observability
//!
//! Logging setup shared by the atlas splitting crates.
//!
//! Every crate logs through `tracing` with its crate name as target, so debug
//! output can be switched on per crate (`--debug-atlas-splitting`,
//! `ATLAS_SPLITTER_DEBUG=atlas-splitting` or `logging.debug_crates`).

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known atlas crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "atlas-splitter",
    "atlas-structures",
    "atlas-splitting",
    "atlas-config",
    "atlas-observability",
];
