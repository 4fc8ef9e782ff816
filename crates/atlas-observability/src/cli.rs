// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! CLI argument parsing for per-crate debug flags
//!
//! Supports flags like `--debug-atlas-splitting` to raise a single crate to
//! debug level, and `--debug-all` for every known crate.

use std::collections::BTreeSet;
use std::env;

use crate::KNOWN_CRATES;

/// Environment variable listing crates to debug (comma-separated, or `all`)
pub const DEBUG_ENV: &str = "ATLAS_SPLITTER_DEBUG";

/// Crates whose logs are raised to debug level
///
/// # Example
/// ```rust
/// use atlas_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-atlas-splitting".to_string()]);
/// assert!(flags.is_enabled("atlas-splitting"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrateDebugFlags {
    pub enabled_crates: BTreeSet<String>,
}

impl CrateDebugFlags {
    /// Parse debug flags from command-line arguments
    ///
    /// Looks for arguments matching `--debug-{crate-name}`.
    /// `--debug-all` enables every known crate.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();
        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
            } else if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enable(crate_name);
            }
        }
        flags
    }

    /// Flags from a crate list such as `logging.debug_crates` or the
    /// `ATLAS_SPLITTER_DEBUG` value (`all` enables every known crate)
    pub fn from_crate_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags = CrateDebugFlags::default();
        for name in names {
            match name.as_ref().trim() {
                "" => {}
                "all" => flags.enable_all(),
                crate_name => flags.enable(crate_name),
            }
        }
        flags
    }

    pub fn enable(&mut self, crate_name: &str) {
        self.enabled_crates.insert(crate_name.to_string());
    }

    pub fn enable_all(&mut self) {
        self.enabled_crates
            .extend(KNOWN_CRATES.iter().map(|name| name.to_string()));
    }

    /// Union with another set of flags
    pub fn merge(&mut self, other: CrateDebugFlags) {
        self.enabled_crates.extend(other.enabled_crates);
    }

    /// Check if debug is enabled for a specific crate
    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains(crate_name)
    }

    /// Enabled crates in name order
    pub fn enabled_crates(&self) -> Vec<&str> {
        self.enabled_crates.iter().map(String::as_str).collect()
    }

    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// `DEBUG` for enabled crates, `INFO` otherwise
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Filter directives for `EnvFilter`
    ///
    /// Format: `"atlas-splitting=debug,atlas-config=debug,{base_level}"`, or
    /// just `base_level` if no crate is enabled.
    pub fn to_filter_string(&self, base_level: &str) -> String {
        self.enabled_crates
            .iter()
            .map(|crate_name| format!("{}=debug", crate_name))
            .chain(std::iter::once(base_level.to_string()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Debug flags from the process arguments and `ATLAS_SPLITTER_DEBUG`
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(env_var) = env::var(DEBUG_ENV) {
        flags.merge(CrateDebugFlags::from_crate_list(env_var.split(',')));
    }
    flags
}

/// Generate help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  {env}={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  {env}=all                               Enable debug for all crates
"#,
        KNOWN_CRATES.join(", "),
        env = DEBUG_ENV
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_crate_flag() {
        let flags = CrateDebugFlags::from_args(vec![
            "atlas-split".to_string(),
            "--debug-atlas-splitting".to_string(),
        ]);
        assert!(flags.is_enabled("atlas-splitting"));
        assert!(!flags.is_enabled("atlas-config"));
        assert_eq!(flags.enabled_crates(), vec!["atlas-splitting"]);
    }

    #[test]
    fn test_debug_all() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        for crate_name in KNOWN_CRATES {
            assert!(flags.is_enabled(crate_name), "{} should be enabled", crate_name);
        }
    }

    #[test]
    fn test_crate_list() {
        let flags = CrateDebugFlags::from_crate_list(" atlas-config ,,atlas-splitting".split(','));
        assert_eq!(flags.enabled_crates(), vec!["atlas-config", "atlas-splitting"]);
        assert!(CrateDebugFlags::from_crate_list(["all"]).is_enabled("atlas-structures"));
        assert!(!CrateDebugFlags::from_crate_list(Vec::<String>::new()).any_enabled());
    }

    #[test]
    fn test_filter_string() {
        assert_eq!(CrateDebugFlags::default().to_filter_string("warn"), "warn");

        let mut flags = CrateDebugFlags::from_args(vec!["--debug-atlas-splitting".to_string()]);
        flags.merge(CrateDebugFlags::from_crate_list(["atlas-config"]));
        assert_eq!(
            flags.to_filter_string("info"),
            "atlas-config=debug,atlas-splitting=debug,info"
        );
    }

    #[test]
    fn test_log_level() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-atlas-splitting".to_string()]);
        assert_eq!(flags.log_level("atlas-splitting"), tracing::Level::DEBUG);
        assert_eq!(flags.log_level("atlas-config"), tracing::Level::INFO);
    }

    #[test]
    fn test_help_lists_crates() {
        let help = debug_flags_help();
        assert!(help.contains("atlas-splitting"));
        assert!(help.contains(DEBUG_ENV));
    }
}
