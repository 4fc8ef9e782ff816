// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Loading complete configuration files with every override layer.

use std::collections::HashMap;
use std::io::Write;

use atlas_config::{
    apply_overrides_with, load_config, ConfigError, IdStrategy, LogFormat, UndefinedVoxelPolicy,
};
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
[ids]
strategy = "acronym_hash"
min_id = 20000
max_id = 30000

[splitting]
parallel = true
min_parallel_voxels = 100000
undefined_voxels = "reject"
check_after_each_rule = false

[logging]
level = "debug"
format = "json"
debug_crates = ["atlas-splitting"]
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_file_with_cli_overrides() {
    let file = write_config(FULL_CONFIG);
    let mut cli = HashMap::new();
    cli.insert("splitting.parallel".to_string(), "off".to_string());
    cli.insert("logging.level".to_string(), "warn".to_string());

    let config = load_config(Some(file.path()), Some(&cli)).unwrap();
    assert_eq!(config.ids.strategy, IdStrategy::AcronymHash);
    assert_eq!((config.ids.min_id, config.ids.max_id), (20_000, 30_000));
    assert!(!config.splitting.parallel);
    assert_eq!(config.splitting.min_parallel_voxels, 100_000);
    assert_eq!(config.splitting.undefined_voxels, UndefinedVoxelPolicy::Reject);
    assert!(!config.splitting.check_after_each_rule);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.debug_crates, vec!["atlas-splitting"]);
}

#[test]
fn test_all_validation_problems_reported_together() {
    let file = write_config(
        r#"
        [ids]
        strategy = "reserved_range"
        min_id = 500
        max_id = 100

        [splitting]
        min_parallel_voxels = 0

        [logging]
        level = "loud"
        "#,
    );

    match load_config(Some(file.path()), None) {
        Err(ConfigError::ValidationError(message)) => {
            assert!(message.contains("[500, 100]"), "{}", message);
            assert!(message.contains("min_parallel_voxels"), "{}", message);
            assert!(message.contains("loud"), "{}", message);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_unknown_cli_key_rejected() {
    let file = write_config("");
    let mut cli = HashMap::new();
    cli.insert("splitting.turbo".to_string(), "true".to_string());
    assert!(matches!(
        load_config(Some(file.path()), Some(&cli)),
        Err(ConfigError::InvalidValue(_))
    ));
}

#[test]
fn test_environment_layer_sits_between_file_and_cli() {
    let mut config = atlas_config::load_config_from_str(FULL_CONFIG).unwrap();
    let env: HashMap<&str, &str> = [
        ("ATLAS_SPLITTER_ID_STRATEGY", "sequential"),
        ("ATLAS_SPLITTER_UNDEFINED_VOXELS", "default_target"),
        ("ATLAS_SPLITTER_PARALLEL", "not-a-bool"),
    ]
    .into_iter()
    .collect();

    apply_overrides_with(&mut config, |key| env.get(key).map(|v| v.to_string()));
    assert_eq!(config.ids.strategy, IdStrategy::Sequential);
    assert_eq!(config.splitting.undefined_voxels, UndefinedVoxelPolicy::DefaultTarget);
    // Unparsable values are ignored
    assert!(config.splitting.parallel);

    let mut cli = HashMap::new();
    cli.insert("ids.strategy".to_string(), "reserved_range".to_string());
    atlas_config::apply_cli_overrides(&mut config, &cli).unwrap();
    assert_eq!(config.ids.strategy, IdStrategy::ReservedRange);
    assert!(atlas_config::validate_config(&config).is_ok());
}
