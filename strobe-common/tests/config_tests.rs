//! Tests for bootstrap configuration loading
//!
//! Note: Uses serial_test to prevent ENV variable race conditions.
//! Tests that manipulate STROBE_CONFIG are marked with #[serial].

use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use strobe_common::config::{resolve_config_path, LoggingConfig, PlayerConfig, TomlConfig, CONFIG_ENV_VAR};
use strobe_common::HardwareAcceleration;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_defaults_match_documented_values() {
    let config = TomlConfig::default();

    assert_eq!(config.player.sync_threshold_ms, 20);
    assert_eq!(config.player.audio_buffer_size, 8);
    assert_eq!(config.player.video_buffer_size, 8);
    assert!(config.player.hardware_acceleration.is_empty());
    assert_eq!(config.logging, LoggingConfig { level: "strobe_player=debug,strobe_common=info".to_string(), file: None });
    assert!(config.player.validate().is_ok());
}

#[test]
fn test_partial_document_fills_defaults() {
    let config = TomlConfig::parse(
        r#"
        [player]
        video_buffer_size = 3
        hardware_acceleration = ["vaapi", "cuda"]
        "#,
    )
    .unwrap();

    assert_eq!(config.player.video_buffer_size, 3);
    assert_eq!(config.player.audio_buffer_size, 8);
    assert_eq!(
        config.player.hardware_acceleration,
        vec![HardwareAcceleration::Vaapi, HardwareAcceleration::Cuda]
    );
    assert_eq!(config.logging.level, "strobe_player=debug,strobe_common=info");
}

#[test]
fn test_invalid_values_rejected() {
    assert!(TomlConfig::parse("[player]\nplayback_speed = 4.0\n").is_err());
    assert!(TomlConfig::parse("[player]\naudio_buffer_size = 0\n").is_err());
    assert!(TomlConfig::parse("[player]\nsync_threshold_ms = 0\n").is_err());
    assert!(TomlConfig::parse("[player\n").is_err());
}

#[test]
fn test_initial_settings_from_player_section() {
    let player = PlayerConfig { volume: 0.25, muted: true, playback_speed: 1.5, ..Default::default() };
    let settings = player.initial_settings();

    assert_eq!(settings.volume, 0.25);
    assert!(settings.is_muted);
    assert_eq!(settings.playback_speed_factor, 1.5);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = TomlConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[logging]\nlevel = \"debug\"\nfile = \"/tmp/strobe.log\"").unwrap();

    let config = TomlConfig::load_or_default(file.path()).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/strobe.log")));
}

#[test]
#[serial]
fn test_cli_path_takes_precedence_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/strobe-from-env.toml");

    let cli = PathBuf::from("/tmp/strobe-from-cli.toml");
    assert_eq!(resolve_config_path(Some(&cli)), Some(cli.clone()));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/strobe-from-env.toml");

    assert_eq!(resolve_config_path(None), Some(PathBuf::from("/tmp/strobe-from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_default_location_under_config_dir() {
    env::remove_var(CONFIG_ENV_VAR);

    if let Some(path) = resolve_config_path(None) {
        assert!(path.ends_with("strobe/strobe.toml"));
    }
}
