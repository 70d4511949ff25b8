//! Integration tests for configuration file loading
//!
//! Tests that touch environment variables are marked `#[serial]` so they do
//! not race each other.

use piradio_common::config::{default_config_path, ConfigSource, TomlConfig};
use piradio_common::Error;
use serial_test::serial;
use std::io::Write;
use tempfile::TempDir;

#[test]
fn test_load_explicit_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        "[player]\npoll_interval_secs = 6\nuser_agent = \"piradio-test\"\n\n[logging]\nlevel = \"debug\"\nfile = \"/tmp/piradio-test.log\""
    )
    .unwrap();

    let loaded = TomlConfig::load(Some(&path)).unwrap();
    assert_eq!(loaded.source, ConfigSource::File(path.clone()));
    let config = loaded.config;
    assert_eq!(config.player.poll_interval_secs, 6);
    assert_eq!(config.player.user_agent, "piradio-test");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(
        config.logging.file.as_deref(),
        Some(std::path::Path::new("/tmp/piradio-test.log"))
    );
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let err = TomlConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[player\npoll_interval_secs = ").unwrap();

    assert!(TomlConfig::load(Some(&path)).is_err());
}

#[test]
fn test_unknown_tables_are_ignored() {
    let config = TomlConfig::from_toml_str("[unrelated]\nkey = 1\n").unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
#[serial]
fn test_missing_default_file_falls_back_to_defaults() {
    // Point the platform config dir at an empty directory
    let dir = TempDir::new().unwrap();
    let previous = std::env::var_os("XDG_CONFIG_HOME");
    std::env::set_var("XDG_CONFIG_HOME", dir.path());

    let loaded = TomlConfig::load(None);

    match previous {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }

    // On Linux the default path now lives under the empty temp dir
    if cfg!(target_os = "linux") {
        let loaded = loaded.unwrap();
        assert_eq!(loaded.config, TomlConfig::default());
        assert_eq!(
            loaded.source,
            ConfigSource::Defaults {
                searched: Some(dir.path().join("piradio").join("config.toml")),
            }
        );
    }
}

#[test]
#[serial]
fn test_existing_default_file_is_reported_as_source() {
    let dir = TempDir::new().unwrap();
    let app_dir = dir.path().join("piradio");
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(app_dir.join("config.toml"), "[player]\npoll_interval_secs = 9\n").unwrap();
    let previous = std::env::var_os("XDG_CONFIG_HOME");
    std::env::set_var("XDG_CONFIG_HOME", dir.path());

    let loaded = TomlConfig::load(None);

    match previous {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }

    if cfg!(target_os = "linux") {
        let loaded = loaded.unwrap();
        assert_eq!(loaded.config.player.poll_interval_secs, 9);
        assert_eq!(
            loaded.source,
            ConfigSource::File(app_dir.join("config.toml"))
        );
    }
}

#[test]
fn test_default_config_path_shape() {
    if let Some(path) = default_config_path() {
        assert!(path.ends_with("piradio/config.toml"));
    }
}
