//! Tests for bootstrap configuration and root folder resolution
//!
//! Tests touching STYLEPICK_ROOT_FOLDER are #[serial] so they never observe
//! each other's environment changes.

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use stylepick_common::config::{
    default_root_folder, load_toml_config, resolve_root_folder, write_toml_config, LoggingConfig,
    TomlConfig, ROOT_FOLDER_ENV,
};
use tempfile::TempDir;

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root = resolve_root_folder(None, &TomlConfig::default());
    assert_eq!(root, default_root_folder());
    assert!(!root.as_os_str().is_empty());
}

#[test]
#[serial]
fn test_resolver_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/stylepick-env-folder");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/stylepick-toml-folder")),
        ..Default::default()
    };
    let root = resolve_root_folder(None, &config);
    assert_eq!(root, PathBuf::from("/tmp/stylepick-env-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_cli_arg_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/stylepick-env-folder");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/stylepick-toml-folder")),
        ..Default::default()
    };
    let root = resolve_root_folder(Some(Path::new("/tmp/stylepick-cli")), &config);
    assert_eq!(root, PathBuf::from("/tmp/stylepick-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_falls_back_to_toml() {
    env::remove_var(ROOT_FOLDER_ENV);

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/stylepick-toml-folder")),
        ..Default::default()
    };
    assert_eq!(
        resolve_root_folder(None, &config),
        PathBuf::from("/tmp/stylepick-toml-folder")
    );
}

#[test]
fn test_write_then_load_explicit_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("conf").join("config.toml");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/data/stylepick")),
        database_path: Some(PathBuf::from("prefs.db")),
        logging: LoggingConfig {
            level: "debug".to_string(),
            file: None,
        },
    };
    write_toml_config(&config, &path).unwrap();

    let loaded = load_toml_config(Some(&path)).unwrap();
    assert_eq!(loaded.root_folder, Some(PathBuf::from("/data/stylepick")));
    assert_eq!(loaded.logging.level, "debug");
    assert_eq!(
        loaded.database_path(Path::new("/data/stylepick")),
        PathBuf::from("/data/stylepick/prefs.db")
    );
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = load_toml_config(Some(&temp_dir.path().join("absent.toml")));
    assert!(result.is_err());
}
