use std::{collections::HashMap, fs};

use getlock_core::LockTimeout;
use serial_test::serial;
use tempfile::TempDir;

use super::*;

fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
    let map: HashMap<&str, &str> = pairs.iter().copied().collect();
    move |name| map.get(name).map(ToString::to_string)
}

#[test]
fn test_default_config_values() {
    let config = GetlockConfig::default();
    assert_eq!(config.database_url, None);
    assert_eq!(config.timeout, LockTimeout::INFINITE);
    assert_eq!(config.connect_timeout_secs, 10);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_uses_defaults() -> Result<()> {
    let temp = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
    let path = temp.path().join("config.toml");
    fs::write(&path, "timeout = 30\n").map_err(|e| Error::IoError(e.to_string()))?;

    let layer = load_toml_file(&path)?;
    assert_eq!(layer.timeout, Some(LockTimeout::seconds(30)));
    assert_eq!(layer.connect_timeout_secs, None);
    assert_eq!(layer.database_url, None);

    let config = GetlockConfig::default().merge(layer);
    assert_eq!(config.timeout, LockTimeout::seconds(30));
    assert_eq!(config.connect_timeout_secs, 10);
    assert_eq!(config.database_url, None);
    Ok(())
}

#[test]
fn test_malformed_toml_returns_parse_error() -> Result<()> {
    let temp = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
    let path = temp.path().join("config.toml");
    fs::write(&path, "timeout = [").map_err(|e| Error::IoError(e.to_string()))?;

    assert!(matches!(load_toml_file(&path), Err(Error::ParseError(_))));
    Ok(())
}

#[test]
fn test_unknown_key_is_rejected() -> Result<()> {
    let temp = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
    let path = temp.path().join("config.toml");
    fs::write(&path, "timout = 5\n").map_err(|e| Error::IoError(e.to_string()))?;

    assert!(matches!(load_toml_file(&path), Err(Error::ParseError(_))));
    Ok(())
}

#[test]
fn test_directory_is_not_a_config_file() -> Result<()> {
    let temp = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
    assert!(matches!(load_toml_file(temp.path()), Err(Error::IoError(_))));
    Ok(())
}

#[test]
fn test_project_overrides_global() {
    let global = ConfigLayer {
        database_url: Some("mysql://global/db".to_string()),
        timeout: Some(LockTimeout::seconds(60)),
        connect_timeout_secs: Some(3),
    };
    let project = ConfigLayer {
        database_url: Some("mysql://project/db".to_string()),
        ..ConfigLayer::default()
    };

    let merged = GetlockConfig::default().merge(global).merge(project);
    assert_eq!(merged.database_url.as_deref(), Some("mysql://project/db"));
    assert_eq!(merged.timeout, LockTimeout::seconds(60));
    assert_eq!(merged.connect_timeout_secs, 3);
}

#[test]
fn test_project_can_restore_default_values() -> Result<()> {
    let temp = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
    let global = temp.path().join("global.toml");
    let project = temp.path().join("project.toml");
    fs::write(&global, "timeout = 30\nconnect_timeout_secs = 3\n")
        .map_err(|e| Error::IoError(e.to_string()))?;
    fs::write(&project, "timeout = -1\nconnect_timeout_secs = 10\n")
        .map_err(|e| Error::IoError(e.to_string()))?;

    let merged = GetlockConfig::default()
        .merge(load_toml_file(&global)?)
        .merge(load_toml_file(&project)?);
    assert!(merged.timeout.is_infinite());
    assert_eq!(merged.connect_timeout_secs, 10);
    Ok(())
}

#[test]
fn test_env_prefers_getlock_database_url() -> Result<()> {
    let config = GetlockConfig::default().apply_env(env(&[
        ("DATABASE_URL", "mysql://fallback/db"),
        ("GETLOCK_DATABASE_URL", "mysql://primary/db"),
    ]))?;
    assert_eq!(config.database_url.as_deref(), Some("mysql://primary/db"));

    let config =
        GetlockConfig::default().apply_env(env(&[("DATABASE_URL", "mysql://fallback/db")]))?;
    assert_eq!(config.database_url.as_deref(), Some("mysql://fallback/db"));
    Ok(())
}

#[test]
fn test_env_timeout_parsing() -> Result<()> {
    let config = GetlockConfig::default().apply_env(env(&[("GETLOCK_TIMEOUT", " 15 ")]))?;
    assert_eq!(config.timeout, LockTimeout::seconds(15));

    let result = GetlockConfig::default().apply_env(env(&[("GETLOCK_TIMEOUT", "soon")]));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    Ok(())
}

#[test]
fn test_flags_override_everything() {
    let config = GetlockConfig {
        database_url: Some("mysql://file/db".to_string()),
        timeout: LockTimeout::seconds(60),
        connect_timeout_secs: 3,
    }
    .apply_overrides(Some("mysql://flag/db".to_string()), Some(-1));

    assert_eq!(config.database_url.as_deref(), Some("mysql://flag/db"));
    assert!(config.timeout.is_infinite());
    assert_eq!(config.connect_timeout_secs, 3);
}

#[test]
fn test_validation_rejects_empty_url_and_zero_connect_timeout() {
    let empty_url = GetlockConfig {
        database_url: Some(String::new()),
        ..GetlockConfig::default()
    };
    assert!(matches!(empty_url.validate(), Err(Error::InvalidConfig(_))));

    let zero = GetlockConfig {
        connect_timeout_secs: 0,
        ..GetlockConfig::default()
    };
    assert!(matches!(zero.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_missing_database_url_is_reported() {
    let config = GetlockConfig::default();
    assert!(matches!(
        config.require_database_url(),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_global_config_path() {
    if let Some(path) = global_config_path() {
        assert!(path.ends_with("config.toml"));
        assert!(path.to_string_lossy().contains("getlock"));
    }
}

#[test]
#[serial]
fn test_explicit_file_replaces_project_file() -> Result<()> {
    let temp = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
    let original = std::env::current_dir().map_err(|e| Error::IoError(e.to_string()))?;
    std::env::set_current_dir(temp.path()).map_err(|e| Error::IoError(e.to_string()))?;

    let outcome = (|| {
        fs::write(".getlock.toml", "timeout = 7\n").map_err(|e| Error::IoError(e.to_string()))?;
        let explicit = temp.path().join("other.toml");
        fs::write(&explicit, "connect_timeout_secs = 2\n")
            .map_err(|e| Error::IoError(e.to_string()))?;

        let from_project = load_config(None)?;
        let from_explicit = load_config(Some(explicit.as_path()))?;
        Ok::<_, Error>((from_project, from_explicit))
    })();

    std::env::set_current_dir(original).map_err(|e| Error::IoError(e.to_string()))?;
    let (from_project, from_explicit) = outcome?;

    assert_eq!(from_project.timeout, LockTimeout::seconds(7));
    assert_eq!(from_explicit.timeout, LockTimeout::INFINITE);
    assert_eq!(from_explicit.connect_timeout_secs, 2);
    Ok(())
}

#[test]
#[serial]
fn test_env_var_overrides_config_file() -> Result<()> {
    let temp = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
    let path = temp.path().join("config.toml");
    fs::write(&path, "timeout = 7\n").map_err(|e| Error::IoError(e.to_string()))?;

    std::env::set_var("GETLOCK_TIMEOUT", "12");
    let result = load_config(Some(path.as_path()));
    std::env::remove_var("GETLOCK_TIMEOUT");

    assert_eq!(result?.timeout, LockTimeout::seconds(12));
    Ok(())
}
