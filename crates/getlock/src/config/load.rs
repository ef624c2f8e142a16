//! Configuration loading from files and environment.

use std::path::{Path, PathBuf};

use getlock_core::LockTimeout;

use super::{ConfigLayer, GetlockConfig};
use crate::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from all sources with hierarchy.
///
/// When `explicit` is given it must exist and replaces the global and
/// project files. Command line flags are applied by the caller.
///
/// # Errors
///
/// Returns error if:
/// - A config file is malformed TOML or cannot be read
/// - An environment variable has an invalid value
/// - The merged config fails validation
pub fn load_config(explicit: Option<&Path>) -> Result<GetlockConfig> {
    let config = GetlockConfig::default();

    let config = match explicit {
        Some(path) => config.merge(load_toml_file(path)?),
        None => {
            let config = match global_config_path() {
                Some(global) if global.exists() => config.merge(load_toml_file(&global)?),
                _ => config,
            };
            let project = project_config_path()?;
            if project.exists() {
                config.merge(load_toml_file(&project)?)
            } else {
                config
            }
        }
    };

    let config = config.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════

pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "getlock")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// # Errors
///
/// Returns error if current directory cannot be determined
pub fn project_config_path() -> Result<PathBuf> {
    std::env::current_dir()
        .map(|dir| dir.join(".getlock.toml"))
        .map_err(|e| Error::IoError(format!("Failed to get current directory: {e}")))
}

/// Load a TOML file into a config layer.
///
/// # Errors
///
/// Returns error if:
/// - Path is a directory instead of a file
/// - File cannot be read
/// - TOML is malformed or has unknown keys
pub fn load_toml_file(path: &Path) -> Result<ConfigLayer> {
    if path.is_dir() {
        return Err(Error::IoError(format!(
            "Config path is a directory, not a file: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::ParseError(format!(
            "Failed to parse config file {}: {e}",
            path.display()
        ))
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLE OVERRIDES
// ═══════════════════════════════════════════════════════════════════════════

impl GetlockConfig {
    /// # Errors
    ///
    /// Returns error if environment variable values are invalid
    pub fn apply_env_vars(self) -> Result<Self> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns error if `GETLOCK_TIMEOUT` is not an integer.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // GETLOCK_DATABASE_URL, then DATABASE_URL
        if let Some(value) = lookup("GETLOCK_DATABASE_URL").or_else(|| lookup("DATABASE_URL")) {
            self.database_url = Some(value);
        }

        // GETLOCK_TIMEOUT
        if let Some(value) = lookup("GETLOCK_TIMEOUT") {
            let secs: i64 = value.trim().parse().map_err(|e| {
                Error::invalid_config(format!("Invalid GETLOCK_TIMEOUT value '{value}': {e}"))
            })?;
            self.timeout = LockTimeout::seconds(secs);
        }

        Ok(self)
    }
}
