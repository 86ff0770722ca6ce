//! Config file discovery and layered loading.
//!
//! 1. Parse `defaults.toml` → base
//! 2. Merge `/etc/warden/config.toml` (system)
//! 3. Merge `{warden_home}/config.toml` (user)
//! 4. Apply `WARDEN_*` env fallbacks for fields no file set
//! 5. Deserialize merged tree → [`Config`]
//! 6. Validate

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::deep_merge;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// System-wide config file.
const SYSTEM_CONFIG_PATH: &str = "/etc/warden/config.toml";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A loaded configuration plus the files that contributed to it.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The merged, validated configuration.
    pub config: Config,
    /// Files that were found and merged, lowest precedence first.
    pub loaded_files: Vec<PathBuf>,
}

/// Paths searched by [`load`], in precedence order (lowest first).
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDir`] if no override is given and the home
/// directory cannot be determined.
pub fn search_paths(warden_home: Option<&Path>) -> ConfigResult<Vec<PathBuf>> {
    let user = match warden_home {
        Some(home) => home.join("config.toml"),
        None => default_warden_home()?.join("config.toml"),
    };
    Ok(vec![PathBuf::from(SYSTEM_CONFIG_PATH), user])
}

/// Load the configuration with layered file precedence.
///
/// `warden_home` is the warden home directory (the directory that holds
/// `config.toml`). When `None`, `$WARDEN_HOME` and then `~/.warden` are used.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is unreadable or malformed,
/// or if the merged configuration fails validation.
pub fn load(warden_home: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut set_by_files = BTreeSet::new();
    let mut loaded_files = Vec::new();

    for path in search_paths(warden_home)? {
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge(&mut merged, &overlay, "", &mut set_by_files);
            info!(path = %path.display(), "loaded config");
            loaded_files.push(path);
        }
    }

    let env_vars = collect_env_vars();
    let env_count = apply_env_fallbacks(&mut merged, &set_by_files, &env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        loaded_files,
    })
}

/// Load a config from a specific file path on top of the defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;

    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    deep_merge(&mut merged, &overlay, "", &mut BTreeSet::new());

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// `$WARDEN_HOME`, or `~/.warden`.
fn default_warden_home() -> ConfigResult<PathBuf> {
    if let Ok(custom) = std::env::var("WARDEN_HOME") {
        return Ok(PathBuf::from(custom));
    }
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".warden"))
        .ok_or(ConfigError::NoHomeDir)
}
