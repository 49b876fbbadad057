//! Configuration file resolution and loading
//!
//! A config file is located with the following priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`<config_dir>/<app>/config.toml`)
//! 4. None, in which case compiled defaults apply

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve which config file (if any) should be loaded
///
/// # Arguments
/// * `cli_arg` - Path given on the command line
/// * `env_var_name` - Environment variable consulted when no CLI path is given
/// * `app_name` - Directory name under the platform config dir
///
/// # Returns
/// `Some(path)` for an explicit path (which need not exist yet) or an existing
/// per-user file, `None` when defaults should be used.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: per-user config file
    let user_config = default_config_path(app_name)?;
    if user_config.exists() {
        return Some(user_config);
    }

    None
}

/// Platform config file location for `app_name`
pub fn default_config_path(app_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(app_name).join("config.toml"))
}

/// Load a TOML config file into `T`, or `T::default()` when `path` is `None`
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No config file, using defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config = toml::from_str::<T>(&content)?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}
