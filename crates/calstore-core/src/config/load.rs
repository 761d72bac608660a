//! Where configuration comes from.
//!
//! Layers, later ones winning:
//!
//! | layer    | source                                        |
//! |----------|-----------------------------------------------|
//! | defaults | [`Config::default`]                           |
//! | global   | `<platform config dir>/calstore/config.toml`  |
//! | project  | `./.calstore/config.toml`                     |
//! | env      | `CALSTORE_*`                                  |
//!
//! Each layer produces a new [`Config`]; nothing is patched in place.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use super::types::Config;
use crate::{Error, Result};

const ENV_DATABASE_URL: &str = "CALSTORE_DATABASE_URL";
const ENV_OVERDUE_WAIT_MS: &str = "CALSTORE_OVERDUE_WAIT_MS";
const ENV_REFRESH_INTERVAL_MS: &str = "CALSTORE_REFRESH_INTERVAL_MS";
const ENV_SEARCH_COLLATION: &str = "CALSTORE_SEARCH_COLLATION";

// ═══════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════

/// Resolve the effective configuration for the current directory.
///
/// Missing global or project files are skipped; present but broken ones are
/// errors.
pub fn load_config() -> Result<Config> {
    let config = global_config_path()
        .into_iter()
        .chain(std::iter::once(project_config_path()?))
        .filter(|path| path.exists())
        .try_fold(Config::default(), |config, path| {
            tracing::debug!(path = %path.display(), "Merging config file");
            load_toml_file(&path).map(|layer| config.merge(layer))
        })?;

    finish(config)
}

/// Resolve the configuration from `path` alone (plus defaults and env).
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::not_found(format!(
            "No config file at {}",
            path.display()
        )));
    }
    let layer = load_toml_file(path)?;
    finish(Config::default().merge(layer))
}

fn finish(config: Config) -> Result<Config> {
    let config = config.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════
// FILES
// ═══════════════════════════════════════════════════════════════════════════

/// `config.toml` in the platform config directory, if the platform has one.
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "calstore")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// `.calstore/config.toml` below the working directory.
pub fn project_config_path() -> Result<PathBuf> {
    let cwd = std::env::current_dir()
        .map_err(|e| Error::io_error(format!("Cannot resolve working directory: {e}")))?;
    Ok(cwd.join(".calstore").join("config.toml"))
}

/// Parse one config file. Keys it leaves out keep their defaults.
pub fn load_toml_file(path: &Path) -> Result<Config> {
    if path.is_dir() {
        return Err(Error::io_error(format!(
            "{} is a directory; expected a config.toml file",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::io_error(format!("Cannot read {}: {e}", path.display())))?;
    toml::from_str(&text)
        .map_err(|e| Error::parse_error(format!("{} is not valid config TOML: {e}", path.display())))
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVIRONMENT
// ═══════════════════════════════════════════════════════════════════════════

fn env_number<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name)
        .ok()
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::invalid_config(format!("{name}={raw:?}: {e}")))
        })
        .transpose()
}

impl Config {
    /// Overlay `CALSTORE_*` variables.
    ///
    /// `CALSTORE_SEARCH_COLLATION=""` removes a configured collation.
    pub fn apply_env_vars(self) -> Result<Self> {
        let database_url = match std::env::var(ENV_DATABASE_URL) {
            Ok(url) if url.trim().is_empty() => {
                return Err(Error::invalid_config(format!(
                    "{ENV_DATABASE_URL} is set but empty"
                )))
            }
            Ok(url) => url,
            Err(_) => self.database_url,
        };

        let mut alarm = self.alarm;
        alarm.overdue_wait_ms = env_number(ENV_OVERDUE_WAIT_MS)?.unwrap_or(alarm.overdue_wait_ms);
        alarm.refresh_interval_ms =
            env_number(ENV_REFRESH_INTERVAL_MS)?.unwrap_or(alarm.refresh_interval_ms);

        let mut search = self.search;
        if let Ok(collation) = std::env::var(ENV_SEARCH_COLLATION) {
            search.collation = Some(collation).filter(|name| !name.is_empty());
        }

        Ok(Self {
            database_url,
            alarm,
            search,
        })
    }
}
