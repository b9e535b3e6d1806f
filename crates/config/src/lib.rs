//! Configuration for fetchlog.
//!
//! Values are layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`]),
//! 2. an optional TOML file (by default `config.toml` in the platform config
//!    directory for `fetchlog`),
//! 3. environment variables prefixed with `FETCHLOG_` (e.g. `FETCHLOG_DATABASE`).

pub mod error;

use directories::{BaseDirs, ProjectDirs};
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

pub const ENV_PREFIX: &str = "FETCHLOG_";
pub const DEFAULT_DATABASE: &str = "downloads.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 1500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File name of the registry database, relative to [`home`](Self::home).
    pub database: String,
    /// Directory the database lives in. Falls back to the user's home
    /// directory when unset.
    pub home: Option<PathBuf>,
    /// How long SQLite waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            home: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}
impl Config {
    /// Load configuration from the default file location and the environment.
    pub fn load() -> Result<Self> {
        Self::extract(Self::figment(Self::default_file().as_deref()))
    }

    /// Load configuration from a specific TOML file and the environment.
    ///
    /// A missing file is not an error; it simply contributes nothing.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::extract(Self::figment(Some(path.as_ref())))
    }

    /// Location of the user-level configuration file, if the platform has one.
    pub fn default_file() -> Option<PathBuf> {
        ProjectDirs::from("", "", "fetchlog").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    #[instrument(skip_all)]
    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(database = %config.database, "Configuration loaded");
        Ok(config)
    }

    /// Reject values that would place the database somewhere unexpected.
    pub fn validate(&self) -> Result<()> {
        let name = Path::new(&self.database);
        if self.database.trim().is_empty() || name.file_name().is_none() || name.is_absolute() {
            exn::bail!(ErrorKind::Invalid("database"));
        }
        Ok(())
    }

    /// Directory that holds the database file.
    pub fn home_dir(&self) -> Result<PathBuf> {
        match &self.home {
            Some(home) => Ok(home.clone()),
            None => BaseDirs::new()
                .map(|dirs| dirs.home_dir().to_path_buf())
                .ok_or_raise(|| ErrorKind::NoHomeDirectory),
        }
    }

    /// Full path of the database file.
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.home_dir()?.join(&self.database))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
