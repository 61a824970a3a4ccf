//! Environment-driven configuration.
//!
//! | Variable             | Default           |
//! |----------------------|-------------------|
//! | `SYNC_ROOT`          | `./sync`          |
//! | `SYNC_DATABASE`      | `./themesync.db`  |
//! | `AUTO_START`         | `true`            |
//! | `CACHE_SIGNAL_TOKEN` | unset             |

use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const ROOT_VAR: &str = "SYNC_ROOT";
pub const DATABASE_VAR: &str = "SYNC_DATABASE";
pub const AUTO_START_VAR: &str = "AUTO_START";
pub const CACHE_TOKEN_VAR: &str = "CACHE_SIGNAL_TOKEN";

pub const DEFAULT_ROOT: &str = "./sync";
pub const DEFAULT_DATABASE: &str = "./themesync.db";

#[derive(Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Working tree root; holds `template_sets/` and `styles/`.
    pub root: PathBuf,
    /// SQLite database shared with the host application.
    pub database: PathBuf,
    /// Start the watcher as soon as the daemon boots.
    pub auto_start: bool,
    /// Opaque credential handed to the cache-invalidation collaborator.
    pub cache_signal_token: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            database: PathBuf::from(DEFAULT_DATABASE),
            auto_start: true,
            cache_signal_token: None,
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("root", &self.root)
            .field("database", &self.database)
            .field("auto_start", &self.auto_start)
            .field(
                "cache_signal_token",
                &self.cache_signal_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl SyncConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let root = match lookup(ROOT_VAR) {
            Some(value) if value.trim().is_empty() => {
                return Err(ConfigError::Empty { key: ROOT_VAR })
            }
            Some(value) => PathBuf::from(value),
            None => defaults.root,
        };

        let database = match lookup(DATABASE_VAR) {
            Some(value) if value.trim().is_empty() => {
                return Err(ConfigError::Empty { key: DATABASE_VAR })
            }
            Some(value) => PathBuf::from(value),
            None => defaults.database,
        };

        let auto_start = match lookup(AUTO_START_VAR) {
            Some(value) => parse_bool(AUTO_START_VAR, &value)?,
            None => defaults.auto_start,
        };

        let cache_signal_token = lookup(CACHE_TOKEN_VAR).filter(|token| !token.is_empty());

        Ok(Self {
            root,
            database,
            auto_start,
            cache_signal_token,
        })
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<PathBuf>) -> Self {
        self.database = database.into();
        self
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_string(),
        }),
    }
}
