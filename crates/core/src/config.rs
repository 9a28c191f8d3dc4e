//! Configuration management for cardchain.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Longest expiration an entry may carry, in days.
pub const MAX_EXPIRATION_DAYS: u32 = 1095;

/// Largest `Time-To-Live` value, in days.
const MAX_TIME_TO_LIVE: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub keycard: KeycardConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Defaults applied when entries are created or rotated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeycardConfig {
    /// Tag of the hash algorithm used to seal new entries
    pub hash_algorithm: String,
    pub org_expiration_days: u32,
    pub user_expiration_days: u32,
    pub org_time_to_live: u32,
    pub user_time_to_live: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding persisted keycard entries
    pub database_path: PathBuf,
}

impl Default for KeycardConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: "BLAKE2B-256".to_string(),
            org_expiration_days: 365,
            user_expiration_days: 90,
            org_time_to_live: 30,
            user_time_to_live: 7,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("keycards.db"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            keycard: KeycardConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Rejects values that would produce non-compliant entries.
    pub fn validate(&self) -> CoreResult<()> {
        let kc = &self.keycard;

        if kc.hash_algorithm.trim().is_empty() {
            return Err(CoreError::Config(
                "keycard.hash_algorithm must not be empty".to_string(),
            ));
        }

        for (name, days) in [
            ("org_expiration_days", kc.org_expiration_days),
            ("user_expiration_days", kc.user_expiration_days),
        ] {
            if days == 0 || days > MAX_EXPIRATION_DAYS {
                return Err(CoreError::Config(format!(
                    "keycard.{} must be between 1 and {}, got {}",
                    name, MAX_EXPIRATION_DAYS, days
                )));
            }
        }

        for (name, ttl) in [
            ("org_time_to_live", kc.org_time_to_live),
            ("user_time_to_live", kc.user_time_to_live),
        ] {
            if ttl == 0 || ttl > MAX_TIME_TO_LIVE {
                return Err(CoreError::Config(format!(
                    "keycard.{} must be between 1 and {}, got {}",
                    name, MAX_TIME_TO_LIVE, ttl
                )));
            }
        }

        Ok(())
    }

    /// Path of the keycard database, for use by storage backends.
    pub fn database_path(&self) -> &Path {
        &self.storage.database_path
    }
}
