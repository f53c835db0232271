//! TrustCore configuration
//!
//! Every bound is configurable via file/env, not hardcoded.
//! Defaults favour integrity over throughput.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`TrustConfig::database_path`]
pub const ENV_DATABASE_PATH: &str = "TRUSTCORE_DB";

/// Environment variable overriding [`TrustConfig::regulated_database_path`]
pub const ENV_REGULATED_DATABASE_PATH: &str = "TRUSTCORE_REGULATED_DB";

/// Configuration shared by the ledger, the partition router and the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    // === Storage ===
    /// General partition + audit relation (SQLite `main`)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Regulated partition (attached as `regulated`)
    #[serde(default = "default_regulated_database_path")]
    pub regulated_database_path: PathBuf,

    /// How long a connection waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    // === Hash chain ===
    /// Attempts before an append gives up with a write conflict
    #[serde(default = "default_max_append_retries")]
    pub max_append_retries: u32,

    /// Backoff step between append attempts (multiplied by attempt number)
    #[serde(default = "default_append_backoff_ms")]
    pub append_backoff_ms: u64,

    /// Events fetched per page during chain verification
    #[serde(default = "default_verify_page_size")]
    pub verify_page_size: usize,

    /// Upper bound on events returned by one query page
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/trustcore.db")
}

fn default_regulated_database_path() -> PathBuf {
    PathBuf::from("./data/regulated.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_append_retries() -> u32 {
    5
}

fn default_append_backoff_ms() -> u64 {
    2
}

fn default_verify_page_size() -> usize {
    500
}

fn default_max_page_size() -> usize {
    1_000
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            regulated_database_path: default_regulated_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_append_retries: default_max_append_retries(),
            append_backoff_ms: default_append_backoff_ms(),
            verify_page_size: default_verify_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl TrustConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Default layout rooted at a data directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            database_path: dir.join("trustcore.db"),
            regulated_database_path: dir.join("regulated.db"),
            ..Self::default()
        }
    }

    /// Apply `TRUSTCORE_DB` / `TRUSTCORE_REGULATED_DB` if set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var(ENV_REGULATED_DATABASE_PATH) {
            self.regulated_database_path = PathBuf::from(path);
        }
        self
    }

    /// Reject settings that would make the ledger unusable
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_append_retries == 0 {
            return Err(CoreError::Config(
                "max_append_retries must be at least 1".to_string(),
            ));
        }
        if self.verify_page_size == 0 || self.max_page_size == 0 {
            return Err(CoreError::Config("page sizes must be non-zero".to_string()));
        }
        if self.database_path == self.regulated_database_path {
            return Err(CoreError::Config(
                "general and regulated partitions must live in separate files".to_string(),
            ));
        }
        Ok(())
    }

    /// Get busy timeout as Duration
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Backoff before the given (1-based) retry attempt
    pub fn append_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.append_backoff_ms.saturating_mul(attempt as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrustConfig::default();

        assert_eq!(config.max_append_retries, 5);
        assert_eq!(config.append_backoff_ms, 2);
        assert_eq!(config.verify_page_size, 500);
        assert_eq!(config.max_page_size, 1_000);
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_json() {
        // Should use defaults for missing fields
        let json = r#"{ "max_append_retries": 9 }"#;
        let config: TrustConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.max_append_retries, 9);
        assert_eq!(config.verify_page_size, 500);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trustcore.json");
        std::fs::write(&path, r#"{ "verify_page_size": 64 }"#).unwrap();

        let config = TrustConfig::from_file(&path).unwrap();
        assert_eq!(config.verify_page_size, 64);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trustcore.json");
        std::fs::write(&path, r#"{ "max_append_retries": 0 }"#).unwrap();

        assert!(matches!(
            TrustConfig::from_file(&path),
            Err(CoreError::Config(_))
        ));
        assert!(TrustConfig::from_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_shared_partition_file_rejected() {
        let mut config = TrustConfig::default();
        config.regulated_database_path = config.database_path.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_in_dir_and_backoff() {
        let config = TrustConfig::in_dir("/var/lib/trustcore");
        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/trustcore/trustcore.db")
        );
        assert_eq!(config.append_backoff(3), Duration::from_millis(6));
    }
}
