//! Store configuration
//!
//! `StoreConfig` carries the recognized options. It can be built in code, read
//! from a JSON file (`{"storePath": "...", "corruptPolicy": "backup"}`), and is
//! overridden by command-line flags in the binary.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used when no store path is configured
pub const DEFAULT_STORE_FILE: &str = "credential-store.json";

/// What to do with a durable file that exists but cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptFilePolicy {
    /// Leave the file in place; it is replaced on the next successful flush
    #[default]
    Keep,
    /// Rename the file to `<name>.corrupt-<unix-millis>` before continuing
    Backup,
}

/// Recognized store options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Durable file location; relative paths resolve against the working directory
    pub store_path: Option<PathBuf>,
    /// Recovery policy for unparseable durable state
    pub corrupt_policy: CorruptFilePolicy,
}

impl StoreConfig {
    /// Creates a config pointing at a specific store file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Sets the corrupt-file policy
    pub fn corrupt_policy(mut self, policy: CorruptFilePolicy) -> Self {
        self.corrupt_policy = policy;
        self
    }

    /// Reads a config from a JSON file
    ///
    /// # Returns
    /// * `Ok(StoreConfig)` - Parsed config; missing fields take their defaults
    /// * `Err(ConfigError)` - If the file cannot be read or parsed
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves the absolute durable location against the current working directory
    pub fn resolve_store_path(&self) -> Result<PathBuf, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
        Ok(self.resolve_store_path_in(&cwd))
    }

    /// Resolves the durable location against an explicit base directory
    pub fn resolve_store_path_in(&self, base: &Path) -> PathBuf {
        match &self.store_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => base.join(path),
            None => base.join(DEFAULT_STORE_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_path_is_fixed_name_in_base() {
        let config = StoreConfig::default();
        let resolved = config.resolve_store_path_in(Path::new("/srv/app"));
        assert_eq!(resolved, PathBuf::from("/srv/app").join(DEFAULT_STORE_FILE));
    }

    #[test]
    fn test_relative_path_resolves_against_base() {
        let config = StoreConfig::with_path("state/token.json");
        let resolved = config.resolve_store_path_in(Path::new("/srv/app"));
        assert_eq!(resolved, PathBuf::from("/srv/app/state/token.json"));
    }

    #[test]
    fn test_absolute_path_is_kept() {
        let config = StoreConfig::with_path("/var/lib/token.json");
        let resolved = config.resolve_store_path_in(Path::new("/srv/app"));
        assert_eq!(resolved, PathBuf::from("/var/lib/token.json"));
    }

    #[test]
    fn test_resolve_store_path_is_absolute() {
        let resolved = StoreConfig::default()
            .resolve_store_path()
            .expect("cwd should be available");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with(DEFAULT_STORE_FILE));
    }

    #[test]
    fn test_default_policy_keeps_corrupt_file() {
        assert_eq!(StoreConfig::default().corrupt_policy, CorruptFilePolicy::Keep);
    }

    #[test]
    fn test_from_json_file_reads_camel_case_keys() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"storePath": "/tmp/x.json", "corruptPolicy": "backup"}"#)
            .expect("Should write config");

        let config = StoreConfig::from_json_file(&path).expect("Config should parse");

        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/x.json")));
        assert_eq!(config.corrupt_policy, CorruptFilePolicy::Backup);
    }

    #[test]
    fn test_from_json_file_missing_fields_use_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{}").expect("Should write config");

        let config = StoreConfig::from_json_file(&path).expect("Config should parse");

        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_from_json_file_reports_parse_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "not json").expect("Should write config");

        let result = StoreConfig::from_json_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_from_json_file_reports_missing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = StoreConfig::from_json_file(&temp_dir.path().join("absent.json"));

        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
