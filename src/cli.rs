//! Command-line interface for the credcache binary
//!
//! This module handles parsing of CLI arguments using clap and runs each
//! subcommand against a file-backed store. Commands return their output as a
//! string so they can be exercised without spawning the binary.

use std::path::PathBuf;

use chrono::Duration;
use clap::{Parser, Subcommand};
use serde_json::Value;
use thiserror::Error;

use crate::config::{CorruptFilePolicy, StoreConfig};
use crate::error::{ConfigError, StoreError};
use crate::expiry;
use crate::signing::{self, HashAlgorithm};
use crate::store::Store;

/// Error types for CLI commands
#[derive(Debug, Error)]
pub enum CliError {
    /// A signing parameter was not in KEY=VALUE form
    #[error("Invalid parameter: '{0}'. Expected KEY=VALUE")]
    InvalidParam(String),

    /// The requested key is not in the store
    #[error("No entry found for key '{0}'")]
    NotFound(String),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The store could not be opened or flushed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The expiry window is too large to represent
    #[error("Invalid window: {0} seconds is out of range")]
    InvalidWindow(i64),

    /// Output could not be rendered as JSON
    #[error("Failed to render output: {0}")]
    Render(#[from] serde_json::Error),
}

/// credcache - inspect and update a persistent credential cache
#[derive(Parser, Debug)]
#[command(name = "credcache")]
#[command(about = "Inspect and update a persistent credential cache")]
#[command(version)]
pub struct Cli {
    /// Store file location (default: ./credential-store.json)
    #[arg(long, global = true, env = "CREDCACHE_STORE_PATH", value_name = "PATH")]
    pub store_path: Option<PathBuf>,

    /// JSON config file providing storePath and corruptPolicy
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Move an unparseable store file aside instead of leaving it in place
    #[arg(long, global = true)]
    pub backup_corrupt: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the cached value for KEY as JSON
    Get {
        /// Entry name
        key: String,
    },
    /// Store VALUE under KEY (JSON if it parses, otherwise a plain string)
    Set {
        /// Entry name
        key: String,
        /// Value to cache
        value: String,
    },
    /// Print whether KEY is missing or older than the expiry window
    Expired {
        /// Entry name
        key: String,
        /// Expiry window in seconds (default: 119 minutes)
        #[arg(long, value_name = "SECONDS")]
        window_secs: Option<i64>,
    },
    /// List entry names
    Keys,
    /// Print the canonical parameter string and its digest
    ///
    /// Examples:
    ///   credcache sign noncestr=abc timestamp=1414587457
    ///   credcache sign --algorithm sha256 B=2 a=1
    Sign {
        /// Digest algorithm: sha1 or sha256
        #[arg(long, default_value = "sha1")]
        algorithm: HashAlgorithm,
        /// Parameters as KEY=VALUE
        #[arg(required = true, value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
}

impl Cli {
    /// Builds the store configuration from the config file and flags
    ///
    /// Flags win over the config file; the config file wins over defaults.
    pub fn store_config(&self) -> Result<StoreConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => StoreConfig::from_json_file(path)?,
            None => StoreConfig::default(),
        };

        if let Some(path) = &self.store_path {
            config.store_path = Some(path.clone());
        }
        if self.backup_corrupt {
            config.corrupt_policy = CorruptFilePolicy::Backup;
        }

        Ok(config)
    }
}

/// Parses a `KEY=VALUE` argument
///
/// Only the first `=` separates key from value, so values may contain `=`.
pub fn parse_param_arg(s: &str) -> Result<(String, String), CliError> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::InvalidParam(s.to_string())),
    }
}

/// Interprets a value argument as JSON, falling back to a plain string
pub fn parse_value_arg(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
}

/// Expiry window for the `expired` command
pub fn window_from_secs(secs: Option<i64>) -> Result<Duration, CliError> {
    match secs {
        Some(secs) => Duration::try_seconds(secs).ok_or(CliError::InvalidWindow(secs)),
        None => Ok(expiry::refresh_interval()),
    }
}

/// Renders the output of `sign`
pub fn sign_output(params: &[String], algorithm: HashAlgorithm) -> Result<String, CliError> {
    let pairs = params
        .iter()
        .map(|p| parse_param_arg(p))
        .collect::<Result<Vec<_>, _>>()?;
    let canonical = signing::params_to_string(pairs);
    let digest = signing::gen_hash(&canonical, algorithm);
    Ok(format!("{}\n{}", canonical, digest))
}

/// Runs a store command against an open store and returns its output
pub async fn execute(command: &Command, store: &mut Store) -> Result<String, CliError> {
    match command {
        Command::Get { key } => {
            let value = store
                .get(key)
                .ok_or_else(|| CliError::NotFound(key.clone()))?;
            Ok(serde_json::to_string_pretty(value)?)
        }
        Command::Set { key, value } => {
            store.set(key.clone(), parse_value_arg(value));
            // The process exits right after, so wait for durability here
            store.flush().await?;
            Ok(String::new())
        }
        Command::Expired { key, window_secs } => {
            let expired = store.is_expired(key, window_from_secs(*window_secs)?);
            Ok(expired.to_string())
        }
        Command::Keys => Ok(store.keys().collect::<Vec<_>>().join("\n")),
        Command::Sign { params, algorithm } => sign_output(params, *algorithm),
    }
}

/// Resolves configuration, opens the store when the command needs one, and runs it
pub async fn run(cli: &Cli) -> Result<String, CliError> {
    if let Command::Sign { params, algorithm } = &cli.command {
        return sign_output(params, *algorithm);
    }

    let config = cli.store_config()?;
    let mut store = Store::open_file(&config).await?;
    let output = execute(&cli.command, &mut store).await;
    store.destroy().await?;
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use serde_json::json;
    use tempfile::TempDir;

    async fn memory_store() -> Store {
        Store::open(MemoryBackend::new())
            .await
            .expect("Memory store should open")
    }

    #[test]
    fn test_parse_param_arg_splits_on_first_equals() {
        assert_eq!(
            parse_param_arg("url=http://x/?a=1").unwrap(),
            ("url".to_string(), "http://x/?a=1".to_string())
        );
        assert_eq!(parse_param_arg("empty=").unwrap(), ("empty".to_string(), String::new()));
    }

    #[test]
    fn test_parse_param_arg_invalid() {
        let err = parse_param_arg("novalue").unwrap_err();
        assert!(err.to_string().contains("Invalid parameter"));
        assert!(err.to_string().contains("novalue"));
        assert!(parse_param_arg("=value").is_err());
    }

    #[test]
    fn test_parse_value_arg() {
        assert_eq!(parse_value_arg(r#"{"token":"abc"}"#), json!({"token": "abc"}));
        assert_eq!(parse_value_arg("42"), json!(42));
        assert_eq!(parse_value_arg("plain text"), json!("plain text"));
    }

    #[test]
    fn test_window_from_secs() {
        assert_eq!(window_from_secs(Some(30)).unwrap(), Duration::seconds(30));
        assert_eq!(window_from_secs(None).unwrap(), expiry::refresh_interval());
    }

    #[test]
    fn test_window_from_secs_out_of_range() {
        let err = window_from_secs(Some(i64::MAX)).unwrap_err();
        assert!(matches!(err, CliError::InvalidWindow(i64::MAX)));
        assert!(err.to_string().contains("out of range"));
        assert!(window_from_secs(Some(i64::MIN)).is_err());
    }

    #[test]
    fn test_sign_output() {
        let params = vec!["B=2".to_string(), "a=1".to_string()];
        let output = sign_output(&params, HashAlgorithm::Sha1).unwrap();
        assert_eq!(output, "a=1&b=2\nd53cf64e768f4ef09c806bbe12258c78211b2690");
    }

    #[test]
    fn test_cli_parse_get() {
        let cli = Cli::parse_from(["credcache", "get", "accessToken"]);
        assert_eq!(
            cli.command,
            Command::Get {
                key: "accessToken".to_string()
            }
        );
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "credcache",
            "keys",
            "--store-path",
            "/tmp/s.json",
            "--backup-corrupt",
        ]);
        assert_eq!(cli.store_path, Some(PathBuf::from("/tmp/s.json")));
        assert!(cli.backup_corrupt);
    }

    #[test]
    fn test_cli_parse_sign_algorithm() {
        let cli = Cli::parse_from(["credcache", "sign", "--algorithm", "sha256", "a=1"]);
        match cli.command {
            Command::Sign { algorithm, params } => {
                assert_eq!(algorithm, HashAlgorithm::Sha256);
                assert_eq!(params, vec!["a=1".to_string()]);
            }
            other => panic!("Expected sign command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_algorithm() {
        let result = Cli::try_parse_from(["credcache", "sign", "--algorithm", "md5", "a=1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_store_config_flags_override_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.json");
        std::fs::write(&config_path, r#"{"storePath": "/from/file.json"}"#)
            .expect("Should write config");

        let cli = Cli::parse_from([
            "credcache",
            "--config",
            config_path.to_str().unwrap(),
            "--store-path",
            "/from/flag.json",
            "--backup-corrupt",
            "keys",
        ]);
        let config = cli.store_config().expect("Config should load");

        assert_eq!(config.store_path, Some(PathBuf::from("/from/flag.json")));
        assert_eq!(config.corrupt_policy, CorruptFilePolicy::Backup);
    }

    #[test]
    fn test_store_config_from_file_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.json");
        std::fs::write(&config_path, r#"{"storePath": "/from/file.json"}"#)
            .expect("Should write config");

        let cli = Cli::parse_from(["credcache", "--config", config_path.to_str().unwrap(), "keys"]);
        let config = cli.store_config().expect("Config should load");

        assert_eq!(config.store_path, Some(PathBuf::from("/from/file.json")));
        assert_eq!(config.corrupt_policy, CorruptFilePolicy::Keep);
    }

    #[tokio::test]
    async fn test_execute_set_then_get() {
        let mut store = memory_store().await;

        let set = Command::Set {
            key: "accessToken".to_string(),
            value: r#"{"token":"abc"}"#.to_string(),
        };
        assert_eq!(execute(&set, &mut store).await.unwrap(), "");

        let get = Command::Get {
            key: "accessToken".to_string(),
        };
        let output = execute(&get, &mut store).await.unwrap();
        let parsed: Value = serde_json::from_str(&output).expect("Output should be JSON");
        assert_eq!(parsed, json!({"token": "abc"}));
    }

    #[tokio::test]
    async fn test_execute_get_missing_is_not_found() {
        let mut store = memory_store().await;
        let get = Command::Get {
            key: "accessToken".to_string(),
        };

        let err = execute(&get, &mut store).await.unwrap_err();

        assert!(matches!(err, CliError::NotFound(ref k) if k == "accessToken"));
    }

    #[tokio::test]
    async fn test_execute_expired() {
        let mut store = memory_store().await;
        let expired = Command::Expired {
            key: "accessToken".to_string(),
            window_secs: None,
        };
        assert_eq!(execute(&expired, &mut store).await.unwrap(), "true");

        store.set("accessToken", json!("abc"));
        assert_eq!(execute(&expired, &mut store).await.unwrap(), "false");
    }

    #[tokio::test]
    async fn test_execute_keys() {
        let mut store = memory_store().await;
        store.set("b", json!(1));
        store.set("a", json!(2));

        assert_eq!(execute(&Command::Keys, &mut store).await.unwrap(), "a\nb");
    }
}
