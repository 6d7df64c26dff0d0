//! Error types shared across the crate
//!
//! Store errors never reach callers of the read path: absence and expiry are
//! ordinary states, and durability problems are reported through logs and
//! flush reports. The variants below surface where a caller explicitly asks
//! for an outcome (opening a store, awaiting a flush, talking to the remote
//! credential source).

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

/// Errors produced by the store and its backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem or other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Durable state exists but could not be parsed
    #[error("Stored state at {path} is corrupt: {reason}")]
    LoadCorruption {
        /// Location of the unparseable state
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// A durable write did not complete
    #[error("Flush failed: {0}")]
    FlushFailure(String),

    /// The store has been destroyed and accepts no further work
    #[error("Store has been destroyed")]
    Destroyed,

    /// The store location could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors produced while requesting a credential from the remote service
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The service answered with a nonzero error code
    #[error("Remote service returned error code {code}: {body}")]
    Api {
        /// Value of the `errcode` field
        code: i64,
        /// Full response body
        body: Value,
    },

    /// Missing expected field in response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),
}

/// Errors produced while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for `StoreConfig`
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The working directory needed to resolve a relative path is unavailable
    #[error("Cannot determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_error_message_includes_code_and_body() {
        let err = RemoteError::Api {
            code: 40001,
            body: json!({"errcode": 40001, "errmsg": "invalid credential"}),
        };

        let message = err.to_string();
        assert!(message.contains("40001"));
        assert!(message.contains("invalid credential"));
    }

    #[test]
    fn test_load_corruption_message_names_path() {
        let err = StoreError::LoadCorruption {
            path: PathBuf::from("/tmp/store.json"),
            reason: "expected value at line 1 column 1".to_string(),
        };

        assert!(err.to_string().contains("/tmp/store.json"));
    }

    #[test]
    fn test_io_error_converts_into_store_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
