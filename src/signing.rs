//! Signature helpers used by callers of the remote API
//!
//! Signed requests are built from a canonical parameter string (lower-cased
//! keys, ASCII order, no URL encoding) hashed to a hex digest. None of this
//! touches the store; it lives here so every caller derives signatures the
//! same way.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use rand::Rng;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Characters used for nonce strings
const NONCE_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of generated nonce strings
pub const NONCE_LEN: usize = 15;

/// Digest algorithms supported by `gen_hash`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// SHA-1, used by the remote service for request signatures
    #[default]
    Sha1,
    /// SHA-256
    Sha256,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha1 => write!(f, "sha1"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(HashAlgorithm::Sha1),
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            other => Err(format!(
                "Unsupported hash algorithm: '{}'. Valid algorithms: sha1, sha256",
                other
            )),
        }
    }
}

/// Computes the lowercase hex digest of `content`
///
/// # Arguments
/// * `content` - Bytes to digest
/// * `algorithm` - Digest algorithm to apply
pub fn gen_hash(content: impl AsRef<[u8]>, algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(content.as_ref());
            hex::encode(hasher.finalize())
        }
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(content.as_ref());
            hex::encode(hasher.finalize())
        }
    }
}

/// Computes the SHA-1 hex digest of `content`
pub fn gen_sha1(content: impl AsRef<[u8]>) -> String {
    gen_hash(content, HashAlgorithm::Sha1)
}

/// Builds the canonical parameter string used as signature input
///
/// Keys are lower-cased and sorted in ascending byte order, then joined as
/// `key=value` pairs separated by `&`. Nothing is URL-encoded. When two keys
/// collide after lower-casing, both pairs are kept, ordered by value.
///
/// # Example
/// ```
/// use credcache::signing::params_to_string;
///
/// assert_eq!(params_to_string([("B", "2"), ("a", "1")]), "a=1&b=2");
/// ```
pub fn params_to_string<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: fmt::Display,
{
    let mut pairs: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_lowercase(), v.to_string()))
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Generates a random nonce of lowercase base-36 characters
pub fn nonce_str() -> String {
    let mut rng = rand::thread_rng();
    (0..NONCE_LEN)
        .map(|_| NONCE_CHARSET[rng.gen_range(0..NONCE_CHARSET.len())] as char)
        .collect()
}

/// Current Unix time in whole seconds, formatted as a string
pub fn timestamp() -> String {
    Utc::now().timestamp().to_string()
}
