//! Remote credential source
//!
//! The store never talks to the network. Callers check `is_expired`, fetch a
//! fresh credential through a `CredentialSource` when needed, and write it
//! back with `set`. `refresh_if_expired` bundles that sequence.

use async_trait::async_trait;
use chrono::Duration;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::RemoteError;
use crate::store::Store;

/// Response field carrying the service's error code
pub const ERRCODE_FIELD: &str = "errcode";

/// Response field holding the access token by default
pub const DEFAULT_TOKEN_FIELD: &str = "access_token";

/// Rejects response bodies whose `errcode` field is present and not zero
///
/// Any numeric zero passes, including `0.0`.
///
/// # Returns
/// * `Ok(Value)` - The body, unchanged, when no error code is set
/// * `Err(RemoteError::Api)` - Carrying the code and the full body otherwise
///   (a code that is not an integer is reported as `-1`)
pub fn check_response(body: Value) -> Result<Value, RemoteError> {
    match body.get(ERRCODE_FIELD) {
        None => Ok(body),
        Some(code) if code.as_f64() == Some(0.0) => Ok(body),
        Some(code) => Err(RemoteError::Api {
            code: code.as_i64().unwrap_or(-1),
            body,
        }),
    }
}

/// Pulls a required field out of a response body
pub fn extract_field(body: &Value, field: &str) -> Result<Value, RemoteError> {
    body.get(field)
        .cloned()
        .ok_or_else(|| RemoteError::MissingField(field.to_string()))
}

/// Thin JSON client for the remote service
#[derive(Debug, Clone, Default)]
pub struct RemoteClient {
    client: Client,
}

impl RemoteClient {
    /// Create a new RemoteClient with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new RemoteClient with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// The underlying HTTP client, for building requests
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Sends `request`, decodes the JSON body, and applies `check_response`
    pub async fn send(&self, request: RequestBuilder) -> Result<Value, RemoteError> {
        let result = send_json(request).await;
        if let Err(e) = &result {
            debug!(error = %e, "remote request failed");
        }
        result
    }
}

async fn send_json(request: RequestBuilder) -> Result<Value, RemoteError> {
    let response = request.send().await?;
    let text = response.text().await?;
    let body: Value = serde_json::from_str(&text)?;
    check_response(body)
}

/// Anything that can produce a fresh credential value
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Requests a new credential from the remote service
    async fn fetch(&self) -> Result<Value, RemoteError>;
}

/// Credential source backed by an HTTP GET to a token endpoint
#[derive(Debug, Clone)]
pub struct HttpCredentialSource {
    remote: RemoteClient,
    url: String,
    query: Vec<(String, String)>,
    token_field: String,
}

impl HttpCredentialSource {
    /// Creates a source that GETs `url` and reads `access_token` from the response
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            remote: RemoteClient::new(),
            url: url.into(),
            query: Vec::new(),
            token_field: DEFAULT_TOKEN_FIELD.to_string(),
        }
    }

    /// Adds a query parameter to the token request
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Reads the credential from a different response field
    pub fn with_token_field(mut self, field: impl Into<String>) -> Self {
        self.token_field = field.into();
        self
    }

    /// Uses a custom client
    pub fn with_remote(mut self, remote: RemoteClient) -> Self {
        self.remote = remote;
        self
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fetch(&self) -> Result<Value, RemoteError> {
        let request = self.remote.http().get(&self.url).query(&self.query);
        let body = self.remote.send(request).await?;
        extract_field(&body, &self.token_field)
    }
}

/// Returns the cached credential under `key`, refreshing it first if it is missing or stale
///
/// A failed fetch is returned to the caller and leaves the store untouched.
pub async fn refresh_if_expired(
    store: &mut Store,
    key: &str,
    window: Duration,
    source: &dyn CredentialSource,
) -> Result<Value, RemoteError> {
    if !store.is_expired(key, window) {
        if let Some(value) = store.get(key) {
            debug!(key = %key, "using cached credential");
            return Ok(value.clone());
        }
    }

    info!(key = %key, "credential missing or expired, fetching a fresh one");
    let fresh = source.fetch().await?;
    store.set(key, fresh.clone());
    Ok(fresh)
}
