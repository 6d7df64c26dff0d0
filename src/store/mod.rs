//! Expiry-aware credential store
//!
//! `Store` keeps a small map of named entries in memory and mirrors it to a
//! durable backend. The in-memory map is authoritative: every `set` is
//! visible to the next `get` immediately, while the durable copy is written
//! in the background by the flush worker.
//!
//! Backends implement `StoreBackend`. Two ship with the crate:
//! `FileBackend` (JSON file, survives restarts) and `MemoryBackend`
//! (process-local, mostly for tests).

mod file;
mod flusher;
mod memory;

pub use file::FileBackend;
pub use flusher::{FlushOutcome, FlushReport};
pub use memory::MemoryBackend;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::expiry;
use flusher::Flusher;

/// A cached value together with the time it was last written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Entry {
    /// The cached value, in whatever shape the caller chose
    pub value: Value,
    /// When the value was last set
    #[serde(deserialize_with = "expiry::deserialize_timestamp")]
    pub modified_at: DateTime<Utc>,
}

impl Entry {
    /// Creates an entry stamped with the current time
    pub fn new(value: Value) -> Self {
        Self::at(value, Utc::now())
    }

    /// Creates an entry with an explicit modification time
    pub fn at(value: Value, modified_at: DateTime<Utc>) -> Self {
        Self { value, modified_at }
    }

    /// Whether more than `window` has passed since this entry was written
    pub fn is_expired_at(&self, window: Duration, now: DateTime<Utc>) -> bool {
        expiry::is_expired(self.modified_at, window, now)
    }
}

/// The full set of entries, keyed by name
pub type EntryMap = BTreeMap<String, Entry>;

/// Durable persistence for a store
///
/// The store owns all in-memory logic; a backend only knows how to load the
/// last durable map, replace it with a new one, and release its resources.
#[async_trait]
pub trait StoreBackend: Send + Sync + fmt::Debug + 'static {
    /// Loads the previously persisted map
    ///
    /// Backends bootstrap an empty durable state when none exists, and return
    /// `StoreError::LoadCorruption` when state exists but cannot be read back.
    async fn load(&self) -> Result<EntryMap, StoreError>;

    /// Replaces the durable state with `entries`
    ///
    /// A failed flush must leave the previous durable state intact.
    async fn flush(&self, entries: &EntryMap) -> Result<(), StoreError>;

    /// Releases backend resources; no flush follows
    async fn destroy(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Short human-readable description used in logs
    fn describe(&self) -> String;
}

/// Lifecycle of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Loading,
    Ready,
    Destroyed,
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreState::Uninitialized => "uninitialized",
            StoreState::Loading => "loading",
            StoreState::Ready => "ready",
            StoreState::Destroyed => "destroyed",
        };
        write!(f, "{}", name)
    }
}

/// In-memory entry map mirrored to a durable backend
///
/// A store has a single owner. Share it between tasks by wrapping it in a
/// `tokio::sync::Mutex` so read-modify-write sequences stay atomic.
#[derive(Debug)]
pub struct Store {
    entries: EntryMap,
    state: StoreState,
    backend: Arc<dyn StoreBackend>,
    flusher: Option<Flusher>,
}

impl Store {
    /// Opens a store over `backend`, loading any previously persisted entries
    ///
    /// Corrupt durable state is logged and replaced by an empty map; any other
    /// load error is returned. Must be called from within a tokio runtime.
    pub async fn open<B: StoreBackend>(backend: B) -> Result<Self, StoreError> {
        Self::open_shared(Arc::new(backend)).await
    }

    /// Opens a store over a shared backend handle
    pub async fn open_shared(backend: Arc<dyn StoreBackend>) -> Result<Self, StoreError> {
        let mut state = StoreState::Uninitialized;
        debug!(backend = %backend.describe(), %state, "opening store");

        state = StoreState::Loading;
        debug!(backend = %backend.describe(), %state, "loading persisted entries");

        let entries = match backend.load().await {
            Ok(entries) => entries,
            Err(StoreError::LoadCorruption { path, reason }) => {
                warn!(
                    path = %path.display(),
                    reason = %reason,
                    "persisted store is invalid, using an empty store instead"
                );
                EntryMap::new()
            }
            Err(e) => return Err(e),
        };

        state = StoreState::Ready;
        info!(
            backend = %backend.describe(),
            entries = entries.len(),
            %state,
            "store ready"
        );

        let flusher = Flusher::spawn(backend.clone());

        Ok(Self {
            entries,
            state,
            backend,
            flusher: Some(flusher),
        })
    }

    /// Opens a file-backed store using `config`
    pub async fn open_file(config: &StoreConfig) -> Result<Self, StoreError> {
        let backend = FileBackend::from_config(config)?;
        Self::open(backend).await
    }

    /// Current lifecycle state
    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Returns the value stored under `key`, or `None` if it was never set
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Returns the value under `key` deserialized as `T`
    ///
    /// `None` when the key is absent or the value does not have the shape of `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!(key = %key, error = %e, "cached value has an unexpected shape");
                None
            }
        }
    }

    /// Returns the full entry (value and modification time) under `key`
    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Whether an entry exists under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Names of all entries, in ascending order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only view of the entry map
    pub fn entries(&self) -> &EntryMap {
        &self.entries
    }

    /// Stores `value` under `key`, stamps it with the current time, and schedules a flush
    ///
    /// Returns as soon as the in-memory map is updated. Durability failures are
    /// reported through logs and `subscribe`, never to the caller.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if self.state == StoreState::Destroyed {
            warn!(key = %key, "ignoring set on a destroyed store");
            return;
        }

        self.entries.insert(key, Entry::new(value));
        self.schedule_flush();
    }

    /// Serializes `value` to JSON and stores it under `key`
    ///
    /// The map is left untouched if `value` cannot be serialized.
    pub fn set_serialized<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    /// Removes the entry under `key`, scheduling a flush if it existed
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.entries.remove(key)?;
        self.schedule_flush();
        Some(removed.value)
    }

    /// Whether the entry under `key` is missing or older than `window`
    pub fn is_expired(&self, key: &str, window: Duration) -> bool {
        self.is_expired_at(key, window, Utc::now())
    }

    /// Like `is_expired`, evaluated at an explicit instant
    pub fn is_expired_at(&self, key: &str, window: Duration, now: DateTime<Utc>) -> bool {
        match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(window, now),
            None => true,
        }
    }

    /// Writes the current map to the backend and waits for the outcome
    ///
    /// Resolves once a write covering the current state has completed. Safe to
    /// call when nothing changed.
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        let flusher = self.flusher.as_mut().ok_or(StoreError::Destroyed)?;
        let generation = flusher.schedule(&self.entries);
        flusher.wait_for(generation).await
    }

    /// Receiver that observes every completed flush
    ///
    /// After `destroy` the receiver reports the last state and then closes.
    pub fn subscribe(&self) -> watch::Receiver<FlushReport> {
        match &self.flusher {
            Some(flusher) => flusher.subscribe(),
            None => watch::channel(FlushReport {
                generation: 0,
                outcome: FlushOutcome::Pending,
                completed_at: None,
            })
            .1,
        }
    }

    /// The most recent flush report, if the store is still live
    pub fn last_flush(&self) -> Option<FlushReport> {
        self.flusher.as_ref().map(Flusher::last_report)
    }

    /// Clears the in-memory map, stops the flush worker, and releases the backend
    ///
    /// Snapshots not yet written are dropped; call `flush` first to persist the
    /// final state. Calling `destroy` again is a no-op.
    pub async fn destroy(&mut self) -> Result<(), StoreError> {
        if self.state == StoreState::Destroyed {
            return Ok(());
        }

        self.state = StoreState::Destroyed;
        self.entries.clear();

        if let Some(flusher) = self.flusher.take() {
            flusher.shutdown().await;
        }

        self.backend.destroy().await?;
        info!(backend = %self.backend.describe(), "store destroyed");
        Ok(())
    }

    fn schedule_flush(&mut self) {
        if let Some(flusher) = self.flusher.as_mut() {
            flusher.schedule(&self.entries);
        }
    }
}
