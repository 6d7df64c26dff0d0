//! Process-local backend
//!
//! Keeps the "durable" map in memory. Clones share state, so a test can hold
//! one handle while the store owns another and inspect what was flushed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{EntryMap, StoreBackend};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct MemoryState {
    persisted: Option<EntryMap>,
    flush_count: usize,
    fail_flushes: bool,
    flush_delay: Option<Duration>,
    destroyed: bool,
}

/// Store backend that keeps its state in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    /// Creates an empty backend with nothing persisted yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds `entries`
    pub fn with_entries(entries: EntryMap) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                persisted: Some(entries),
                ..Default::default()
            })),
        }
    }

    /// The last successfully flushed map, if any
    pub async fn persisted(&self) -> Option<EntryMap> {
        self.state.lock().await.persisted.clone()
    }

    /// Number of successful flushes
    pub async fn flush_count(&self) -> usize {
        self.state.lock().await.flush_count
    }

    /// Makes subsequent flushes fail (or succeed again)
    pub async fn set_fail_flushes(&self, fail: bool) {
        self.state.lock().await.fail_flushes = fail;
    }

    /// Delays every flush, simulating a slow durable target
    pub async fn set_flush_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.flush_delay = delay;
    }

    /// Whether `destroy` has been called
    pub async fn is_destroyed(&self) -> bool {
        self.state.lock().await.destroyed
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn load(&self) -> Result<EntryMap, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.persisted.get_or_insert_with(EntryMap::new).clone())
    }

    async fn flush(&self, entries: &EntryMap) -> Result<(), StoreError> {
        let delay = self.state.lock().await.flush_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        if state.fail_flushes {
            return Err(StoreError::FlushFailure("simulated write error".to_string()));
        }

        state.persisted = Some(entries.clone());
        state.flush_count += 1;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        self.state.lock().await.destroyed = true;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
