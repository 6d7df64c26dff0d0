//! credcache - persistent, expiry-aware cache for remote service credentials
//!
//! The `store` module holds the cache itself; `remote` and `signing` are the
//! helpers callers use around it. The `cli` module backs the `credcache` binary.

pub mod cli;
pub mod config;
pub mod error;
pub mod expiry;
pub mod remote;
pub mod signing;
pub mod store;

pub use config::{CorruptFilePolicy, StoreConfig};
pub use error::{ConfigError, RemoteError, StoreError};
pub use store::{Entry, EntryMap, FileBackend, MemoryBackend, Store, StoreBackend, StoreState};
