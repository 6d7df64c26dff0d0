//! JSON file backend
//!
//! The whole entry map lives in one pretty-printed JSON file. Writes go to a
//! sibling `.tmp` file which is synced and then renamed over the target, so
//! the durable file is always either the previous state or the new one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::{Entry, EntryMap, StoreBackend};
use crate::config::{CorruptFilePolicy, StoreConfig};
use crate::error::{ConfigError, StoreError};

/// On-disk form of a single top-level value
///
/// Files written by this crate always hold full entries. A bare value (from a
/// flat, caller-defined schema) is accepted and treated as written at the Unix
/// epoch, so it reads as expired until it is set again. An object carrying
/// fields beyond `value` and `modifiedAt` is kept whole as a bare value.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PersistedEntry {
    Entry(Entry),
    Bare(Value),
}

impl From<PersistedEntry> for Entry {
    fn from(persisted: PersistedEntry) -> Self {
        match persisted {
            PersistedEntry::Entry(entry) => entry,
            PersistedEntry::Bare(value) => Entry::at(value, DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

/// Store backend persisting entries to a JSON file
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    corrupt_policy: CorruptFilePolicy,
}

impl FileBackend {
    /// Creates a backend writing to `path` with the default corrupt-file policy
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            corrupt_policy: CorruptFilePolicy::default(),
        }
    }

    /// Creates a backend from configuration, resolving the path against the working directory
    pub fn from_config(config: &StoreConfig) -> Result<Self, ConfigError> {
        let path = config.resolve_store_path()?;
        Ok(Self::new(path).with_corrupt_policy(config.corrupt_policy))
    }

    /// Sets what happens to an unparseable store file
    pub fn with_corrupt_policy(mut self, policy: CorruptFilePolicy) -> Self {
        self.corrupt_policy = policy;
        self
    }

    /// Location of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{}", Utc::now().timestamp_millis()));
        self.path.with_file_name(name)
    }

    /// Parses file contents into an entry map
    fn parse(content: &[u8]) -> Result<EntryMap, serde_json::Error> {
        let persisted: BTreeMap<String, PersistedEntry> = serde_json::from_slice(content)?;
        Ok(persisted
            .into_iter()
            .map(|(key, entry)| (key, Entry::from(entry)))
            .collect())
    }

    /// Applies the corrupt-file policy and builds the corruption error
    async fn handle_corruption(&self, reason: String) -> StoreError {
        match self.corrupt_policy {
            CorruptFilePolicy::Keep => {
                warn!(
                    path = %self.path.display(),
                    "store file is invalid, leaving it in place until the next flush"
                );
            }
            CorruptFilePolicy::Backup => {
                let backup = self.backup_path();
                match fs::rename(&self.path, &backup).await {
                    Ok(()) => warn!(
                        path = %self.path.display(),
                        backup = %backup.display(),
                        "store file is invalid, moved it aside"
                    ),
                    Err(e) => error!(
                        path = %self.path.display(),
                        error = %e,
                        "failed to back up invalid store file"
                    ),
                }
            }
        }

        StoreError::LoadCorruption {
            path: self.path.clone(),
            reason,
        }
    }

    /// Writes `entries` to the temp file, syncs it, and renames it over the store file
    async fn write_atomic(&self, entries: &EntryMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.tmp_path();

        if let Err(e) = write_synced(&tmp_path, contents.as_bytes()).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), entries = entries.len(), "store file written");
        Ok(())
    }
}

/// Creates `path`, writes `contents`, and syncs it to disk
async fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = fs::set_permissions(path, perms).await {
            warn!(path = %path.display(), error = %e, "failed to set store file permissions to 0600");
        }
    }

    Ok(())
}

#[async_trait]
impl StoreBackend for FileBackend {
    async fn load(&self) -> Result<EntryMap, StoreError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let entries = EntryMap::new();
                self.write_atomic(&entries).await?;
                info!(path = %self.path.display(), "created empty store file");
                return Ok(entries);
            }
            Err(e) => return Err(e.into()),
        };

        match Self::parse(&content) {
            Ok(entries) => {
                debug!(path = %self.path.display(), entries = entries.len(), "loaded store file");
                Ok(entries)
            }
            Err(e) => Err(self.handle_corruption(e.to_string()).await),
        }
    }

    async fn flush(&self, entries: &EntryMap) -> Result<(), StoreError> {
        self.write_atomic(entries).await
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        let tmp_path = self.tmp_path();
        match fs::remove_file(&tmp_path).await {
            Ok(()) => debug!(path = %tmp_path.display(), "removed stale temp file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %tmp_path.display(), error = %e, "failed to remove temp file"),
        }
        debug!(path = %self.path.display(), "file backend destroyed");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
