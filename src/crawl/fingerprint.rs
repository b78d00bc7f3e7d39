//! Persistent per-file fingerprint map
//!
//! The map is the sole source of truth for "have we seen this remote
//! file"; the download directory is only a cache. Each entry keys a
//! remote path to its observed (size, last-modified) pair and, after a
//! successful download, the content hash. Permanently failed paths are
//! parked until their entry is evicted by hand.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Observed state of one remote file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFingerprint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    /// SHA-256 of the downloaded content, set on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Set when the remote answered 4xx; the path is skipped until the
    /// entry is evicted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_error: Option<String>,
}

/// Fingerprint map persisted as a JSON key-value file
#[derive(Debug)]
pub struct FingerprintMap {
    path: PathBuf,
    entries: HashMap<String, FileFingerprint>,
}

impl FingerprintMap {
    /// Load the map, starting empty when the file does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };

        debug!(entries = entries.len(), "loaded fingerprint map");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Persist the map atomically (write-then-rename)
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&self.entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Download decision: unseen paths and paths whose (size,
    /// last-modified) changed are downloaded; terminally failed paths
    /// are not retried
    pub fn needs_download(
        &self,
        remote_path: &str,
        size: Option<u64>,
        last_modified: Option<&str>,
    ) -> bool {
        match self.entries.get(remote_path) {
            None => true,
            Some(entry) if entry.terminal_error.is_some() => false,
            Some(entry) => {
                entry.size != size || entry.last_modified.as_deref() != last_modified
            }
        }
    }

    /// Record a successful download with its content hash
    pub fn record_success(
        &mut self,
        remote_path: &str,
        size: Option<u64>,
        last_modified: Option<String>,
        content_hash: String,
    ) {
        self.entries.insert(
            remote_path.to_string(),
            FileFingerprint {
                size,
                last_modified,
                content_hash: Some(content_hash),
                terminal_error: None,
            },
        );
    }

    /// Park a path after a permanent remote failure
    pub fn record_terminal(&mut self, remote_path: &str, reason: &str) {
        let entry = self.entries.entry(remote_path.to_string()).or_default();
        entry.terminal_error = Some(reason.to_string());
    }

    pub fn get(&self, remote_path: &str) -> Option<&FileFingerprint> {
        self.entries.get(remote_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
