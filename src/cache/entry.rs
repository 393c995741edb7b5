//! Cache entry metadata and the pinned read handle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Persisted metadata for one stored file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex SHA-256 digest of the (namespaced) content
    pub key: String,
    /// File name inside the store directory
    pub file: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// When the entry was first stored
    pub created_at: DateTime<Utc>,
    /// Last time the entry was read or re-stored
    pub last_accessed_at: DateTime<Utc>,
    /// Number of reads and re-stores
    pub access_count: u64,
    /// Original file name, if one was supplied
    #[serde(default)]
    pub file_name: Option<String>,
}

impl CacheEntry {
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
        self.access_count += 1;
    }

    /// Age of the entry at `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }
}

/// Hints supplied when storing content
#[derive(Clone, Debug, Default)]
pub struct PutHint {
    /// Original file name; its extension is kept on disk
    pub file_name: Option<String>,
    /// Mixed into the digest so identical content in different namespaces gets different keys
    pub namespace: Option<String>,
}

impl PutHint {
    /// Hint carrying only a file name
    pub fn named(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            namespace: None,
        }
    }

    /// Set the namespace
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Shared between the index and every outstanding [`CachedFile`].
///
/// Removing an entry marks it doomed; the file goes away once the last holder drops.
#[derive(Debug)]
pub(crate) struct Pin {
    path: PathBuf,
    doomed: AtomicBool,
}

impl Pin {
    pub(crate) fn new(path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            path,
            doomed: AtomicBool::new(false),
        })
    }

    pub(crate) fn doom(&self) {
        self.doomed.store(true, Ordering::SeqCst);
    }

    /// True while any reader holds a handle (the index holds one reference itself)
    pub(crate) fn is_pinned(pin: &Arc<Self>) -> bool {
        Arc::strong_count(pin) > 1
    }
}

impl Drop for Pin {
    fn drop(&mut self) {
        if !self.doomed.load(Ordering::SeqCst) {
            return;
        }
        // Disk names are unique per write, so a late unlink never hits a re-stored entry
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || remove_doomed(&path));
            }
            Err(_) => remove_doomed(&path),
        }
    }
}

fn remove_doomed(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove evicted cache file");
        }
    }
}

/// Read handle for a stored file
///
/// While a handle is alive the store will not delete the underlying file, even if the
/// entry is evicted, deleted, or cleared in the meantime.
#[derive(Clone, Debug)]
pub struct CachedFile {
    key: String,
    path: PathBuf,
    size_bytes: u64,
    file_name: Option<String>,
    _pin: Arc<Pin>,
}

impl CachedFile {
    pub(crate) fn new(entry: &CacheEntry, path: PathBuf, pin: Arc<Pin>) -> Self {
        Self {
            key: entry.key.clone(),
            path,
            size_bytes: entry.size_bytes,
            file_name: entry.file_name.clone(),
            _pin: pin,
        }
    }

    /// Cache key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Location of the bytes on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Original file name, if known
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Read the whole file into memory
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Open the file for streaming
    pub async fn open(&self) -> std::io::Result<tokio::fs::File> {
        tokio::fs::File::open(&self.path).await
    }
}
