//! Content-addressed file cache with age and size bounds
//!
//! Two stores exist at runtime: the upload store for source documents and the result
//! store for produced outputs. Both are instances of [`CacheStore`]; only their
//! directory and limits differ.
//!
//! Keys are hex SHA-256 digests of the stored bytes, optionally prefixed by a
//! namespace, so storing identical content twice yields the same key and the existing
//! entry is reused. Content is streamed into a temporary file while hashing and then
//! renamed into place.
//!
//! The index lives in memory behind a [`tokio::sync::RwLock`] and is mirrored to
//! `cache_index.json` in the store directory after every mutation so entries survive
//! restarts.

mod entry;
mod eviction;


pub use entry::{CacheEntry, CachedFile, PutHint};
pub use eviction::EvictionReason;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};

use crate::config::CacheLimits;
use crate::error::{CacheError, Error, Result};
use crate::types::{CacheRole, CacheStats};
use entry::Pin;
use eviction::Candidate;

/// Name of the persisted index inside each store directory
pub const INDEX_FILE: &str = "cache_index.json";

const TEMP_PREFIX: &str = ".tmp-";
const COPY_BUFFER: usize = 64 * 1024;

struct Slot {
    entry: CacheEntry,
    pin: Arc<Pin>,
}

impl Slot {
    fn candidate(&self) -> Candidate {
        Candidate {
            key: self.entry.key.clone(),
            size_bytes: self.entry.size_bytes,
            created_at: self.entry.created_at,
            last_accessed_at: self.entry.last_accessed_at,
            pinned: Pin::is_pinned(&self.pin),
        }
    }
}

struct StoreInner {
    role: CacheRole,
    dir: PathBuf,
    limits: CacheLimits,
    max_file_size: Option<u64>,
    index: RwLock<HashMap<String, Slot>>,
    /// Serializes index writes so snapshots land on disk in order
    persist_lock: Mutex<()>,
}

/// Outcome of a [`CacheStore::sweep`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries removed for exceeding the maximum age
    pub expired: usize,
    /// Entries removed to get back under capacity
    pub evicted: usize,
    /// Bytes released by this sweep
    pub freed_bytes: u64,
    /// Expired entries kept because a reader still holds them
    pub pinned_skipped: usize,
    /// Total bytes left in the store
    pub remaining_bytes: u64,
}

impl SweepReport {
    /// True when the sweep removed nothing
    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.evicted == 0
    }
}

/// One age/size-bounded key to file mapping
///
/// Cloning is cheap; clones share the same index.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("role", &self.inner.role)
            .field("dir", &self.inner.dir)
            .field("limits", &self.inner.limits)
            .finish()
    }
}

impl CacheStore {
    /// Open (or create) a store in `dir`, reloading its persisted index
    ///
    /// Index entries whose file has vanished are dropped, as are leftover temporary
    /// files from interrupted writes. A corrupt index is logged and discarded.
    pub async fn open(
        role: CacheRole,
        dir: impl Into<PathBuf>,
        limits: CacheLimits,
        max_file_size: Option<u64>,
    ) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        remove_temp_files(&dir).await;
        let entries = load_index(role, &dir).await;

        let mut index = HashMap::with_capacity(entries.len());
        let mut dropped = 0usize;
        for entry in entries {
            let path = dir.join(&entry.file);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                let pin = Pin::new(path);
                index.insert(entry.key.clone(), Slot { entry, pin });
            } else {
                dropped += 1;
            }
        }

        tracing::info!(
            cache = %role,
            dir = %dir.display(),
            entries = index.len(),
            dropped,
            "cache store opened"
        );

        let store = Self {
            inner: Arc::new(StoreInner {
                role,
                dir,
                limits,
                max_file_size,
                index: RwLock::new(index),
                persist_lock: Mutex::new(()),
            }),
        };

        if dropped > 0 {
            store.persist().await;
        }

        Ok(store)
    }

    /// Store role
    pub fn role(&self) -> CacheRole {
        self.inner.role
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Configured limits
    pub fn limits(&self) -> CacheLimits {
        self.inner.limits
    }

    /// Largest single file accepted, if limited
    pub fn max_file_size(&self) -> Option<u64> {
        self.inner.max_file_size
    }

    /// Store an in-memory buffer
    pub async fn put_bytes(&self, bytes: &[u8], hint: PutHint) -> Result<String> {
        self.check_size(bytes.len() as u64)?;
        self.put_reader(bytes, hint).await
    }

    /// Copy an existing file into the store
    pub async fn put_file(&self, path: impl AsRef<Path>, hint: PutHint) -> Result<String> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        self.check_size(file.metadata().await?.len())?;

        let hint = if hint.file_name.is_none() {
            PutHint {
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned()),
                ..hint
            }
        } else {
            hint
        };

        self.put_reader(file, hint).await
    }

    /// Stream content into the store, returning its key
    ///
    /// Identical content in the same namespace resolves to the existing entry, which
    /// is touched instead of rewritten. If the store goes over capacity the least
    /// recently used unpinned entries are evicted right away.
    pub async fn put_reader<R>(&self, mut reader: R, hint: PutHint) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let temp_path = self
            .inner
            .dir
            .join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4().simple()));

        let written = self.write_temp(&mut reader, &temp_path, &hint).await;
        let (key, size) = match written {
            Ok(v) => v,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        let now = Utc::now();
        let mut index = self.inner.index.write().await;

        if let Some(slot) = index.get_mut(&key) {
            slot.entry.touch(now);
            drop(index);
            let _ = tokio::fs::remove_file(&temp_path).await;
            tracing::debug!(cache = %self.inner.role, key = %key, "content already cached");
            self.persist().await;
            return Ok(key);
        }

        let file = disk_name(&key, hint.file_name.as_deref());
        let final_path = self.inner.dir.join(&file);
        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            drop(index);
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(CacheError::WriteFailed {
                path: final_path,
                reason: e.to_string(),
            }
            .into());
        }

        let entry = CacheEntry {
            key: key.clone(),
            file,
            size_bytes: size,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            file_name: hint.file_name.clone(),
        };
        index.insert(
            key.clone(),
            Slot {
                entry,
                pin: Pin::new(final_path),
            },
        );

        let total: u64 = index.values().map(|s| s.entry.size_bytes).sum();
        let candidates: Vec<Candidate> = index.values().map(Slot::candidate).collect();
        let overflow =
            eviction::plan_capacity(&candidates, total, self.inner.limits.capacity_bytes, Some(&key));
        let mut removed = Vec::with_capacity(overflow.len());
        for victim in &overflow {
            if let Some(slot) = index.remove(victim) {
                slot.pin.doom();
                removed.push(slot);
            }
        }
        drop(index);

        if !removed.is_empty() {
            tracing::info!(
                cache = %self.inner.role,
                evicted = removed.len(),
                freed_bytes = removed.iter().map(|s| s.entry.size_bytes).sum::<u64>(),
                "evicted least recently used entries to make room"
            );
        }
        drop(removed);

        tracing::debug!(cache = %self.inner.role, key = %key, size, "stored cache entry");
        self.persist().await;
        Ok(key)
    }

    /// Look up an entry, refreshing its access time
    ///
    /// The returned handle pins the file until dropped. An entry whose file was
    /// removed behind the store's back is dropped from the index and reported missing.
    pub async fn get(&self, key: &str) -> Result<CachedFile> {
        let mut index = self.inner.index.write().await;
        let Some(slot) = index.get_mut(key) else {
            return Err(self.not_found(key));
        };

        let path = self.inner.dir.join(&slot.entry.file);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            index.remove(key);
            drop(index);
            tracing::warn!(cache = %self.inner.role, key = %key, "cache file vanished, dropping entry");
            self.persist().await;
            return Err(self.not_found(key));
        }

        slot.entry.touch(Utc::now());
        let handle = CachedFile::new(&slot.entry, path, Arc::clone(&slot.pin));
        drop(index);

        self.persist().await;
        Ok(handle)
    }

    /// Whether `key` is present and its file exists, without touching it
    pub async fn contains(&self, key: &str) -> bool {
        let path = {
            let index = self.inner.index.read().await;
            match index.get(key) {
                Some(slot) => self.inner.dir.join(&slot.entry.file),
                None => return false,
            }
        };
        tokio::fs::try_exists(&path).await.unwrap_or(false)
    }

    /// Metadata of one entry, without touching it
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.inner
            .index
            .read()
            .await
            .get(key)
            .map(|slot| slot.entry.clone())
    }

    /// Remove one entry
    ///
    /// If a reader holds the entry its file is removed once the last handle drops.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let removed = self.inner.index.write().await.remove(key);
        match removed {
            Some(slot) => {
                slot.pin.doom();
                drop(slot);
                tracing::debug!(cache = %self.inner.role, key = %key, "deleted cache entry");
                self.persist().await;
                Ok(())
            }
            None => Err(self.not_found(key)),
        }
    }

    /// Remove every entry, returning how many were removed
    pub async fn clear(&self) -> usize {
        let drained: Vec<Slot> = {
            let mut index = self.inner.index.write().await;
            index.drain().map(|(_, slot)| slot).collect()
        };
        let count = drained.len();
        for slot in &drained {
            slot.pin.doom();
        }
        drop(drained);

        tracing::info!(cache = %self.inner.role, removed = count, "cache cleared");
        self.persist().await;
        count
    }

    /// Usage statistics
    pub async fn stats(&self) -> CacheStats {
        let index = self.inner.index.read().await;
        let total: u64 = index.values().map(|s| s.entry.size_bytes).sum();
        let capacity = self.inner.limits.capacity_bytes;
        let usage_percent = if capacity > 0 {
            ((total as f64 / capacity as f64) * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        CacheStats {
            role: self.inner.role,
            entry_count: index.len(),
            total_size_bytes: total,
            capacity_bytes: capacity,
            max_age: self.inner.limits.max_age,
            usage_percent,
            cache_dir: self.inner.dir.display().to_string(),
        }
    }

    /// Evict expired entries, then least recently used ones until under capacity
    ///
    /// Entries held by a reader are skipped. Running it twice in a row removes nothing
    /// the second time.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    pub(crate) async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let plan = {
            let index = self.inner.index.read().await;
            let candidates: Vec<Candidate> = index.values().map(Slot::candidate).collect();
            eviction::plan_sweep(&candidates, &self.inner.limits, now)
        };

        let mut report = SweepReport {
            pinned_skipped: plan.pinned_skipped,
            ..Default::default()
        };

        for (key, reason) in plan.evict {
            let removed = {
                let mut index = self.inner.index.write().await;
                // The entry may have been read since planning
                match index.get(&key) {
                    Some(slot) if !Pin::is_pinned(&slot.pin) => index.remove(&key),
                    Some(_) => {
                        report.pinned_skipped += 1;
                        None
                    }
                    None => None,
                }
            };

            if let Some(slot) = removed {
                slot.pin.doom();
                report.freed_bytes += slot.entry.size_bytes;
                match reason {
                    EvictionReason::Expired => report.expired += 1,
                    EvictionReason::OverCapacity => report.evicted += 1,
                }
                tracing::debug!(
                    cache = %self.inner.role,
                    key = %key,
                    reason = ?reason,
                    "evicted cache entry"
                );
            }
        }

        report.remaining_bytes = self
            .inner
            .index
            .read()
            .await
            .values()
            .map(|s| s.entry.size_bytes)
            .sum();

        if !report.is_empty() {
            tracing::info!(
                cache = %self.inner.role,
                expired = report.expired,
                evicted = report.evicted,
                freed_bytes = report.freed_bytes,
                remaining_bytes = report.remaining_bytes,
                "cache sweep complete"
            );
            self.persist().await;
        }

        report
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if let Some(limit) = self.inner.max_file_size
            && size > limit
        {
            return Err(Error::FileTooLarge { size, limit });
        }
        if size > self.inner.limits.capacity_bytes {
            return Err(CacheError::CapacityExceeded {
                store: self.inner.role.to_string(),
                required: size,
                capacity: self.inner.limits.capacity_bytes,
            }
            .into());
        }
        Ok(())
    }

    async fn write_temp<R>(
        &self,
        reader: &mut R,
        temp_path: &Path,
        hint: &PutHint,
    ) -> Result<(String, u64)>
    where
        R: AsyncRead + Unpin,
    {
        let write_failed = |e: std::io::Error| -> Error {
            CacheError::WriteFailed {
                path: temp_path.to_path_buf(),
                reason: e.to_string(),
            }
            .into()
        };

        let mut file = tokio::fs::File::create(temp_path)
            .await
            .map_err(write_failed)?;

        let mut hasher = Sha256::new();
        if let Some(namespace) = &hint.namespace {
            hasher.update(namespace.as_bytes());
            hasher.update([0u8]);
        }

        let mut buf = vec![0u8; COPY_BUFFER];
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            size += n as u64;
            self.check_size(size)?;
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await.map_err(write_failed)?;
        }

        file.flush().await.map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;

        Ok((hex(&hasher.finalize()), size))
    }

    fn not_found(&self, key: &str) -> Error {
        CacheError::NotFound {
            store: self.inner.role.to_string(),
            key: key.to_string(),
        }
        .into()
    }

    async fn persist(&self) {
        let _guard = self.inner.persist_lock.lock().await;

        let mut entries: Vec<CacheEntry> = {
            let index = self.inner.index.read().await;
            index.values().map(|s| s.entry.clone()).collect()
        };
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));

        let json = match serde_json::to_vec_pretty(&entries) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(cache = %self.inner.role, error = %e, "failed to serialize cache index");
                return;
            }
        };

        let path = self.inner.dir.join(INDEX_FILE);
        let temp = self.inner.dir.join(format!("{}index", TEMP_PREFIX));
        let result = async {
            tokio::fs::write(&temp, &json).await?;
            tokio::fs::rename(&temp, &path).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(cache = %self.inner.role, error = %e, "failed to persist cache index");
        }
    }
}

async fn load_index(role: CacheRole, dir: &Path) -> Vec<CacheEntry> {
    let path = dir.join(INDEX_FILE);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(cache = %role, error = %e, "failed to read cache index, starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(cache = %role, error = %e, "corrupt cache index, starting empty");
            Vec::new()
        }
    }
}

async fn remove_temp_files(dir: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            let _ = tokio::fs::remove_file(entry.path()).await;
        }
    }
}

/// On-disk name: key, a short nonce so a re-stored key never reuses a doomed path,
/// and the original extension when it is short and alphanumeric.
fn disk_name(key: &str, file_name: Option<&str>) -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let ext = file_name
        .and_then(|n| Path::new(n).extension())
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{}-{}.{}", key, &nonce[..8], ext),
        None => format!("{}-{}", key, &nonce[..8]),
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}

/// Hex SHA-256 key for `content` in `namespace`, matching what a put would produce
pub fn content_key(content: &[u8], namespace: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    if let Some(namespace) = namespace {
        hasher.update(namespace.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(content);
    hex(&hasher.finalize())
}
