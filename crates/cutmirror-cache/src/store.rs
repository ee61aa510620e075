//! Filesystem-backed content cache.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;
use crate::lookup::{Lookup, LookupChain, LookupRequest};
use crate::names;

/// Result of a computation that may or may not be worth caching.
#[derive(Debug, Clone, PartialEq)]
pub enum Computed<T> {
    /// Derived from the input; cached
    Fresh(T),
    /// Deterministic fallback; returned but never cached so a later run
    /// retries the real computation
    Fallback(T),
}

impl<T> Computed<T> {
    pub fn into_inner(self) -> T {
        match self {
            Computed::Fresh(v) | Computed::Fallback(v) => v,
        }
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self, Computed::Fresh(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Computed<U> {
        match self {
            Computed::Fresh(v) => Computed::Fresh(f(v)),
            Computed::Fallback(v) => Computed::Fallback(f(v)),
        }
    }
}

/// Content-addressed cache rooted at a directory.
///
/// Cloning is cheap. Concurrent reads are always safe; concurrent writes to
/// one key resolve as last writer wins through atomic renames.
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: Arc<PathBuf>,
    chain: Arc<LookupChain>,
}

impl ContentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_chain(config, LookupChain::standard())
    }

    pub fn with_chain(config: CacheConfig, chain: LookupChain) -> Self {
        Self {
            root: Arc::new(config.root),
            chain: Arc::new(chain),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical location of a structured entry.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.purpose.dir_name()).join(key.entry_file_name())
    }

    pub fn artifact_path(&self, key: &CacheKey, ext: &str) -> PathBuf {
        self.root.join(key.purpose.dir_name()).join(key.artifact_file_name(ext))
    }

    /// Fetch a structured entry by content hash.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.lookup(LookupRequest::new(key)).await.into_option()
    }

    /// Walk the lookup chain. Stale or corrupt entries found along the way
    /// are deleted; a hit from a non-canonical location is migrated to the
    /// content-hash location.
    pub async fn lookup<T: DeserializeOwned>(&self, request: LookupRequest<'_>) -> Lookup<T> {
        let key = request.key;
        if let Err(e) = key.validate() {
            warn!(key = %key, error = %e, "Refusing cache lookup");
            return Lookup::Miss;
        }

        for (position, strategy) in self.chain.iter().enumerate() {
            let Lookup::Hit(path) = strategy.probe(&self.root, &request) else {
                continue;
            };

            match read_entry::<T>(&path, key.schema_version).await {
                Ok(value) => {
                    counter!(names::CACHE_HITS, "purpose" => key.purpose.as_str(), "strategy" => strategy.name())
                        .increment(1);
                    debug!(key = %key, strategy = strategy.name(), "Cache hit");
                    if position > 0 {
                        self.migrate(&path, key).await;
                    }
                    return Lookup::Hit(value);
                }
                Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    if e.is_stale_entry() {
                        info!(key = %key, path = %path.display(), error = %e, "Evicting stale cache entry");
                    } else {
                        warn!(key = %key, path = %path.display(), error = %e, "Unreadable cache entry, evicting");
                    }
                    counter!(names::CACHE_EVICTIONS, "purpose" => key.purpose.as_str()).increment(1);
                    remove_if_exists(&path).await;
                }
            }
        }

        counter!(names::CACHE_MISSES, "purpose" => key.purpose.as_str()).increment(1);
        debug!(key = %key, "Cache miss");
        Lookup::Miss
    }

    /// Store a structured entry. Entries are never patched in place.
    pub async fn put<T: Serialize>(&self, key: &CacheKey, payload: &T) -> CacheResult<PathBuf> {
        key.validate()?;
        let bytes = codec::encode(key, payload)?;
        let path = self.entry_path(key);
        write_atomic(path.clone(), bytes).await?;
        counter!(names::CACHE_WRITES, "purpose" => key.purpose.as_str()).increment(1);
        debug!(key = %key, "Cache entry stored");
        Ok(path)
    }

    /// Delete an entry. Returns whether anything was removed.
    pub async fn invalidate(&self, key: &CacheKey) -> CacheResult<bool> {
        key.validate()?;
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Cached value, or compute and store it.
    ///
    /// Storage failures are logged and do not fail the computation.
    /// Fallback results are returned without being stored.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<T>, E>>,
    {
        self.lookup_or_compute(LookupRequest::new(key), compute).await
    }

    /// Like [`ContentCache::get_or_compute`], but walks the whole lookup
    /// chain for `request`, so entries stored under a legacy name are found
    /// and migrated before anything is recomputed.
    pub async fn lookup_or_compute<T, E, F, Fut>(&self, request: LookupRequest<'_>, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<T>, E>>,
    {
        let key = request.key;
        if let Lookup::Hit(cached) = self.lookup::<T>(request).await {
            return Ok(cached);
        }

        let computed = compute().await?;
        if computed.is_cacheable() {
            let value = computed.into_inner();
            if let Err(e) = self.put(key, &value).await {
                warn!(key = %key, error = %e, "Failed to store computed result");
            }
            Ok(value)
        } else {
            debug!(key = %key, "Not caching fallback result");
            Ok(computed.into_inner())
        }
    }

    /// Existing, non-empty media artifact for a key.
    pub async fn artifact(&self, key: &CacheKey, ext: &str) -> Option<PathBuf> {
        let path = self.artifact_path(key, ext);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                counter!(names::CACHE_HITS, "purpose" => key.purpose.as_str(), "strategy" => "artifact").increment(1);
                Some(path)
            }
            _ => {
                counter!(names::CACHE_MISSES, "purpose" => key.purpose.as_str()).increment(1);
                None
            }
        }
    }

    /// Temporary file next to the artifact's final location, keeping the
    /// extension so tools can infer the container format.
    pub fn stage_artifact(&self, key: &CacheKey, ext: &str) -> CacheResult<NamedTempFile> {
        key.validate()?;
        let dir = self.root.join(key.purpose.dir_name());
        std::fs::create_dir_all(&dir)?;
        let staged = tempfile::Builder::new()
            .prefix(".staging-")
            .suffix(&format!(".{}", ext))
            .tempfile_in(&dir)?;
        Ok(staged)
    }

    /// Atomically move a staged artifact into place.
    pub fn commit_artifact(&self, staged: NamedTempFile, key: &CacheKey, ext: &str) -> CacheResult<PathBuf> {
        let path = self.artifact_path(key, ext);
        staged.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        counter!(names::CACHE_WRITES, "purpose" => key.purpose.as_str()).increment(1);
        Ok(path)
    }

    /// Keep a raw external response for later inspection.
    pub async fn persist_audit(&self, kind: &str, raw: &str) -> CacheResult<PathBuf> {
        let dir = self.root.join("audit");
        tokio::fs::create_dir_all(&dir).await?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let kind: String = kind
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let path = dir.join(format!("{}-{}-{}.txt", stamp, kind, &crate::hash::hash_bytes(raw.as_bytes())[..8]));
        tokio::fs::write(&path, raw).await?;
        Ok(path)
    }

    /// Delete every entry of every purpose.
    pub async fn clear(&self) -> CacheResult<()> {
        match tokio::fs::remove_dir_all(self.root.as_path()).await {
            Ok(()) => {
                info!(root = %self.root.display(), "Cache cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn migrate(&self, legacy_path: &Path, key: &CacheKey) {
        let canonical = self.entry_path(key);
        if let Some(parent) = canonical.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(error = %e, "Failed to create cache directory for migration");
                return;
            }
        }
        match tokio::fs::rename(legacy_path, &canonical).await {
            Ok(()) => info!(key = %key, from = %legacy_path.display(), "Migrated legacy cache entry"),
            Err(e) => warn!(key = %key, error = %e, "Failed to migrate legacy cache entry"),
        }
    }
}

async fn read_entry<T: DeserializeOwned>(path: &Path, expected_version: u32) -> CacheResult<T> {
    let data = tokio::fs::read(path).await?;
    codec::decode(&data, expected_version)
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to delete cache entry");
        }
    }
}

/// Write to a sibling temp file and rename over the destination.
async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> CacheResult<()> {
    tokio::task::spawn_blocking(move || -> CacheResult<()> {
        let dir = path
            .parent()
            .ok_or_else(|| CacheError::invalid_key(path.display().to_string()))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    })
    .await?
}
