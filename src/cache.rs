//! Encode cache for incremental image builds.
//!
//! Re-encoding every JPEG, PNG and WebP on each build is the slowest part of
//! the pipeline, and `build` wipes the output directory first. This module
//! keeps a copy of every encoded file in the cache directory and restores it
//! into the fresh build tree when neither the source nor the encoding
//! parameters changed.
//!
//! # Design
//!
//! Only the expensive encoders are cached (`images` for JPEG/PNG, `webp`).
//! SVG clean-up, copies and text minification always run.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: lookups are by the combination of
//! `source_hash` and `params_hash`, not by output path. Renaming or moving a
//! source image therefore does not invalidate it.
//!
//! - **`source_hash`**: SHA-256 of the source file contents. Content-based
//!   rather than mtime-based so it survives `git checkout`.
//! - **`params_hash`**: SHA-256 of the encoder kind and its settings. Changing
//!   `jpeg_quality` re-encodes JPEGs but leaves PNGs and WebPs cached.
//!
//! A cache hit requires:
//! 1. An entry with matching `source_hash` and `params_hash` exists
//! 2. The stored object file still exists in the cache directory
//!
//! Several paths may hold the same content (two identical icons); a lookup
//! prefers the path it asks for. When the hit is stored only under a
//! different path (source renamed), the object is copied to the new path.
//!
//! ## Pruning
//!
//! Every task run touches each object it needs. On save, entries nobody
//! touched are dropped and their object files deleted, so a renamed or
//! removed image leaves nothing behind.
//!
//! ## Storage
//!
//! Each caching task owns a subdirectory, so pruning one never drops the
//! other's objects:
//!
//! ```text
//! .assets-cache/
//! ├── images/
//! │   ├── .cache-manifest.json
//! │   └── img/hero.jpg      # objects mirror their build-relative path
//! └── webp/
//!     ├── .cache-manifest.json
//!     └── img/hero.webp
//! ```
//!
//! ## Bypassing the cache
//!
//! `--no-cache` skips every lookup, so every image is re-encoded; the fresh
//! objects overwrite the cached ones.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Name of the cache manifest file within the cache directory.
const MANIFEST_FILENAME: &str = ".cache-manifest.json";

/// Version of the cache manifest format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

/// A single cached object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub params_hash: String,
}

/// On-disk cache manifest mapping object paths to their cache entries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
    /// Runtime reverse index: `"{source_hash}:{params_hash}"` → object paths.
    #[serde(skip)]
    content_index: HashMap<String, Vec<String>>,
}

impl CacheManifest {
    /// Create an empty manifest (first build or unreadable manifest).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Load from the cache directory. Returns an empty manifest if the
    /// file doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(cache_dir: &Path) -> Self {
        let path = manifest_path(cache_dir);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::empty();
        };
        let mut manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable cache manifest");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest.content_index = build_content_index(&manifest.entries);
        manifest
    }

    /// Save to the cache directory, creating it if needed.
    pub fn save(&self, cache_dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(cache_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(cache_dir), json)
    }

    /// Look up a cached object by content hashes.
    ///
    /// Returns a stored object path (relative to `cache_dir`) whose entry
    /// matches **and** whose object is still on disk. `wanted` is returned
    /// when it is one of them.
    pub fn find_cached(
        &self,
        source_hash: &str,
        params_hash: &str,
        cache_dir: &Path,
        wanted: &str,
    ) -> Option<String> {
        let stored = self
            .content_index
            .get(&content_key(source_hash, params_hash))?;
        let on_disk = |path: &&String| cache_dir.join(path.as_str()).is_file();
        stored
            .iter()
            .filter(|path| path.as_str() == wanted)
            .find(on_disk)
            .or_else(|| stored.iter().find(on_disk))
            .cloned()
    }

    /// Record a cache entry for an object.
    ///
    /// Other paths holding the same content are kept.
    pub fn insert(&mut self, object_path: String, source_hash: String, params_hash: String) {
        self.remove(&object_path);
        let paths = self
            .content_index
            .entry(content_key(&source_hash, &params_hash))
            .or_default();
        paths.push(object_path.clone());
        paths.sort();
        self.entries.insert(
            object_path,
            CacheEntry {
                source_hash,
                params_hash,
            },
        );
    }

    /// Forget an object path.
    pub fn remove(&mut self, object_path: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(object_path)?;
        let key = content_key(&entry.source_hash, &entry.params_hash);
        if let Some(paths) = self.content_index.get_mut(&key) {
            paths.retain(|path| path != object_path);
            if paths.is_empty() {
                self.content_index.remove(&key);
            }
        }
        Some(entry)
    }
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{}:{}", source_hash, params_hash)
}

fn build_content_index(entries: &HashMap<String, CacheEntry>) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    for (object_path, entry) in entries {
        index
            .entry(content_key(&entry.source_hash, &entry.params_hash))
            .or_default()
            .push(object_path.clone());
    }
    for paths in index.values_mut() {
        paths.sort();
    }
    index
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// SHA-256 hash of a byte slice, returned as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Encoder whose output is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeKind {
    Jpeg,
    Png,
    Webp,
}

impl EncodeKind {
    fn tag(self) -> &'static [u8] {
        match self {
            EncodeKind::Jpeg => b"jpeg\0",
            EncodeKind::Png => b"png\0",
            EncodeKind::Webp => b"webp\0",
        }
    }
}

/// SHA-256 hash of encoding parameters.
///
/// `setting` is the quality (JPEG, WebP) or optimisation level (PNG).
pub fn hash_encode_params(kind: EncodeKind, setting: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.tag());
    hasher.update(setting.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance for a task run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub relocations: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn relocate(&mut self) {
        self.relocations += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.relocations + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 || self.relocations > 0 {
            if self.relocations > 0 {
                write!(
                    f,
                    "{} cached, {} relocated, {} encoded ({} total)",
                    self.hits,
                    self.relocations,
                    self.misses,
                    self.total()
                )
            } else {
                write!(
                    f,
                    "{} cached, {} encoded ({} total)",
                    self.hits,
                    self.misses,
                    self.total()
                )
            }
        } else {
            write!(f, "{} encoded", self.misses)
        }
    }
}

/// Resolve the cache manifest path for a cache directory.
pub fn manifest_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(MANIFEST_FILENAME)
}

/// How a cached object was restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restored {
    /// Stored under the same path it is needed at.
    Exact,
    /// Stored under another path; copied over and recorded under this one.
    Relocated,
}

/// Manifest plus the object paths needed by the current run.
struct RunState {
    manifest: CacheManifest,
    touched: HashSet<String>,
}

/// A manifest shared by the workers of one task run.
///
/// Objects are stored at their build-relative path inside the cache
/// directory. The manifest sits behind a `Mutex`; file copies happen
/// outside the lock.
pub struct EncodeCache {
    dir: PathBuf,
    lookups: bool,
    state: Mutex<RunState>,
}

impl EncodeCache {
    /// Open the cache at `dir`. With `use_cache = false` nothing is restored,
    /// but fresh objects are still written and recorded.
    pub fn open(dir: &Path, use_cache: bool) -> Self {
        Self {
            dir: dir.to_path_buf(),
            lookups: use_cache,
            state: Mutex::new(RunState {
                manifest: CacheManifest::load(dir),
                touched: HashSet::new(),
            }),
        }
    }

    /// Copy a cached object to `dest` when one matches both hashes.
    pub fn restore(
        &self,
        object: &str,
        source_hash: &str,
        params_hash: &str,
        dest: &Path,
    ) -> io::Result<Option<Restored>> {
        if !self.lookups {
            return Ok(None);
        }
        let stored = {
            let mut state = self.lock();
            let stored = state
                .manifest
                .find_cached(source_hash, params_hash, &self.dir, object);
            if stored.is_some() {
                state.touched.insert(object.to_string());
            }
            stored
        };
        let Some(stored) = stored else {
            return Ok(None);
        };

        copy_creating_dirs(&self.dir.join(&stored), dest)?;
        if stored == object {
            return Ok(Some(Restored::Exact));
        }
        copy_creating_dirs(&self.dir.join(&stored), &self.dir.join(object))?;
        self.lock().manifest.insert(
            object.to_string(),
            source_hash.to_string(),
            params_hash.to_string(),
        );
        Ok(Some(Restored::Relocated))
    }

    /// Write a freshly encoded object and record it.
    pub fn store(
        &self,
        object: &str,
        bytes: &[u8],
        source_hash: &str,
        params_hash: &str,
    ) -> io::Result<()> {
        let path = self.dir.join(object);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        let mut state = self.lock();
        state.touched.insert(object.to_string());
        state.manifest.insert(
            object.to_string(),
            source_hash.to_string(),
            params_hash.to_string(),
        );
        Ok(())
    }

    /// Drop every object this run did not touch, then persist the manifest.
    pub fn save(&self) -> io::Result<()> {
        let mut state = self.lock();
        let stale: Vec<String> = state
            .manifest
            .entries
            .keys()
            .filter(|path| !state.touched.contains(*path))
            .cloned()
            .collect();
        for path in stale {
            state.manifest.remove(&path);
            match std::fs::remove_file(self.dir.join(&path)) {
                Ok(()) => tracing::debug!(object = %path, "pruned cache object"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        state.manifest.save(&self.dir)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunState> {
        // A worker that panicked mid-insert leaves the map usable.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn copy_creating_dirs(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, to).map(|_| ())
}
