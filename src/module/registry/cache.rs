//! Content-addressed metadata cache
//!
//! Skips re-parsing module files whose bytes have not changed. Entries are
//! keyed by the SHA-256 of the raw file content; each path remembers the hash
//! it was last scanned with so a changed file evicts its stale entry.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::module::registry::manifest::parse_markers;
use crate::module::traits::{ModuleError, ModuleMetadata};

/// On-disk format version
const CACHE_FORMAT_VERSION: u32 = 1;

/// Cached extraction result for one content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA-256 of the module bytes (hex)
    pub content_hash: String,
    /// Metadata extracted from those bytes
    pub metadata: ModuleMetadata,
    /// Unix timestamp of the extraction
    pub extracted_at: u64,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Parser invocations
    pub parses: u64,
    /// Entries evicted because a path's content changed
    pub invalidations: u64,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
    paths: BTreeMap<PathBuf, String>,
}

/// Metadata cache indexed by content hash
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: HashMap<String, CacheEntry>,
    paths: HashMap<PathBuf, String>,
    stats: CacheStats,
}

/// Hex SHA-256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl MetadataCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the metadata for `bytes` read from `path`, parsing only on a miss
    pub fn get_or_parse(&mut self, path: &Path, bytes: &[u8]) -> (String, ModuleMetadata) {
        let hash = content_hash(bytes);

        if let Some(previous) = self.paths.get(path) {
            if *previous != hash {
                debug!("Content of {:?} changed, invalidating cache entry", path);
                let stale = previous.clone();
                self.evict_if_unreferenced(path, &stale);
                self.stats.invalidations += 1;
            }
        }
        self.paths.insert(path.to_path_buf(), hash.clone());

        if let Some(entry) = self.entries.get(&hash) {
            self.stats.hits += 1;
            return (hash, entry.metadata.clone());
        }

        self.stats.parses += 1;
        let metadata = parse_markers(&String::from_utf8_lossy(bytes));
        self.entries.insert(
            hash.clone(),
            CacheEntry {
                content_hash: hash.clone(),
                metadata: metadata.clone(),
                extracted_at: unix_now(),
            },
        );
        (hash, metadata)
    }

    /// Forget whatever is cached for `path`
    pub fn invalidate_path(&mut self, path: &Path) {
        if let Some(hash) = self.paths.remove(path) {
            self.evict_if_unreferenced(path, &hash);
            self.stats.invalidations += 1;
        }
    }

    /// Forget every path not in `live`, along with entries no path uses
    ///
    /// Returns the number of paths dropped.
    pub fn retain_paths<'a, I>(&mut self, live: I) -> usize
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let live: HashSet<&Path> = live.into_iter().collect();
        let before = self.paths.len();
        self.paths.retain(|path, _| live.contains(path.as_path()));
        let dropped = before - self.paths.len();
        if dropped > 0 {
            let referenced: HashSet<&String> = self.paths.values().collect();
            self.entries.retain(|hash, _| referenced.contains(hash));
            debug!("Dropped {} vanished paths from metadata cache", dropped);
        }
        dropped
    }

    /// Look up an entry by content hash
    pub fn get(&self, content_hash: &str) -> Option<&CacheEntry> {
        self.entries.get(content_hash)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Load a cache previously written by [`save`](Self::save)
    ///
    /// A missing file yields an empty cache. A file that cannot be parsed is
    /// discarded with a warning rather than failing the scan.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::new(),
            Err(e) => {
                warn!("Failed to read metadata cache {:?}: {}", path, e);
                return Self::new();
            }
        };

        match serde_json::from_str::<CacheFile>(&contents) {
            Ok(file) if file.version == CACHE_FORMAT_VERSION => {
                debug!("Loaded {} cached metadata entries from {:?}", file.entries.len(), path);
                Self {
                    entries: file
                        .entries
                        .into_iter()
                        .map(|e| (e.content_hash.clone(), e))
                        .collect(),
                    paths: file.paths.into_iter().collect(),
                    stats: CacheStats::default(),
                }
            }
            Ok(file) => {
                warn!(
                    "Discarding metadata cache {:?} with unsupported version {}",
                    path, file.version
                );
                Self::new()
            }
            Err(e) => {
                warn!("Discarding corrupt metadata cache {:?}: {}", path, e);
                Self::new()
            }
        }
    }

    /// Persist the cache as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModuleError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ModuleError::OperationError(format!(
                    "Failed to create cache directory {:?}: {}",
                    parent, e
                ))
            })?;
        }

        let mut entries: Vec<CacheEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));
        let file = CacheFile {
            version: CACHE_FORMAT_VERSION,
            entries,
            paths: self.paths.clone().into_iter().collect(),
        };

        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, json).map_err(|e| {
            ModuleError::OperationError(format!("Failed to write metadata cache {:?}: {}", path, e))
        })
    }

    fn evict_if_unreferenced(&mut self, path: &Path, hash: &str) {
        let shared = self
            .paths
            .iter()
            .any(|(other, other_hash)| other != path && other_hash == hash);
        if !shared {
            self.entries.remove(hash);
        }
    }
}
