//! Hash cache (C6): a size-bounded LRU keyed by absolute file path, so
//! repeated archiver runs over an unchanged tree skip re-hashing. Built on
//! a hand-rolled arena-indexed doubly linked list rather than the `lru`
//! crate (not present anywhere in the corpus) since `#![forbid(unsafe_code)]`
//! rules out the usual raw-pointer intrusive list.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Result;
use crate::hash::HashAlgorithm;

pub const DEFAULT_CAPACITY: usize = 1_000_000;
const MTIME_TOLERANCE_SECS: i64 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub algorithm: HashAlgorithm,
    pub size: u64,
    #[serde(with = "time::serde::iso8601")]
    pub mtime: OffsetDateTime,
    #[serde(with = "time::serde::iso8601")]
    pub cached_at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Node {
    key: String,
    value: CacheEntry,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Arena-indexed doubly linked list giving O(1) `get`/`insert`/`remove`
/// with most-recently-used at `head` and least-recently-used at `tail`.
struct LruList {
    capacity: usize,
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruList {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.nodes[idx].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.nodes[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.attach_front(idx);
    }

    fn get(&mut self, key: &str) -> Option<CacheEntry> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        Some(self.nodes[idx].as_ref().unwrap().value.clone())
    }

    fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.index.get(key).map(|idx| &self.nodes[*idx].as_ref().unwrap().value)
    }

    /// Returns the evicted (key, entry) if inserting over capacity evicted
    /// the least-recently-used entry.
    fn insert(&mut self, key: String, value: CacheEntry) -> Option<(String, CacheEntry)> {
        if let Some(&idx) = self.index.get(&key) {
            self.nodes[idx].as_mut().unwrap().value = value;
            self.touch(idx);
            return None;
        }

        let idx = match self.free.pop() {
            Some(i) => {
                self.nodes[i] = Some(Node {
                    key: key.clone(),
                    value,
                    prev: None,
                    next: None,
                });
                i
            }
            None => {
                self.nodes.push(Some(Node {
                    key: key.clone(),
                    value,
                    prev: None,
                    next: None,
                }));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.attach_front(idx);

        if self.len() > self.capacity {
            self.evict_lru()
        } else {
            None
        }
    }

    fn evict_lru(&mut self) -> Option<(String, CacheEntry)> {
        let tail = self.tail?;
        self.detach(tail);
        let node = self.nodes[tail].take().unwrap();
        self.free.push(tail);
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let idx = self.index.remove(key)?;
        self.detach(idx);
        let node = self.nodes[idx].take().unwrap();
        self.free.push(idx);
        Some(node.value)
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.index
            .iter()
            .map(|(k, &idx)| (k.as_str(), &self.nodes[idx].as_ref().unwrap().value))
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    path: String,
    #[serde(flatten)]
    entry: CacheEntry,
}

/// Path-keyed LRU cache of previously computed file hashes, persisted as
/// JSON (spec.md §4.6). A hit requires the cached algorithm, size and
/// mtime (within a 1 second tolerance) to match the file's current state.
pub struct HashCache {
    path: PathBuf,
    list: LruList,
    stats: CacheStats,
}

impl HashCache {
    pub fn new(persist_path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: persist_path.into(),
            list: LruList::new(capacity),
            stats: CacheStats::default(),
        }
    }

    pub fn with_default_capacity(persist_path: impl Into<PathBuf>) -> Self {
        Self::new(persist_path, DEFAULT_CAPACITY)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Look up a cached hash for `file_path`, validating it against the
    /// file's current size/mtime/algorithm. Returns `None` on any mismatch
    /// or if the file isn't cached, and updates hit/miss counters.
    pub fn lookup(&mut self, file_path: &Path, algorithm: HashAlgorithm) -> Result<Option<String>> {
        let key = canonical_key(file_path);
        let md = fs::metadata(file_path)?;
        let size = md.len();
        let mtime: OffsetDateTime = md.modified()?.into();

        let hit = match self.list.peek(&key) {
            Some(entry) if entry.algorithm == algorithm && entry.size == size => {
                (entry.mtime - mtime).whole_seconds().abs() <= MTIME_TOLERANCE_SECS
            }
            _ => false,
        };

        if hit {
            self.stats.hits += 1;
            Ok(self.list.get(&key).map(|e| e.hash))
        } else {
            self.stats.misses += 1;
            Ok(None)
        }
    }

    pub fn insert(
        &mut self,
        file_path: &Path,
        algorithm: HashAlgorithm,
        size: u64,
        mtime: SystemTime,
        hash: String,
    ) -> Result<()> {
        let key = canonical_key(file_path);
        let evicted = self.list.insert(
            key,
            CacheEntry {
                hash,
                algorithm,
                size,
                mtime: mtime.into(),
                cached_at: OffsetDateTime::now_utc(),
            },
        );
        if evicted.is_some() {
            self.stats.evictions += 1;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries: Vec<PersistedEntry> = self
            .list
            .iter()
            .map(|(path, entry)| PersistedEntry {
                path: path.to_string(),
                entry: entry.clone(),
            })
            .collect();
        let json = serde_json::to_vec_pretty(&entries)
            .map_err(|e| crate::error::SnugError::Format(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Loads persisted entries, dropping any whose algorithm doesn't match
    /// `expected_algorithm`, then trims to capacity keeping the most
    /// recently cached entries (spec.md §4.6).
    pub fn load(persist_path: impl Into<PathBuf>, capacity: usize, expected_algorithm: HashAlgorithm) -> Result<Self> {
        let path = persist_path.into();
        let mut cache = Self::new(&path, capacity);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(cache),
            Err(e) => return Err(e.into()),
        };
        let mut entries: Vec<PersistedEntry> = serde_json::from_slice(&bytes)
            .map_err(|e| crate::error::SnugError::Format(e.to_string()))?;
        entries.retain(|e| e.entry.algorithm == expected_algorithm);
        entries.sort_by(|a, b| b.entry.cached_at.cmp(&a.entry.cached_at));
        entries.truncate(capacity);
        // Insert oldest-first so the most recently cached end up at the
        // front of the LRU list.
        for persisted in entries.into_iter().rev() {
            cache.list.insert(persisted.path, persisted.entry);
        }
        Ok(cache)
    }
}

fn canonical_key(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn miss_then_hit_after_insert() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "a.txt", b"hello");
        let mut cache = HashCache::new(dir.path().join("cache.json"), 10);

        assert!(cache.lookup(&file, HashAlgorithm::Sha256).unwrap().is_none());
        assert_eq!(cache.stats().misses, 1);

        let md = fs::metadata(&file).unwrap();
        cache
            .insert(&file, HashAlgorithm::Sha256, md.len(), md.modified().unwrap(), "deadbeef".into())
            .unwrap();

        let hit = cache.lookup(&file, HashAlgorithm::Sha256).unwrap();
        assert_eq!(hit.as_deref(), Some("deadbeef"));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn mismatched_algorithm_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "a.txt", b"hello");
        let mut cache = HashCache::new(dir.path().join("cache.json"), 10);
        let md = fs::metadata(&file).unwrap();
        cache
            .insert(&file, HashAlgorithm::Sha256, md.len(), md.modified().unwrap(), "hash".into())
            .unwrap();
        assert!(cache.lookup(&file, HashAlgorithm::Md5).unwrap().is_none());
    }

    #[test]
    fn eviction_respects_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = HashCache::new(dir.path().join("cache.json"), 2);
        let f1 = write_file(dir.path(), "1.txt", b"a");
        let f2 = write_file(dir.path(), "2.txt", b"bb");
        let f3 = write_file(dir.path(), "3.txt", b"ccc");

        for (f, h) in [(&f1, "h1"), (&f2, "h2"), (&f3, "h3")] {
            let md = fs::metadata(f).unwrap();
            cache
                .insert(f, HashAlgorithm::Sha256, md.len(), md.modified().unwrap(), h.into())
                .unwrap();
        }

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.lookup(&f1, HashAlgorithm::Sha256).unwrap().is_none());
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "a.txt", b"hello");
        let cache_path = dir.path().join("cache.json");
        {
            let mut cache = HashCache::new(&cache_path, 10);
            let md = fs::metadata(&file).unwrap();
            cache
                .insert(&file, HashAlgorithm::Sha256, md.len(), md.modified().unwrap(), "deadbeef".into())
                .unwrap();
            cache.save().unwrap();
        }

        let mut reloaded = HashCache::load(&cache_path, 10, HashAlgorithm::Sha256).unwrap();
        let hit = reloaded.lookup(&file, HashAlgorithm::Sha256).unwrap();
        assert_eq!(hit.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn load_drops_entries_for_a_different_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "a.txt", b"hello");
        let cache_path = dir.path().join("cache.json");
        {
            let mut cache = HashCache::new(&cache_path, 10);
            let md = fs::metadata(&file).unwrap();
            cache
                .insert(&file, HashAlgorithm::Md5, md.len(), md.modified().unwrap(), "md5hash".into())
                .unwrap();
            cache.save().unwrap();
        }

        let reloaded = HashCache::load(&cache_path, 10, HashAlgorithm::Sha256).unwrap();
        assert_eq!(reloaded.len(), 0);
    }
}
