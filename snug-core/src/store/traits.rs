//! Chunk store interface (C2): the abstract capability set every chunk
//! storage backend implements, plus batch helpers with default
//! implementations over the primitives (spec.md §4.2).
//!
//! Every operation here is synchronous. The original design mixes async
//! chunk-store calls with semaphore-wrapped sync wrappers (spec.md §9); we
//! pick one model instead — fully blocking, with concurrency supplied by a
//! bounded worker pool (`rayon`, as the teacher already uses for the
//! archiver's parallel hashing pass) rather than an async runtime.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Result;
use crate::hash::HashAlgorithm;

/// Default number of tasks dispatched per wave in batch chunk-store
/// operations (spec.md §4.2).
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub size: u64,
    pub content_hash: String,
    pub hash_algorithm: HashAlgorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub original_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "time::serde::iso8601::option")]
    pub created: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", with = "time::serde::iso8601::option")]
    pub modified: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

impl ChunkMetadata {
    /// Merge `other` (an incoming write) into `self` (the existing
    /// side-file), per spec.md §3's merge rule:
    /// - union of `originalPaths`
    /// - earliest `created`
    /// - latest `modified`
    /// - first-writer wins for `contentType`, `originalFilename`, `compression`
    pub fn merge(mut self, other: ChunkMetadata) -> ChunkMetadata {
        let mut seen: HashSet<&str> = self.original_paths.iter().map(|s| s.as_str()).collect();
        for p in &other.original_paths {
            if seen.insert(p.as_str()) {
                self.original_paths.push(p.clone());
            }
        }
        self.created = match (self.created, other.created) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };
        self.modified = match (self.modified, other.modified) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };
        // first-writer wins: keep `self`'s value if present, else take `other`'s.
        if self.content_type.is_none() {
            self.content_type = other.content_type;
        }
        if self.original_filename.is_none() {
            self.original_filename = other.original_filename;
        }
        if self.compression.is_none() {
            self.compression = other.compression;
        }
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkIdentifier {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChunkMetadata>,
}

/// A random-access handle for streaming large chunks without loading the
/// whole payload into memory.
pub trait ChunkHandle: Send {
    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>>;
    fn size(&self) -> u64;
    fn close(&mut self) -> Result<()>;
}

pub trait ChunkStore: Send + Sync {
    /// Idempotent on equal content; merges metadata per the rule above.
    /// Returns `id` unchanged.
    fn write(&self, data: &[u8], id: &str, metadata: Option<ChunkMetadata>) -> Result<String>;

    fn read(&self, id: &str) -> Result<Option<Vec<u8>>>;

    /// Out-of-range offset returns `None`; an over-long `length` clamps to
    /// the remainder of the chunk.
    fn read_range(&self, id: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>>;

    fn exists(&self, id: &str) -> Result<bool>;

    fn size(&self, id: &str) -> Result<Option<u64>>;

    fn delete(&self, id: &str) -> Result<()>;

    fn handle(&self, id: &str) -> Result<Option<Box<dyn ChunkHandle>>>;

    /// Batch write bounded to `batch_size` concurrent tasks per wave. Each
    /// input maps to its own output entry; no ordering guarantee beyond
    /// that positional correspondence.
    fn write_many(
        &self,
        items: &[(Vec<u8>, String, Option<ChunkMetadata>)],
        batch_size: usize,
    ) -> Vec<Result<String>> {
        run_in_waves(items, batch_size, |(data, id, meta)| {
            self.write(data, id, meta.clone())
        })
    }

    fn read_many(&self, ids: &[String], batch_size: usize) -> Vec<Result<Option<Vec<u8>>>> {
        run_in_waves(ids, batch_size, |id| self.read(id))
    }

    fn exists_many(&self, ids: &[String], batch_size: usize) -> Vec<Result<bool>> {
        run_in_waves(ids, batch_size, |id| self.exists(id))
    }
}

/// Drive `items` through `f` in waves of at most `batch_size` concurrent
/// tasks, preserving input order in the output vector.
fn run_in_waves<T, R, F>(items: &[T], batch_size: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let batch_size = batch_size.max(1);
    let mut out = Vec::with_capacity(items.len());
    for chunk in items.chunks(batch_size) {
        let mut results: Vec<R> = chunk.par_iter().map(&f).collect();
        out.append(&mut results);
    }
    out
}
