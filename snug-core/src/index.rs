//! Metadata index (C5): an in-memory, JSON-persisted index over chunk
//! metadata with secondary lookups by path, size range and content type
//! (spec.md §4.5). Grounded on the `DefaultChunkIndex` secondary-index
//! pattern (by_hash as the primary map, derived lookups rebuilt from it).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::ChunkMetadata;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct PersistedIndex {
    by_hash: HashMap<String, ChunkMetadata>,
}

/// Query filters for [`MetadataIndex::query`]. All set fields are ANDed.
#[derive(Clone, Debug, Default)]
pub struct IndexQuery {
    pub path_prefix: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub content_type: Option<String>,
}

/// An in-memory index over chunk metadata, lazily loaded from a JSON file
/// on first access and persisted back on `save`.
pub struct MetadataIndex {
    path: PathBuf,
    by_hash: HashMap<String, ChunkMetadata>,
    loaded: bool,
}

impl MetadataIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            by_hash: HashMap::new(),
            loaded: false,
        }
    }

    fn ensure_loaded(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.loaded = true;
        match fs::read(&self.path) {
            Ok(bytes) => {
                let persisted: PersistedIndex = serde_json::from_slice(&bytes)
                    .map_err(|e| crate::error::SnugError::Format(e.to_string()))?;
                self.by_hash = persisted.by_hash;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let persisted = PersistedIndex {
            by_hash: self.by_hash.clone(),
        };
        let json = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| crate::error::SnugError::Format(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn get(&mut self, hash: &str) -> Result<Option<ChunkMetadata>> {
        self.ensure_loaded()?;
        Ok(self.by_hash.get(hash).cloned())
    }

    pub fn add(&mut self, hash: String, metadata: ChunkMetadata) -> Result<()> {
        self.ensure_loaded()?;
        match self.by_hash.remove(&hash) {
            Some(existing) => {
                self.by_hash.insert(hash, existing.merge(metadata));
            }
            None => {
                self.by_hash.insert(hash, metadata);
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, hash: &str) -> Result<Option<ChunkMetadata>> {
        self.ensure_loaded()?;
        Ok(self.by_hash.remove(hash))
    }

    /// Linear scan over the index applying all set filters. The index is
    /// sized for archive metadata (thousands to low millions of chunks),
    /// not a general query engine, so no secondary index accelerates
    /// prefix/range/content-type lookups (spec.md §4.5 non-goals).
    pub fn query(&mut self, query: &IndexQuery) -> Result<Vec<(String, ChunkMetadata)>> {
        self.ensure_loaded()?;
        let mut out: Vec<(String, ChunkMetadata)> = self
            .by_hash
            .iter()
            .filter(|(_, meta)| {
                if let Some(prefix) = &query.path_prefix {
                    if !meta.original_paths.iter().any(|p| p.starts_with(prefix)) {
                        return false;
                    }
                }
                if let Some(min) = query.min_size {
                    if meta.size < min {
                        return false;
                    }
                }
                if let Some(max) = query.max_size {
                    if meta.size > max {
                        return false;
                    }
                }
                if let Some(ct) = &query.content_type {
                    if meta.content_type.as_deref() != Some(ct.as_str()) {
                        return false;
                    }
                }
                true
            })
            .map(|(h, m)| (h.clone(), m.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    pub fn len(&mut self) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.by_hash.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }
}
