//! Facade (C12): the single entry point wiring the chunk store, cache,
//! metadata index, archiver, extractor and validator together (spec.md
//! §4.12). This is the type `snug-cli` talks to.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::archiver::{ArchiveOptions, Archiver};
use crate::cache::HashCache;
use crate::config::{SnugConfig, StorageLocation, VolumeType};
use crate::error::Result;
use crate::extractor::{ExtractOptions, Extractor, ExtractReport};
use crate::hash::HashAlgorithm;
use crate::index::{IndexQuery, MetadataIndex};
use crate::manifest::{parser, ArchiveManifest};
use crate::store::{ChunkMetadata, ChunkStore, FsChunkStore, MirroredChunkStore};
use crate::validator::{ValidationReport, Validator};

const CACHE_FILE_NAME: &str = "hash-cache.json";
const INDEX_FILE_NAME: &str = "metadata-index.json";

pub struct Snug {
    store: Box<dyn ChunkStore>,
    cache: Mutex<HashCache>,
    index: Mutex<MetadataIndex>,
    hash_algorithm: HashAlgorithm,
}

impl Snug {
    /// Builds the storage layer from `config`: a single [`FsChunkStore`]
    /// rooted at `storage_root` if no secondary tiers are declared, else a
    /// [`MirroredChunkStore`] fanning out to every declared tier.
    pub fn new(storage_root: impl Into<PathBuf>, config: &SnugConfig) -> Result<Self> {
        let storage_root = storage_root.into();
        let hash_algorithm = config
            .default_hash_algorithm
            .as_deref()
            .map(HashAlgorithm::parse)
            .transpose()?
            .unwrap_or_default();

        let store: Box<dyn ChunkStore> = if config.has_declared_secondary_tiers() {
            build_mirrored_store(&storage_root, config)?
        } else {
            Box::new(FsChunkStore::new(storage_root.clone())?)
        };

        let cache = HashCache::load(storage_root.join(CACHE_FILE_NAME), crate::cache::DEFAULT_CAPACITY, hash_algorithm)?;
        let index = MetadataIndex::new(storage_root.join(INDEX_FILE_NAME));

        Ok(Self {
            store,
            cache: Mutex::new(cache),
            index: Mutex::new(index),
            hash_algorithm,
        })
    }

    /// Convenience constructor with no config file: a bare [`FsChunkStore`]
    /// rooted at `storage_root`.
    pub fn with_storage_root(storage_root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(storage_root, &SnugConfig::default())
    }

    pub fn create_archive(&self, source_dir: &Path, archive_path: &Path, options: &ArchiveOptions) -> Result<ArchiveManifest> {
        Archiver::new(self.store.as_ref())
            .with_cache(&self.cache)
            .with_index(&self.index)
            .create_archive(source_dir, archive_path, options)
    }

    pub fn extract_archive(&self, archive_path: &Path, output_dir: &Path, options: &ExtractOptions) -> Result<ExtractReport> {
        Extractor::new(self.store.as_ref()).extract_archive(archive_path, output_dir, options)
    }

    pub fn validate_archive(&self, archive_path: &Path) -> Result<ValidationReport> {
        Validator::new(self.store.as_ref()).validate_archive(archive_path)
    }

    /// Lists manifest entries without touching the chunk store (spec.md
    /// §6's `list` operation).
    pub fn contents(&self, archive_path: &Path) -> Result<ArchiveManifest> {
        parser::parse(archive_path)
    }

    /// Parses and returns just the manifest-level metadata template
    /// (spec.md §6's `metadata` operation).
    pub fn load_metadata(&self, archive_path: &Path) -> Result<ArchiveManifest> {
        parser::parse(archive_path)
    }

    pub fn default_hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn save_cache(&self) -> Result<()> {
        self.cache.lock().unwrap().save()
    }

    /// Queries the metadata index (C5) built up across archive creations
    /// sharing this `Snug`'s storage root, by path prefix, size range and/or
    /// content type (spec.md §4.5).
    pub fn query_metadata(&self, query: &IndexQuery) -> Result<Vec<(String, ChunkMetadata)>> {
        self.index.lock().unwrap().query(query)
    }

    /// Permanently removes a chunk and its side-car metadata from the store
    /// (spec.md §3 "Lifecycles": delete is supported but never invoked by
    /// create/extract/validate). Idempotent: deleting an id never written
    /// is not an error.
    pub fn delete_chunk(&self, hash: &str) -> Result<()> {
        self.store.delete(hash)?;
        self.index.lock().unwrap().remove(hash)?;
        self.index.lock().unwrap().save()
    }
}

fn build_mirrored_store(storage_root: &Path, config: &SnugConfig) -> Result<Box<dyn ChunkStore>> {
    let mut primary: Option<Box<dyn ChunkStore>> = None;
    let mut mirrors: Vec<Box<dyn ChunkStore>> = Vec::new();
    let mut glaciers: Vec<Box<dyn ChunkStore>> = Vec::new();

    let mut locations = config.storage_locations.clone();
    if locations.is_empty() {
        locations.push(StorageLocation {
            path: storage_root.to_path_buf(),
            label: Some("default-primary".to_string()),
            required: true,
            priority: 0,
            speed: None,
            volume_type: VolumeType::Primary,
        });
    }

    for location in &locations {
        let tier: Box<dyn ChunkStore> = Box::new(FsChunkStore::new(&location.path)?);
        match location.volume_type {
            VolumeType::Primary if primary.is_none() => primary = Some(tier),
            VolumeType::Primary | VolumeType::Secondary => mirrors.push(tier),
            VolumeType::Mirror => mirrors.push(tier),
            VolumeType::Glacier => glaciers.push(tier),
        }
    }

    for path in &config.mirror_locations {
        mirrors.push(Box::new(FsChunkStore::new(PathBuf::from(path))?));
    }

    let primary = match primary {
        Some(p) => p,
        None => Box::new(FsChunkStore::new(storage_root)?),
    };

    Ok(Box::new(MirroredChunkStore::new(
        primary,
        mirrors,
        glaciers,
        config.fail_if_primary_unavailable,
    )))
}
