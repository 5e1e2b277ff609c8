//! File-system chunk store (C3): chunks sharded two levels deep under a
//! base directory, with JSON side-car metadata merged on repeat writes.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;

use super::traits::{ChunkHandle, ChunkMetadata, ChunkStore};

/// One mutex per store serializes metadata merges so two workers writing
/// the same id at once can't tear the `.meta` file (spec.md §5).
pub struct FsChunkStore {
    base: PathBuf,
    merge_lock: Mutex<()>,
}

impl FsChunkStore {
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        Ok(Self {
            base,
            merge_lock: Mutex::new(()),
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn chunk_path(&self, id: &str) -> PathBuf {
        if id.len() < 4 {
            self.base.join(id)
        } else {
            self.base.join(&id[0..2]).join(&id[2..4]).join(id)
        }
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        let mut p = self.chunk_path(id).into_os_string();
        p.push(".meta");
        PathBuf::from(p)
    }

    fn read_metadata(&self, id: &str) -> Result<Option<ChunkMetadata>> {
        let path = self.meta_path(id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
                crate::error::SnugError::Format(format!("corrupt metadata for {id}: {e}"))
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_metadata_atomic(&self, id: &str, metadata: &ChunkMetadata) -> Result<()> {
        let path = self.meta_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Route through `serde_json::Value` (a `BTreeMap` under the hood,
        // since this crate doesn't enable serde_json's `preserve_order`
        // feature) so the side-car's keys serialize in sorted order
        // (spec.md §6: `.meta` files are `sortedKeys: true`).
        let value = serde_json::to_value(metadata)
            .map_err(|e| crate::error::SnugError::Format(e.to_string()))?;
        let json = serde_json::to_vec_pretty(&value)
            .map_err(|e| crate::error::SnugError::Format(e.to_string()))?;
        let tmp = path.with_extension("meta.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl ChunkStore for FsChunkStore {
    fn write(&self, data: &[u8], id: &str, metadata: Option<ChunkMetadata>) -> Result<String> {
        let path = self.chunk_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, data)?;
            fs::rename(&tmp, &path)?;
        }

        if let Some(incoming) = metadata {
            let _guard = self.merge_lock.lock().unwrap();
            let merged = match self.read_metadata(id)? {
                Some(existing) => existing.merge(incoming),
                None => incoming,
            };
            self.write_metadata_atomic(id, &merged)?;
        }

        Ok(id.to_string())
    }

    fn read(&self, id: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.chunk_path(id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_range(&self, id: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        let path = self.chunk_path(id);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let total = file.metadata()?.len();
        if offset >= total {
            return Ok(None);
        }
        let clamped = length.min(total - offset);
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; clamped as usize];
        file.read_exact(&mut buf)?;
        Ok(Some(buf))
    }

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.chunk_path(id).exists())
    }

    fn size(&self, id: &str) -> Result<Option<u64>> {
        match fs::metadata(self.chunk_path(id)) {
            Ok(md) => Ok(Some(md.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: &str) -> Result<()> {
        // Idempotent overall (resolved open question, spec.md §9): deleting
        // an id that was never written is not an error.
        let path = self.chunk_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let meta = self.meta_path(id);
        let _ = fs::remove_file(meta);
        Ok(())
    }

    fn handle(&self, id: &str) -> Result<Option<Box<dyn ChunkHandle>>> {
        let path = self.chunk_path(id);
        match File::open(&path) {
            Ok(file) => Ok(Some(Box::new(FsChunkHandle { file }))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

struct FsChunkHandle {
    file: File,
}

impl ChunkHandle for FsChunkHandle {
    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let total = self.file.metadata()?.len();
        if offset >= total {
            return Ok(Vec::new());
        }
        let clamped = length.min(total - offset);
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; clamped as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn size(&self) -> u64 {
        self.file.metadata().map(|m| m.len()).unwrap_or(0)
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
