//! Mirrored, multi-tier chunk store (C4): one primary plus any number of
//! mirror and glacier (archival) tiers. Writes fan out to every tier in
//! parallel; reads try the primary first, then each mirror, then each
//! glacier tier, returning on the first hit (spec.md §4.4).

use rayon::prelude::*;
use tracing::warn;

use crate::error::Result;

use super::traits::{ChunkHandle, ChunkMetadata, ChunkStore};

/// Composes a primary store with mirror and glacier tiers.
///
/// - `write` always writes the primary synchronously; mirror/glacier writes
///   run in parallel and failures are logged, never propagated, unless
///   `fail_if_primary_unavailable` and the primary itself fails.
/// - `read`/`exists`/`size`/`handle` try the primary, then mirrors in order,
///   then glaciers in order, returning the first tier that has the chunk.
/// - `delete` removes from the primary and mirrors (best-effort on mirrors);
///   glacier tiers are never deleted from (spec.md §4.4: glacier is
///   write-once archival).
pub struct MirroredChunkStore {
    primary: Box<dyn ChunkStore>,
    mirrors: Vec<Box<dyn ChunkStore>>,
    glaciers: Vec<Box<dyn ChunkStore>>,
    fail_if_primary_unavailable: bool,
}

impl MirroredChunkStore {
    pub fn new(
        primary: Box<dyn ChunkStore>,
        mirrors: Vec<Box<dyn ChunkStore>>,
        glaciers: Vec<Box<dyn ChunkStore>>,
        fail_if_primary_unavailable: bool,
    ) -> Self {
        Self {
            primary,
            mirrors,
            glaciers,
            fail_if_primary_unavailable,
        }
    }

    fn secondary_tiers(&self) -> impl Iterator<Item = &Box<dyn ChunkStore>> {
        self.mirrors.iter().chain(self.glaciers.iter())
    }
}

impl ChunkStore for MirroredChunkStore {
    fn write(&self, data: &[u8], id: &str, metadata: Option<ChunkMetadata>) -> Result<String> {
        let primary_result = self.primary.write(data, id, metadata.clone());
        if self.fail_if_primary_unavailable && primary_result.is_err() {
            return primary_result;
        }

        self.mirrors
            .par_iter()
            .chain(self.glaciers.par_iter())
            .for_each(|tier| {
                if let Err(e) = tier.write(data, id, metadata.clone()) {
                    warn!(chunk = id, error = %e, "mirror write failed");
                }
            });

        primary_result
    }

    fn read(&self, id: &str) -> Result<Option<Vec<u8>>> {
        if let Some(data) = self.primary.read(id)? {
            return Ok(Some(data));
        }
        for tier in self.secondary_tiers() {
            match tier.read(id) {
                Ok(Some(data)) => return Ok(Some(data)),
                Ok(None) => continue,
                Err(e) => {
                    warn!(chunk = id, error = %e, "tier read failed, trying next");
                    continue;
                }
            }
        }
        Ok(None)
    }

    fn read_range(&self, id: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        if let Some(data) = self.primary.read_range(id, offset, length)? {
            return Ok(Some(data));
        }
        for tier in self.secondary_tiers() {
            match tier.read_range(id, offset, length) {
                Ok(Some(data)) => return Ok(Some(data)),
                Ok(None) => continue,
                Err(e) => {
                    warn!(chunk = id, error = %e, "tier read_range failed, trying next");
                    continue;
                }
            }
        }
        Ok(None)
    }

    fn exists(&self, id: &str) -> Result<bool> {
        if self.primary.exists(id)? {
            return Ok(true);
        }
        for tier in self.secondary_tiers() {
            if tier.exists(id).unwrap_or(false) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn size(&self, id: &str) -> Result<Option<u64>> {
        if let Some(size) = self.primary.size(id)? {
            return Ok(Some(size));
        }
        for tier in self.secondary_tiers() {
            if let Ok(Some(size)) = tier.size(id) {
                return Ok(Some(size));
            }
        }
        Ok(None)
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.primary.delete(id)?;
        for tier in &self.mirrors {
            if let Err(e) = tier.delete(id) {
                warn!(chunk = id, error = %e, "mirror delete failed");
            }
        }
        Ok(())
    }

    fn handle(&self, id: &str) -> Result<Option<Box<dyn ChunkHandle>>> {
        if let Some(h) = self.primary.handle(id)? {
            return Ok(Some(h));
        }
        for tier in self.secondary_tiers() {
            if let Ok(Some(h)) = tier.handle(id) {
                return Ok(Some(h));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fs::FsChunkStore;

    fn store() -> FsChunkStore {
        FsChunkStore::new(tempfile::tempdir().unwrap().keep()).unwrap()
    }

    #[test]
    fn write_fans_out_to_mirror() {
        let primary = store();
        let mirror = store();
        let mirror_base = mirror.base().to_path_buf();
        let mirrored = MirroredChunkStore::new(Box::new(primary), vec![Box::new(mirror)], vec![], false);

        mirrored.write(b"payload", "aabbccdd", None).unwrap();
        let check = FsChunkStore::new(mirror_base).unwrap();
        assert_eq!(check.read("aabbccdd").unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn read_falls_back_to_mirror_when_primary_misses() {
        let primary = store();
        let mirror = store();
        mirror.write(b"from-mirror", "aabbccdd", None).unwrap();
        let mirrored = MirroredChunkStore::new(Box::new(primary), vec![Box::new(mirror)], vec![], false);

        let data = mirrored.read("aabbccdd").unwrap();
        assert_eq!(data, Some(b"from-mirror".to_vec()));
    }

    #[test]
    fn delete_never_touches_glacier() {
        let primary = store();
        let glacier = store();
        glacier.write(b"archived", "aabbccdd", None).unwrap();
        let glacier_base = glacier.base().to_path_buf();
        let mirrored = MirroredChunkStore::new(Box::new(primary), vec![], vec![Box::new(glacier)], false);

        mirrored.delete("aabbccdd").unwrap();
        let check = FsChunkStore::new(glacier_base).unwrap();
        assert!(check.exists("aabbccdd").unwrap());
    }

    #[test]
    fn exists_checks_all_tiers() {
        let primary = store();
        let glacier = store();
        glacier.write(b"x", "aabbccdd", None).unwrap();
        let mirrored = MirroredChunkStore::new(Box::new(primary), vec![], vec![Box::new(glacier)], false);
        assert!(mirrored.exists("aabbccdd").unwrap());
        assert!(!mirrored.exists("deadbeef").unwrap());
    }
}
