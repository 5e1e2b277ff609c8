//! Extractor (C10): restores a directory tree from a manifest and its
//! backing chunk store, tolerating per-entry failures (spec.md §4.10).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, SnugError};
use crate::manifest::{parser, ArchiveEntry, EntryType};
use crate::store::ChunkStore;

#[derive(Clone, Debug, Default)]
pub struct ExtractOptions {
    /// Emit a per-entry progress line as each entry is extracted.
    pub verbose: bool,
    pub preserve_permissions: bool,
}

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub extracted: usize,
    pub failed: Vec<(String, String)>,
}

pub struct Extractor<'a> {
    store: &'a dyn ChunkStore,
}

impl<'a> Extractor<'a> {
    pub fn new(store: &'a dyn ChunkStore) -> Self {
        Self { store }
    }

    pub fn extract_archive(
        &self,
        archive_path: &Path,
        output_dir: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractReport> {
        let manifest = parser::parse(archive_path)?;
        fs::create_dir_all(output_dir)?;

        let mut report = ExtractReport::default();
        for entry in &manifest.entries {
            match self.extract_entry(entry, output_dir, options) {
                Ok(()) => {
                    if options.verbose {
                        info!(path = %entry.path, "extracted");
                    }
                    report.extracted += 1;
                }
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "failed to extract entry");
                    report.failed.push((entry.path.clone(), e.to_string()));
                }
            }
        }

        // spec.md §4.10 step 4: per-entry failures are recorded and
        // extraction continues; the operation as a whole only fails if
        // nothing was extracted at all.
        if report.extracted == 0 && !report.failed.is_empty() {
            return Err(SnugError::ExtractionAggregate {
                count: report.failed.len(),
                total: manifest.entries.len(),
            });
        }

        Ok(report)
    }

    fn extract_entry(&self, entry: &ArchiveEntry, output_dir: &Path, options: &ExtractOptions) -> Result<()> {
        let target = output_dir.join(sanitize(&entry.path));

        match entry.entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
            }
            EntryType::Symlink => {
                let link_target = entry.target.as_deref().ok_or_else(|| {
                    SnugError::ExtractionFailed {
                        path: entry.path.clone(),
                        reason: "symlink entry missing target".to_string(),
                    }
                })?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                if target.symlink_metadata().is_ok() {
                    fs::remove_file(&target)?;
                }
                create_symlink(link_target, &target).map_err(|e| SnugError::ExtractionFailed {
                    path: entry.path.clone(),
                    reason: e.to_string(),
                })?;
            }
            EntryType::File => {
                let hash = entry.hash.as_deref().ok_or_else(|| SnugError::ExtractionFailed {
                    path: entry.path.clone(),
                    reason: "file entry missing hash".to_string(),
                })?;
                let data = self
                    .store
                    .read(hash)?
                    .ok_or_else(|| SnugError::HashNotFound { hash: hash.to_string() })?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&target, data)?;
            }
            EntryType::BlockDevice | EntryType::CharacterDevice | EntryType::Socket | EntryType::Fifo => {
                warn!(path = %entry.path, "skipping special file: unsupported on extraction");
                return Ok(());
            }
        }

        if options.preserve_permissions {
            if let Some(perm) = &entry.permissions {
                apply_permissions(&target, perm)?;
            }
        }

        Ok(())
    }
}

/// Reject absolute paths and `..` components so a manifest can't escape
/// `output_dir`.
fn sanitize(path: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            std::path::Component::Normal(c) => out.push(c),
            _ => continue,
        }
    }
    out
}

#[cfg(unix)]
fn create_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Parses an octal permission string like `"0644"`. Invalid formats are
/// silently ignored (spec.md §4.10 edge case) rather than failing the
/// whole extraction over a cosmetic mismatch.
#[cfg(unix)]
fn apply_permissions(path: &Path, octal: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(mode) = u32::from_str_radix(octal.trim_start_matches('0'), 8) {
        let perms = fs::Permissions::from_mode(mode);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_permissions(_path: &Path, _octal: &str) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{hash_hex, HashAlgorithm};
    use crate::manifest::ArchiveManifest;
    use crate::store::FsChunkStore;

    #[test]
    fn extracts_files_and_directories() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let hash = hash_hex(b"hello", HashAlgorithm::Sha256);
        store.write(b"hello", &hash, None).unwrap();

        let mut manifest = ArchiveManifest::new(HashAlgorithm::Sha256);
        manifest.entries.push(ArchiveEntry::new_directory("sub".into()));
        manifest
            .entries
            .push(ArchiveEntry::new_file("sub/a.txt".into(), hash, 5));

        let archive_dir = tempfile::tempdir().unwrap();
        let archive_path = archive_dir.path().join("a.snug");
        fs::write(&archive_path, manifest.encode().unwrap()).unwrap();

        let output_dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(&store);
        let report = extractor
            .extract_archive(&archive_path, output_dir.path(), &ExtractOptions::default())
            .unwrap();

        assert_eq!(report.extracted, 2);
        assert_eq!(fs::read(output_dir.path().join("sub/a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn missing_chunk_with_nothing_else_extracted_fails_as_aggregate() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();

        let mut manifest = ArchiveManifest::new(HashAlgorithm::Sha256);
        manifest
            .entries
            .push(ArchiveEntry::new_file("missing.txt".into(), "deadbeef".into(), 3));

        let archive_dir = tempfile::tempdir().unwrap();
        let archive_path = archive_dir.path().join("a.snug");
        fs::write(&archive_path, manifest.encode().unwrap()).unwrap();

        let output_dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(&store);
        let err = extractor
            .extract_archive(&archive_path, output_dir.path(), &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, SnugError::ExtractionAggregate { count: 1, total: 1 }));
    }

    #[test]
    fn missing_chunk_still_extracts_the_remaining_entries() {
        // spec.md S3: a per-entry failure is recorded but does not abort
        // extraction of the other entries, nor fail the whole operation.
        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let hash = hash_hex(b"ok", HashAlgorithm::Sha256);
        store.write(b"ok", &hash, None).unwrap();

        let mut manifest = ArchiveManifest::new(HashAlgorithm::Sha256);
        manifest.entries.push(ArchiveEntry::new_file("good.txt".into(), hash, 2));
        manifest
            .entries
            .push(ArchiveEntry::new_file("bad.txt".into(), "deadbeef".into(), 3));

        let archive_dir = tempfile::tempdir().unwrap();
        let archive_path = archive_dir.path().join("a.snug");
        fs::write(&archive_path, manifest.encode().unwrap()).unwrap();

        let output_dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(&store);
        let report = extractor
            .extract_archive(&archive_path, output_dir.path(), &ExtractOptions::default())
            .unwrap();
        assert_eq!(report.extracted, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(output_dir.path().join("good.txt").exists());
    }

    #[test]
    fn sanitize_strips_traversal_components() {
        assert_eq!(sanitize("../../etc/passwd"), PathBuf::from("etc/passwd"));
        assert_eq!(sanitize("/abs/path"), PathBuf::from("abs/path"));
    }
}
