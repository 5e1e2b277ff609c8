//! Archiver (C8): walks a source directory, hashes and stores file
//! contents concurrently, and emits a compressed manifest (spec.md §4.8).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rayon::prelude::*;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::HashCache;
use crate::error::{Result, SnugError};
use crate::hash::{hash_hex, HashAlgorithm};
use crate::ignore::IgnoreMatcher;
use crate::index::MetadataIndex;
use crate::manifest::{ArchiveEntry, ArchiveManifest, HashDefinition, MetadataTemplate};
use crate::store::{ChunkMetadata, ChunkStore};

const IGNORE_FILE_NAME: &str = ".snugignore";

/// Platform-special files excluded from archives unless `embed_system_files`
/// is set (spec.md §4.8 Options).
const SYSTEM_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", ".Spotlight-V100", ".Trashes"];

#[derive(Clone, Debug)]
pub struct ArchiveOptions {
    pub hash_algorithm: HashAlgorithm,
    /// Emit a per-entry progress line as each file/directory is archived.
    pub verbose: bool,
    /// Resolve symlinks and archive their targets as regular files.
    pub follow_symlinks: bool,
    /// Archive symlinks as symlink entries (default). Mutually exclusive
    /// in effect with `follow_symlinks`; `follow_symlinks` wins when both
    /// are set.
    pub preserve_symlinks: bool,
    pub error_on_broken_symlinks: bool,
    pub skip_permission_errors: bool,
    /// Include platform-special files such as `.DS_Store` that are skipped
    /// by default (spec.md §4.8 Options).
    pub embed_system_files: bool,
    /// Extra ignore patterns (spec.md §4.7 syntax), consumed by C7 in
    /// addition to any `.snugignore` file found at the source root.
    pub ignore_patterns: Vec<String>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Sha256,
            verbose: false,
            follow_symlinks: false,
            preserve_symlinks: true,
            error_on_broken_symlinks: false,
            skip_permission_errors: false,
            embed_system_files: false,
            ignore_patterns: Vec::new(),
        }
    }
}

struct PendingFile {
    rel_path: String,
    abs_path: PathBuf,
    size: u64,
    modified: Option<OffsetDateTime>,
    created: Option<OffsetDateTime>,
    permissions: Option<String>,
}

pub struct Archiver<'a> {
    store: &'a dyn ChunkStore,
    cache: Option<&'a Mutex<HashCache>>,
    index: Option<&'a Mutex<MetadataIndex>>,
}

impl<'a> Archiver<'a> {
    pub fn new(store: &'a dyn ChunkStore) -> Self {
        Self { store, cache: None, index: None }
    }

    pub fn with_cache(mut self, cache: &'a Mutex<HashCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_index(mut self, index: &'a Mutex<MetadataIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn create_archive(
        &self,
        source_dir: &Path,
        archive_path: &Path,
        options: &ArchiveOptions,
    ) -> Result<ArchiveManifest> {
        let md = fs::metadata(source_dir)
            .map_err(|_| SnugError::DirectoryNotFound(source_dir.to_path_buf()))?;
        if !md.is_dir() {
            return Err(SnugError::NotADirectory(source_dir.to_path_buf()));
        }

        let ignore = load_ignore(source_dir, &options.ignore_patterns);
        let mut pending_files = Vec::new();
        let mut entries = Vec::new();

        let walker = WalkDir::new(source_dir).follow_links(options.follow_symlinks);
        for result in walker.into_iter().filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            if !options.embed_system_files && is_system_file(e.file_name()) {
                return false;
            }
            let rel = relative_slash(source_dir, e.path());
            !ignore.is_ignored(&rel, e.file_type().is_dir())
        }) {
            let entry = match result {
                Ok(e) => e,
                Err(err) => {
                    if options.skip_permission_errors {
                        warn!(error = %err, "skipping unreadable directory entry");
                        continue;
                    }
                    return Err(walkdir_error_to_snug(err));
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            let rel_path = relative_slash(source_dir, entry.path());
            let link_md = match entry.path().symlink_metadata() {
                Ok(m) => m,
                Err(e) => return Err(e.into()),
            };

            if link_md.file_type().is_symlink() && !options.follow_symlinks {
                match self.handle_symlink(source_dir, entry.path(), &rel_path, options)? {
                    Some(e) => entries.push(e),
                    None => continue,
                }
                continue;
            }

            let file_md = match fs::metadata(entry.path()) {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(SnugError::BrokenSymlink {
                        path: entry.path().to_path_buf(),
                        target: fs::read_link(entry.path()).unwrap_or_default(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    if options.skip_permission_errors {
                        warn!(path = %rel_path, "skipping file: permission denied");
                        continue;
                    }
                    return Err(SnugError::PermissionDenied(entry.path().to_path_buf()));
                }
                Err(e) => return Err(e.into()),
            };

            if file_md.is_dir() {
                if options.verbose {
                    info!(path = %rel_path, "directory");
                }
                entries.push(ArchiveEntry {
                    created: to_offset(file_md.created().ok()),
                    modified: to_offset(file_md.modified().ok()),
                    permissions: permissions_octal(&file_md),
                    ..ArchiveEntry::new_directory(rel_path)
                });
            } else {
                pending_files.push(PendingFile {
                    rel_path,
                    abs_path: entry.path().to_path_buf(),
                    size: file_md.len(),
                    modified: to_offset(file_md.modified().ok()),
                    created: to_offset(file_md.created().ok()),
                    permissions: permissions_octal(&file_md),
                });
            }
        }

        let file_results: Vec<Result<(ArchiveEntry, ChunkMetadata)>> = pending_files
            .par_iter()
            .map(|pf| self.hash_and_store(pf, options))
            .collect();

        let mut failures = 0usize;
        let total_files = file_results.len();
        let mut hash_registry: HashMap<String, HashDefinition> = HashMap::new();
        for result in file_results {
            match result {
                Ok((entry, chunk_meta)) => {
                    if options.verbose {
                        info!(path = %entry.path, hash = %chunk_meta.content_hash, "file");
                    }
                    hash_registry.entry(chunk_meta.content_hash.clone()).or_insert_with(|| HashDefinition {
                        hash: chunk_meta.content_hash.clone(),
                        size: chunk_meta.size,
                        algorithm: Some(options.hash_algorithm),
                    });
                    if let Some(index) = self.index {
                        index.lock().unwrap().add(chunk_meta.content_hash.clone(), chunk_meta)?;
                    }
                    entries.push(entry);
                }
                Err(e) => {
                    if options.skip_permission_errors {
                        warn!(error = %e, "skipping file due to error");
                        failures += 1;
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        if failures > 0 {
            debug!(failures, total_files, "some files skipped during archiving");
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let mut manifest = ArchiveManifest::new(options.hash_algorithm);
        manifest.metadata = Some(MetadataTemplate {
            tool: Some("snug".to_string()),
            ..Default::default()
        });
        manifest.entries = entries;
        if !hash_registry.is_empty() {
            manifest.hashes = Some(hash_registry);
        }

        let encoded = manifest.encode()?;
        let tmp = archive_path.with_extension("snug.tmp");
        fs::write(&tmp, &encoded)?;
        fs::rename(&tmp, archive_path)?;

        if let Some(cache) = self.cache {
            cache.lock().unwrap().save()?;
        }
        if let Some(index) = self.index {
            index.lock().unwrap().save()?;
        }

        Ok(manifest)
    }

    fn handle_symlink(
        &self,
        source_dir: &Path,
        path: &Path,
        rel_path: &str,
        options: &ArchiveOptions,
    ) -> Result<Option<ArchiveEntry>> {
        let target = fs::read_link(path)?;
        let resolved_ok = fs::metadata(path).is_ok();
        if !resolved_ok {
            if options.error_on_broken_symlinks {
                return Err(SnugError::BrokenSymlink {
                    path: path.to_path_buf(),
                    target,
                });
            }
            warn!(path = rel_path, "skipping broken symlink");
            return Ok(None);
        }

        if target.is_absolute() && target.starts_with(source_dir) {
            if let Ok(canon_target) = fs::canonicalize(path) {
                if canon_target == fs::canonicalize(path.parent().unwrap_or(path))? {
                    return Err(SnugError::SymlinkCycle(path.to_path_buf()));
                }
            }
        }

        if !options.preserve_symlinks {
            return Ok(None);
        }

        Ok(Some(ArchiveEntry::new_symlink(
            rel_path.to_string(),
            target.to_string_lossy().into_owned(),
        )))
    }

    fn hash_and_store(&self, pf: &PendingFile, options: &ArchiveOptions) -> Result<(ArchiveEntry, ChunkMetadata)> {
        let cached = self
            .cache
            .and_then(|c| c.lock().unwrap().lookup(&pf.abs_path, options.hash_algorithm).transpose())
            .transpose()?;

        let (hash, bytes) = match cached {
            Some(hash) => (hash, None),
            None => {
                let bytes = fs::read(&pf.abs_path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        SnugError::PermissionDenied(pf.abs_path.clone())
                    } else {
                        SnugError::Io(e)
                    }
                })?;
                let hash = hash_hex(&bytes, options.hash_algorithm);
                if let Some(cache) = self.cache {
                    let md = fs::metadata(&pf.abs_path)?;
                    cache
                        .lock()
                        .unwrap()
                        .insert(&pf.abs_path, options.hash_algorithm, md.len(), md.modified()?, hash.clone())?;
                }
                (hash, Some(bytes))
            }
        };

        let bytes = match bytes {
            Some(b) => b,
            None => fs::read(&pf.abs_path)?,
        };

        let chunk_metadata = ChunkMetadata {
            size: pf.size,
            content_hash: hash.clone(),
            hash_algorithm: options.hash_algorithm,
            content_type: None,
            chunk_type: Some("file".to_string()),
            original_filename: Path::new(&pf.rel_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            original_paths: vec![pf.rel_path.clone()],
            created: pf.created,
            modified: pf.modified,
            compression: None,
        };

        self.store.write(&bytes, &hash, Some(chunk_metadata.clone()))?;

        let entry = ArchiveEntry {
            modified: pf.modified,
            created: pf.created,
            permissions: pf.permissions.clone(),
            ..ArchiveEntry::new_file(pf.rel_path.clone(), hash, pf.size)
        };
        Ok((entry, chunk_metadata))
    }
}

/// True for platform-special filenames excluded unless `embed_system_files`
/// is set (spec.md §4.8 Options).
fn is_system_file(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| SYSTEM_FILE_NAMES.contains(&n))
}

/// Combines any `.snugignore` file at the source root with the explicit
/// `ignore_patterns` option (spec.md §4.8); the latter are appended so they
/// take precedence on tie per C7's last-matching-rule-wins rule.
fn load_ignore(source_dir: &Path, extra_patterns: &[String]) -> IgnoreMatcher {
    let mut text = fs::read_to_string(source_dir.join(IGNORE_FILE_NAME)).unwrap_or_default();
    for pattern in extra_patterns {
        text.push('\n');
        text.push_str(pattern);
    }
    IgnoreMatcher::from_str(&text)
}

fn relative_slash(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_offset(t: Option<std::time::SystemTime>) -> Option<OffsetDateTime> {
    t.map(OffsetDateTime::from)
}

#[cfg(unix)]
fn permissions_octal(md: &fs::Metadata) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;
    Some(format!("{:04o}", md.permissions().mode() & 0o7777))
}

#[cfg(not(unix))]
fn permissions_octal(_md: &fs::Metadata) -> Option<String> {
    None
}

fn walkdir_error_to_snug(err: walkdir::Error) -> SnugError {
    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
    match err.io_error() {
        Some(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            SnugError::PermissionDenied(path)
        }
        Some(io) => SnugError::Io(std::io::Error::new(io.kind(), err.to_string())),
        None => SnugError::Format(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsChunkStore;
    use std::io::Write as _;

    fn write(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = fs::File::create(path).unwrap();
        f.write_all(contents).unwrap();
    }

    #[test]
    fn archives_files_and_directories() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("a.txt"), b"hello");
        write(&src.path().join("sub/b.txt"), b"world");

        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let archiver = Archiver::new(&store);
        let out = src.path().join("out.snug");

        let manifest = archiver
            .create_archive(src.path(), &out, &ArchiveOptions::default())
            .unwrap();

        let paths: Vec<&str> = manifest.entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"a.txt"));
        assert!(paths.contains(&"sub"));
        assert!(paths.contains(&"sub/b.txt"));
        assert!(out.exists());
    }

    #[test]
    fn entries_are_sorted_by_path() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("z.txt"), b"1");
        write(&src.path().join("a.txt"), b"2");

        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let archiver = Archiver::new(&store);
        let manifest = archiver
            .create_archive(src.path(), &src.path().join("out.snug"), &ArchiveOptions::default())
            .unwrap();

        let paths: Vec<&str> = manifest.entries.iter().map(|e| e.path.as_str()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn identical_content_dedups_to_one_chunk() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("a.txt"), b"same");
        write(&src.path().join("b.txt"), b"same");

        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let archiver = Archiver::new(&store);
        let manifest = archiver
            .create_archive(src.path(), &src.path().join("out.snug"), &ArchiveOptions::default())
            .unwrap();

        let hashes: Vec<&str> = manifest
            .entries
            .iter()
            .filter_map(|e| e.hash.as_deref())
            .collect();
        assert_eq!(hashes[0], hashes[1]);
    }

    #[test]
    fn ignore_file_excludes_matching_paths() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join(".snugignore"), b"*.log\n");
        write(&src.path().join("keep.txt"), b"1");
        write(&src.path().join("debug.log"), b"2");

        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let archiver = Archiver::new(&store);
        let manifest = archiver
            .create_archive(src.path(), &src.path().join("out.snug"), &ArchiveOptions::default())
            .unwrap();

        let paths: Vec<&str> = manifest.entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"keep.txt"));
        assert!(!paths.contains(&"debug.log"));
    }

    #[test]
    fn ignore_patterns_option_excludes_a_directory() {
        // spec.md S2: ignorePatterns=["build/"] passed as an option, not a file.
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("build/junk.o"), b"object");
        write(&src.path().join("keep.txt"), b"1");

        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let archiver = Archiver::new(&store);
        let options = ArchiveOptions {
            ignore_patterns: vec!["build/".to_string()],
            ..ArchiveOptions::default()
        };
        let manifest = archiver
            .create_archive(src.path(), &src.path().join("out.snug"), &options)
            .unwrap();

        let paths: Vec<&str> = manifest.entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"keep.txt"));
        assert!(!paths.iter().any(|p| p.starts_with("build")));
    }

    #[test]
    fn system_files_are_skipped_by_default() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join(".DS_Store"), b"junk");
        write(&src.path().join("keep.txt"), b"1");

        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let archiver = Archiver::new(&store);
        let manifest = archiver
            .create_archive(src.path(), &src.path().join("out.snug"), &ArchiveOptions::default())
            .unwrap();

        let paths: Vec<&str> = manifest.entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"keep.txt"));
        assert!(!paths.contains(&".DS_Store"));
    }

    #[test]
    fn embed_system_files_option_includes_them() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join(".DS_Store"), b"junk");

        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let archiver = Archiver::new(&store);
        let options = ArchiveOptions { embed_system_files: true, ..ArchiveOptions::default() };
        let manifest = archiver
            .create_archive(src.path(), &src.path().join("out.snug"), &options)
            .unwrap();

        let paths: Vec<&str> = manifest.entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&".DS_Store"));
    }

    #[test]
    fn manifest_registers_unique_hash_definitions() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("a.txt"), b"same");
        write(&src.path().join("b.txt"), b"same");
        write(&src.path().join("c.txt"), b"different");

        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let archiver = Archiver::new(&store);
        let manifest = archiver
            .create_archive(src.path(), &src.path().join("out.snug"), &ArchiveOptions::default())
            .unwrap();

        let hashes = manifest.hashes.expect("hash registry populated");
        assert_eq!(hashes.len(), 2);
        for (id, def) in &hashes {
            assert_eq!(&def.hash, id);
        }
    }

    #[test]
    fn missing_source_directory_errors() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = FsChunkStore::new(store_dir.path()).unwrap();
        let archiver = Archiver::new(&store);
        let err = archiver
            .create_archive(Path::new("/no/such/dir"), Path::new("/tmp/out.snug"), &ArchiveOptions::default())
            .unwrap_err();
        assert!(matches!(err, SnugError::DirectoryNotFound(_)));
    }
}
