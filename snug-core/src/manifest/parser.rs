//! Parser (C9): decompress + decode an archive file into its manifest.

use std::fs;
use std::path::Path;

use crate::error::{Result, SnugError};

use super::ArchiveManifest;

/// Read `archive_path` off disk and decode it into an [`ArchiveManifest`].
/// Rejects archives with an unknown format tag or schema version (handled
/// by [`ArchiveManifest::decode`]).
pub fn parse(archive_path: &Path) -> Result<ArchiveManifest> {
    let bytes = fs::read(archive_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SnugError::ArchiveNotFound(archive_path.to_path_buf())
        } else {
            SnugError::Io(e)
        }
    })?;
    ArchiveManifest::decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlgorithm;
    use crate::manifest::ArchiveEntry;

    #[test]
    fn parse_missing_archive_reports_not_found() {
        let err = parse(Path::new("/does/not/exist.snug")).unwrap_err();
        assert!(matches!(err, SnugError::ArchiveNotFound(_)));
    }

    #[test]
    fn parse_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.snug");
        let mut manifest = ArchiveManifest::new(HashAlgorithm::Sha256);
        manifest
            .entries
            .push(ArchiveEntry::new_file("x".into(), "aa".into(), 1));
        fs::write(&path, manifest.encode().unwrap()).unwrap();

        let parsed = parse(&path).unwrap();
        assert_eq!(parsed.entries.len(), 1);
    }
}
