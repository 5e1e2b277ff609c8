use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnugError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("hash not found for chunk {hash}")]
    HashNotFound { hash: String },

    #[error("failed to extract {path}: {reason}")]
    ExtractionFailed { path: String, reason: String },

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("broken symlink {path} -> {target}")]
    BrokenSymlink { path: PathBuf, target: PathBuf },

    #[error("symlink cycle detected at {0}")]
    SymlinkCycle(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("embedded file not found for hash {0}")]
    EmbeddedFileNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{count} of {total} files failed to extract")]
    ExtractionAggregate { count: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, SnugError>;
