use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "snug: content-addressable archive tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package a directory tree into a `.snug` archive
    Create {
        source: PathBuf,
        output: PathBuf,

        /// Storage root for the chunk store (defaults to SNUG_STORAGE or ~/.snug)
        #[arg(long)]
        storage: Option<PathBuf>,

        #[arg(long, default_value = "sha256")]
        hash_algorithm: String,

        #[arg(long)]
        verbose: bool,

        #[arg(long)]
        follow_symlinks: bool,

        #[arg(long)]
        skip_permission_errors: bool,

        #[arg(long)]
        error_on_broken_symlinks: bool,

        /// May be given multiple times; combined with any `.snugignore`
        /// found at the source root (spec.md §4.7/§4.8).
        #[arg(long = "ignore")]
        ignore_patterns: Vec<String>,
    },

    /// Restore a directory tree from a `.snug` archive
    Extract {
        archive: PathBuf,
        output: PathBuf,

        #[arg(long)]
        storage: Option<PathBuf>,

        #[arg(long)]
        verbose: bool,

        #[arg(long)]
        preserve_permissions: bool,
    },

    /// Check that every chunk an archive references is present in the store
    Validate {
        archive: PathBuf,

        #[arg(long)]
        storage: Option<PathBuf>,
    },

    /// List archive entries
    List { archive: PathBuf },

    /// Print the manifest's metadata template
    Metadata { archive: PathBuf },

    /// Permanently remove a chunk from the store by its hash (spec.md §3
    /// "delete is supported but is not invoked during archive operations")
    Gc {
        #[arg(long)]
        storage: Option<PathBuf>,

        hashes: Vec<String>,
    },
}
