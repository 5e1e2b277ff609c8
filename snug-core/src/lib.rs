#![forbid(unsafe_code)]

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod archiver;
pub mod cache;
pub mod config;
pub mod error;
pub mod extractor;
pub mod facade;
pub mod hash;
pub mod ignore;
pub mod index;
pub mod manifest;
pub mod store;
pub mod validator;

pub use crate::error::Result;

pub mod prelude {
    pub use crate::Result;
    pub use crate::archiver::{ArchiveOptions, Archiver};
    pub use crate::error::SnugError;
    pub use crate::extractor::{ExtractOptions, Extractor, ExtractReport};
    pub use crate::facade::Snug;
    pub use crate::hash::HashAlgorithm;
    pub use crate::index::{IndexQuery, MetadataIndex};
    pub use crate::manifest::{ArchiveEntry, ArchiveManifest, EntryType};
    pub use crate::store::ChunkMetadata;
    pub use crate::validator::{ValidationReport, Validator};
}
