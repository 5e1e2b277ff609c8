//! Chunk storage backends (C2-C4): the abstract interface plus two
//! concrete implementations, a single-tier filesystem store and a
//! multi-tier mirrored composite over it.

pub mod fs;
pub mod mirrored;
pub mod traits;

pub use fs::FsChunkStore;
pub use mirrored::MirroredChunkStore;
pub use traits::{ChunkHandle, ChunkIdentifier, ChunkMetadata, ChunkStore, DEFAULT_BATCH_SIZE};
