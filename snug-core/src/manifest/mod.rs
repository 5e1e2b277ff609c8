//! The archive manifest data model (spec §3) and the compressed on-disk
//! encoding for it (spec §6). An archive file on disk is nothing but the
//! zstd-compressed CBOR encoding of an [`ArchiveManifest`] — zstd standing
//! in here for the adaptive entropy coder ("LZFSE or equivalent") the
//! distilled spec calls for, matching the compressor the teacher already
//! uses for its own archive payloads.

pub mod parser;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Result, SnugError};
use crate::hash::HashAlgorithm;

pub const FORMAT: &str = "snug";
pub const VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharacterDevice,
    Socket,
    Fifo,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HashDefinition {
    pub hash: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<HashAlgorithm>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetadataTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveEntry {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "time::serde::iso8601::option")]
    pub modified: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", with = "time::serde::iso8601::option")]
    pub created: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_offset: Option<u64>,
}

impl ArchiveEntry {
    pub fn new_file(path: String, hash: String, size: u64) -> Self {
        Self {
            entry_type: EntryType::File,
            path,
            hash: Some(hash),
            size: Some(size),
            target: None,
            permissions: None,
            owner: None,
            group: None,
            modified: None,
            created: None,
            embedded: None,
            embedded_offset: None,
        }
    }

    pub fn new_directory(path: String) -> Self {
        Self {
            entry_type: EntryType::Directory,
            path,
            hash: None,
            size: None,
            target: None,
            permissions: None,
            owner: None,
            group: None,
            modified: None,
            created: None,
            embedded: None,
            embedded_offset: None,
        }
    }

    pub fn new_symlink(path: String, target: String) -> Self {
        Self {
            entry_type: EntryType::Symlink,
            path,
            hash: None,
            size: None,
            target: Some(target),
            permissions: None,
            owner: None,
            group: None,
            modified: None,
            created: None,
            embedded: None,
            embedded_offset: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub format: String,
    pub version: u32,
    pub hash_algorithm: HashAlgorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<HashMap<String, HashDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataTemplate>,
    pub entries: Vec<ArchiveEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_files_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_section_offset: Option<u64>,
}

impl ArchiveManifest {
    pub fn new(hash_algorithm: HashAlgorithm) -> Self {
        Self {
            format: FORMAT.to_string(),
            version: VERSION,
            hash_algorithm,
            hashes: None,
            metadata: None,
            entries: Vec::new(),
            embedded_files_count: None,
            embedded_section_offset: None,
        }
    }

    /// Serialize to CBOR and compress with zstd. This is the bit-exact
    /// on-disk archive format (spec.md §6).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut cbor = Vec::new();
        ciborium::ser::into_writer(self, &mut cbor)
            .map_err(|e| SnugError::CompressionFailed(e.to_string()))?;
        zstd::stream::encode_all(&cbor[..], 0)
            .map_err(|e| SnugError::CompressionFailed(e.to_string()))
    }

    /// Inverse of [`ArchiveManifest::encode`]. Rejects unknown format/version.
    pub fn decode(compressed: &[u8]) -> Result<Self> {
        // Decompression buffer sizing per spec.md §6: start at
        // max(4x compressed size, 1 MiB) and let zstd grow it as needed.
        let capacity = (compressed.len() * 4).max(1 << 20);
        let mut cbor = Vec::with_capacity(capacity);
        {
            use std::io::Read;
            let mut decoder = zstd::stream::Decoder::new(compressed)
                .map_err(|e| SnugError::CompressionFailed(e.to_string()))?;
            decoder
                .read_to_end(&mut cbor)
                .map_err(|e| SnugError::CompressionFailed(e.to_string()))?;
        }
        let manifest: ArchiveManifest = ciborium::de::from_reader(&cbor[..])
            .map_err(|e| SnugError::InvalidArchive(e.to_string()))?;
        if manifest.format != FORMAT {
            return Err(SnugError::InvalidArchive(format!(
                "unknown archive format: {}",
                manifest.format
            )));
        }
        if manifest.version != VERSION {
            return Err(SnugError::InvalidArchive(format!(
                "unsupported archive version: {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let mut manifest = ArchiveManifest::new(HashAlgorithm::Sha256);
        manifest
            .entries
            .push(ArchiveEntry::new_file("a.txt".into(), "deadbeef".into(), 4));
        manifest.entries.push(ArchiveEntry::new_directory("sub".into()));
        let encoded = manifest.encode().unwrap();
        let decoded = ArchiveManifest::decode(&encoded).unwrap();
        assert_eq!(decoded.entries.len(), 2);
        assert_eq!(decoded.format, FORMAT);
        assert_eq!(decoded.version, VERSION);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(ArchiveManifest::decode(b"not a real archive").is_err());
    }
}
