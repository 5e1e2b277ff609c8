//! Validator (C11): checks that every file entry's hash is present in the
//! chunk store, without reading or extracting any payload (spec.md §4.11).

use std::path::Path;

use crate::error::Result;
use crate::manifest::{parser, EntryType};
use crate::store::ChunkStore;

#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    pub total: usize,
    pub found: usize,
    pub missing: usize,
    pub missing_hashes: Vec<String>,
}

impl ValidationReport {
    pub fn all_exist(&self) -> bool {
        self.missing == 0
    }
}

pub struct Validator<'a> {
    store: &'a dyn ChunkStore,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a dyn ChunkStore) -> Self {
        Self { store }
    }

    pub fn validate_archive(&self, archive_path: &Path) -> Result<ValidationReport> {
        let manifest = parser::parse(archive_path)?;
        let mut report = ValidationReport::default();

        for entry in &manifest.entries {
            if entry.entry_type != EntryType::File {
                continue;
            }
            let Some(hash) = &entry.hash else { continue };
            report.total += 1;
            if self.store.exists(hash)? {
                report.found += 1;
            } else {
                report.missing += 1;
                report.missing_hashes.push(hash.clone());
            }
        }

        Ok(report)
    }
}
