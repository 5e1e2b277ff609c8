use std::path::PathBuf;

use snug_core::archiver::ArchiveOptions;
use snug_core::config::{default_storage_root, SnugConfig};
use snug_core::error::Result;
use snug_core::extractor::ExtractOptions;
use snug_core::facade::Snug;
use snug_core::hash::HashAlgorithm;

fn open_snug(storage: Option<PathBuf>) -> Result<Snug> {
    let root = storage.unwrap_or_else(default_storage_root);
    Snug::new(root, &SnugConfig::default())
}

pub fn handle_create(
    source: PathBuf,
    output: PathBuf,
    storage: Option<PathBuf>,
    hash_algorithm: String,
    verbose: bool,
    follow_symlinks: bool,
    skip_permission_errors: bool,
    error_on_broken_symlinks: bool,
    ignore_patterns: Vec<String>,
) -> Result<()> {
    let snug = open_snug(storage)?;
    let options = ArchiveOptions {
        hash_algorithm: HashAlgorithm::parse(&hash_algorithm)?,
        verbose,
        follow_symlinks,
        skip_permission_errors,
        error_on_broken_symlinks,
        ignore_patterns,
        ..ArchiveOptions::default()
    };
    let manifest = snug.create_archive(&source, &output, &options)?;
    eprintln!(
        "create: wrote {} ({} entries) from {}",
        output.display(),
        manifest.entries.len(),
        source.display()
    );
    Ok(())
}

pub fn handle_extract(
    archive: PathBuf,
    output: PathBuf,
    storage: Option<PathBuf>,
    verbose: bool,
    preserve_permissions: bool,
) -> Result<()> {
    let snug = open_snug(storage)?;
    let options = ExtractOptions { verbose, preserve_permissions };
    let report = snug.extract_archive(&archive, &output, &options)?;
    eprintln!(
        "extract: {} entries extracted to {}",
        report.extracted,
        output.display()
    );
    for (path, reason) in &report.failed {
        eprintln!("extract: failed {path}: {reason}");
    }
    Ok(())
}

pub fn handle_gc(storage: Option<PathBuf>, hashes: Vec<String>) -> Result<()> {
    let snug = open_snug(storage)?;
    for hash in &hashes {
        snug.delete_chunk(hash)?;
        eprintln!("gc: removed {hash}");
    }
    Ok(())
}

pub fn handle_validate(archive: PathBuf, storage: Option<PathBuf>) -> Result<()> {
    let snug = open_snug(storage)?;
    let report = snug.validate_archive(&archive)?;
    eprintln!(
        "validate: {}/{} chunks present",
        report.found, report.total
    );
    for hash in &report.missing_hashes {
        println!("{hash}");
    }
    Ok(())
}

pub fn handle_list(archive: PathBuf) -> Result<()> {
    let snug = open_snug(None)?;
    let manifest = snug.contents(&archive)?;
    for entry in &manifest.entries {
        match entry.size {
            Some(size) => println!("{:>12}  {}", size, entry.path),
            None => println!("{:>12}  {}", "-", entry.path),
        }
    }
    Ok(())
}

pub fn handle_metadata(archive: PathBuf) -> Result<()> {
    let snug = open_snug(None)?;
    let manifest = snug.load_metadata(&archive)?;
    println!("format: {}", manifest.format);
    println!("version: {}", manifest.version);
    println!("hashAlgorithm: {}", manifest.hash_algorithm);
    if let Some(metadata) = &manifest.metadata {
        if let Some(tool) = &metadata.tool {
            println!("tool: {tool}");
        }
    }
    Ok(())
}
