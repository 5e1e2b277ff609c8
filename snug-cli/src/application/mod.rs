pub mod handlers;

use clap::Parser;
use snug_core::error::Result;

use crate::presentation::cli::{Cli, Commands};

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Create {
            source,
            output,
            storage,
            hash_algorithm,
            verbose,
            follow_symlinks,
            skip_permission_errors,
            error_on_broken_symlinks,
            ignore_patterns,
        } => handlers::handle_create(
            source,
            output,
            storage,
            hash_algorithm,
            verbose,
            follow_symlinks,
            skip_permission_errors,
            error_on_broken_symlinks,
            ignore_patterns,
        ),
        Commands::Extract {
            archive,
            output,
            storage,
            verbose,
            preserve_permissions,
        } => handlers::handle_extract(archive, output, storage, verbose, preserve_permissions),
        Commands::Validate { archive, storage } => handlers::handle_validate(archive, storage),
        Commands::List { archive } => handlers::handle_list(archive),
        Commands::Metadata { archive } => handlers::handle_metadata(archive),
        Commands::Gc { storage, hashes } => handlers::handle_gc(storage, hashes),
    }
}
