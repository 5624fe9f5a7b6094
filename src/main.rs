//! Main entry point for the qpak CLI application.
//!
//! This binary lists, builds, exports and edits Quake PAK files.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use qpak::{Archive, Cli, LocalDir};

/// Application entry point.
///
/// Parses command-line arguments, sets up logging and dispatches to the
/// handler for the selected mode.
fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.list {
        list(&cli)
    } else if cli.import {
        import(&cli)
    } else if cli.export {
        export(&cli)
    } else {
        delete(&cli)
    }
}

/// Print every entry with its size and position, in archive order.
fn list(cli: &Cli) -> Result<()> {
    let archive = Archive::open(&cli.file)
        .with_context(|| format!("Could not open {}", cli.file.display()))?;

    println!("{:>10}  {:>10}  Name", "Length", "Position");
    println!("{}", "-".repeat(60));

    let mut total = 0u64;
    let records = archive.list()?;
    for record in &records {
        println!(
            "{:>10}  {:>10}  {}",
            record.length, record.position, record.label
        );
        total += record.length as u64;
    }

    println!("{}", "-".repeat(60));
    println!("{:>10}  {:>10}  {} files", total, "", records.len());
    Ok(())
}

/// Import a directory tree or a single file, then rewrite the archive.
fn import(cli: &Cli) -> Result<()> {
    let mut archive = Archive::open_or_create(&cli.file)
        .with_context(|| format!("Could not open {}", cli.file.display()))?;
    let target = archive.find_path(cli.pak_path(), true)?;
    let source = LocalDir::new();

    if let Some(file) = &cli.entry {
        archive
            .add_file(&source, Path::new(file), target)
            .with_context(|| format!("Could not add {file}"))?;
        if !cli.quiet {
            println!("  adding: {file}");
        }
    } else {
        let dir = cli.directory();
        let added = archive
            .import_directory(&source, &dir, target)
            .with_context(|| format!("Could not import {}", dir.display()))?;
        if !cli.quiet {
            println!("  added {added} files from {}", dir.display());
        }
    }

    archive
        .write(&cli.file)
        .with_context(|| format!("Could not write {}", cli.file.display()))
}

/// Export the whole archive, one directory, or one entry.
fn export(cli: &Cli) -> Result<()> {
    let mut archive = Archive::open(&cli.file)
        .with_context(|| format!("Could not open {}", cli.file.display()))?;
    let dest = cli.directory();

    if let Some(label) = cli.entry_label() {
        let path = archive
            .export_entry(label, &dest)
            .with_context(|| format!("Could not export {label}"))?;
        if !cli.quiet {
            println!("  extracting: {}", path.display());
        }
        return Ok(());
    }

    let count = if cli.pak_path().is_empty() {
        archive.export_all(&dest)?
    } else {
        let node = archive.tree().lookup(cli.pak_path())?;
        archive.export_directory(node, &dest)?
    };
    if !cli.quiet {
        println!("  extracted {count} files to {}", dest.display());
    }
    Ok(())
}

/// Delete one entry or one directory, then rewrite the archive.
fn delete(cli: &Cli) -> Result<()> {
    let mut archive = Archive::open(&cli.file)
        .with_context(|| format!("Could not open {}", cli.file.display()))?;

    if let Some(label) = cli.entry_label() {
        archive.remove_entry(label)?;
    } else if !cli.pak_path().is_empty() {
        archive.remove_directory(cli.pak_path())?;
    } else {
        bail!("Nothing to delete: pass -D FILE or -p PAKPATH");
    }

    archive
        .write(&cli.file)
        .with_context(|| format!("Could not write {}", cli.file.display()))
}
