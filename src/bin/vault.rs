//! Vault CLI
//!
//! Command-line front end over the vault library: create a container,
//! add, fetch and remove files, defragment, and inspect contents.

use anyhow::Context;
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vault::{format_size, parse_size, Vault};

#[derive(Parser, Debug)]
#[command(name = "vault")]
#[command(version)]
#[command(about = "Single-file archive container")]
struct Cli {
    /// Path to the vault container file
    vault: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new vault of the given size (e.g. 10K, 1M)
    Init {
        /// Total container size, catalog included
        size: String,
    },
    /// List stored files
    List {
        /// Emit machine-readable JSON instead of the table
        #[arg(long)]
        json: bool,
    },
    /// Insert a file into the vault
    Add {
        /// File to insert; stored under its base name
        file: PathBuf,
    },
    /// Delete a stored file
    Rm {
        /// Stored file name
        name: String,
    },
    /// Extract a stored file into the current directory
    Fetch {
        /// Stored file name
        name: String,
    },
    /// Compact the data region, removing all gaps
    Defrag,
    /// Show vault statistics
    Status {
        /// Emit machine-readable JSON instead of the summary
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    // Subcommand names are accepted case-insensitively.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(cmd) = args.get_mut(2) {
        *cmd = cmd.to_lowercase();
    }
    let cli = Cli::parse_from(args);

    match cli.command {
        Command::Init { size } => {
            let bytes = parse_size(&size)?;
            Vault::init(&cli.vault, bytes)
                .with_context(|| format!("could not create vault at {}", cli.vault.display()))?;
            println!("Result: A vault created");
        }
        Command::List { json } => {
            let vault = Vault::open(&cli.vault)?;
            let entries = vault.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
                for entry in &entries {
                    let when = Local
                        .timestamp_opt(entry.inserted_at as i64, 0)
                        .single()
                        .map(|t| t.format("%A %b %d %H:%M:%S %Y").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<width$} {:>8} {:04o} {}",
                        entry.name,
                        format_size(entry.size),
                        entry.mode & 0o777,
                        when
                    );
                }
            }
            vault.close()?;
        }
        Command::Add { file } => {
            let mut vault = Vault::open(&cli.vault)?;
            let name = vault.add(&file)?;
            vault.close()?;
            println!("Result: {} inserted", name);
        }
        Command::Rm { name } => {
            let mut vault = Vault::open(&cli.vault)?;
            // A wipe failure still commits the catalog; persist it before
            // surfacing the error.
            let removed = vault.remove(&name);
            vault.close()?;
            removed?;
            println!("Result: {} deleted", name);
        }
        Command::Fetch { name } => {
            let mut vault = Vault::open(&cli.vault)?;
            vault.fetch(&name)?;
            vault.close()?;
            println!("Result: {} created", name);
        }
        Command::Defrag => {
            let mut vault = Vault::open(&cli.vault)?;
            vault.defragment()?;
            vault.close()?;
            println!("Result: Defragmentation complete");
        }
        Command::Status { json } => {
            let vault = Vault::open(&cli.vault)?;
            let status = vault.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Number of files: {}", status.file_count);
                println!("Total size: {}B", status.total_size);
                println!("Fragmentation ratio: {:.2}", status.fragmentation);
            }
            vault.close()?;
        }
    }

    Ok(())
}
