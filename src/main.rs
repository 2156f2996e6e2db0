//! Command-line interface for the stowage vault.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use stowage_store::{ContentStore, Identity};
use stowage_vault::Vault;

#[derive(Debug, Parser)]
#[command(name = "stowage", version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Snapshot a local folder into the archive
    Push {
        /// Archive directory holding the object store and index
        #[arg(long)]
        archive: PathBuf,
        /// Local folder to snapshot
        folder: PathBuf,
    },
    /// Restore the archived snapshot into a local folder
    Pop {
        /// Archive directory holding the object store and index
        #[arg(long)]
        archive: PathBuf,
        /// Local folder to restore into
        folder: PathBuf,
    },
    /// Print a file's content identity without archiving anything
    Identify {
        file: PathBuf,
    },
    /// Archive a single file's content, bypassing the index
    Store {
        #[arg(long)]
        archive: PathBuf,
        file: PathBuf,
    },
    /// Extract a single object by identity, bypassing the index
    Retrieve {
        #[arg(long)]
        archive: PathBuf,
        /// Content identity (64 lowercase hex characters)
        #[arg(long)]
        hash: Identity,
        destination: PathBuf,
    },
    /// Remove a single object by identity, bypassing the index
    Delete {
        #[arg(long)]
        archive: PathBuf,
        /// Content identity (64 lowercase hex characters)
        #[arg(long)]
        hash: Identity,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    if let Err(err) = run(cli.command).await {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Push { archive, folder } => {
            let vault = Vault::open(folder, archive).await?;
            let report = vault.push().await?;
            vault.close().await;
            println!("indexed {} files, archived {} new objects", report.files, report.stored);
        }
        Command::Pop { archive, folder } => {
            let vault = Vault::open(folder, archive).await?;
            let report = vault.pop().await?;
            vault.close().await;
            println!("restored {} files ({} skipped)", report.files, report.skipped);
        }
        Command::Identify { file } => {
            println!("{}", stowage_store::identify_file(&file).await?);
        }
        Command::Store { archive, file } => {
            println!("{}", ContentStore::new(archive).store(&file).await?);
        }
        Command::Retrieve { archive, hash, destination } => {
            ContentStore::new(archive).retrieve(hash, &destination).await?;
        }
        Command::Delete { archive, hash } => {
            ContentStore::new(archive).delete(hash).await?;
        }
    }
    Ok(())
}
