//! syncq CLI
//!
//! Command-line tools for a file-backed syncq queue.
//!
//! # Commands
//!
//! - `inspect` - Summarize queued operations
//! - `list` - List operations in sync order
//! - `cancel` - Remove one operation
//! - `purge` - Drop operations past retention

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// syncq offline queue tools.
#[derive(Parser)]
#[command(name = "syncq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the queue directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize queued operations
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List operations in sync order
    List {
        /// Only show operations for this table
        #[arg(short, long)]
        table: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove one operation from the queue
    Cancel {
        /// Operation ID
        id: String,
    },

    /// Drop operations older than the retention window
    Purge {
        /// Age threshold in days
        #[arg(short, long, default_value = "7")]
        older_than_days: u64,

        /// Dry run - show what would be removed
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Queue path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::List { table, format } => {
            let path = cli.path.ok_or("Queue path required for list")?;
            commands::list::run(&path, table.as_deref(), &format)?;
        }
        Commands::Cancel { id } => {
            let path = cli.path.ok_or("Queue path required for cancel")?;
            commands::cancel::run(&path, &id)?;
        }
        Commands::Purge {
            older_than_days,
            dry_run,
        } => {
            let path = cli.path.ok_or("Queue path required for purge")?;
            commands::purge::run(&path, older_than_days, dry_run)?;
        }
        Commands::Version => {
            println!("syncq CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("syncq engine v{}", syncq_engine::VERSION);
        }
    }

    Ok(())
}
