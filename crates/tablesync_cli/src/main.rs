//! TableSync CLI
//!
//! Offline tools for captured TableSync wire payloads.
//!
//! # Commands
//!
//! - `inspect-read` - Parse a captured read response
//! - `inspect-acks` - Parse a captured write response
//! - `timestamp` - Validate a wire timestamp

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TableSync wire payload tools.
#[derive(Parser)]
#[command(name = "tablesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a captured read response and print watermark, header and rows
    InspectRead {
        /// File holding the response body
        file: PathBuf,

        /// Maximum number of rows to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Parse a captured write acknowledgement body
    InspectAcks {
        /// File holding the response body
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate a wire timestamp
    Timestamp {
        /// Value to check, e.g. 2024-01-01T00:00:00Z
        value: String,
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
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::InspectRead {
            file,
            limit,
            format,
        } => {
            commands::inspect_read::run(&file, limit, &format)?;
        }
        Commands::InspectAcks { file, format } => {
            commands::inspect_acks::run(&file, &format)?;
        }
        Commands::Timestamp { value } => {
            commands::timestamp::run(&value)?;
        }
        Commands::Version => {
            println!("TableSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
