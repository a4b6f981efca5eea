//! Mailroom CLI
//!
//! Command-line tools for exercising the Mailroom transaction engine.
//!
//! # Commands
//!
//! - `stress` - Run concurrent writers against shared keys and check totals
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Mailroom command-line tools.
#[derive(Parser)]
#[command(name = "mailroom")]
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
    /// Run a contention stress test against an in-memory store
    Stress {
        /// Concurrent writer tasks
        #[arg(short, long, default_value = "8")]
        writers: usize,

        /// Transactions per writer
        #[arg(short, long, default_value = "50")]
        transactions: usize,

        /// Distinct keys shared by the writers
        #[arg(short, long, default_value = "4")]
        keys: usize,

        /// Simulated store latency per call, in milliseconds
        #[arg(long, default_value = "0")]
        latency_ms: u64,

        /// Writes that fail transiently at the start of the run
        #[arg(long, default_value = "0")]
        transient_failures: u32,

        /// Writes preceded by an interfering external write
        #[arg(long, default_value = "0")]
        interference: u32,

        /// Version conflicts tolerated per root before giving up
        #[arg(long, default_value = "64")]
        max_conflict_retries: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Stress {
            writers,
            transactions,
            keys,
            latency_ms,
            transient_failures,
            interference,
            max_conflict_retries,
            format,
        } => {
            let config = mailroom_testkit::StressConfig {
                writers,
                transactions_per_writer: transactions,
                keys,
                latency: (latency_ms > 0).then(|| Duration::from_millis(latency_ms)),
                transient_failures,
                interference,
                max_conflict_retries,
            };
            commands::stress::run(&config, &format).await?;
        }
        Commands::Version => {
            println!("Mailroom CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Mailroom Core v{}", mailroom_core::VERSION);
        }
    }

    Ok(())
}
