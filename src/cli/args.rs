//! CLI argument definitions using clap.
//!
//! Commands:
//! - recfile info --config <path>
//! - recfile fix --config <path>
//! - recfile dump --config <path> [--start N] [--count N]
//! - recfile demo --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// recfile - fixed-length-record flat-file storage
#[derive(Parser, Debug)]
#[command(name = "recfile")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log per-operation trace events (buffer flushes, window refills)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the record count of a table file
    Info {
        /// Path to configuration file
        #[arg(long, default_value = "./recfile.json")]
        config: PathBuf,
    },

    /// Truncate a damaged table file to a record multiple
    Fix {
        /// Path to configuration file
        #[arg(long, default_value = "./recfile.json")]
        config: PathBuf,
    },

    /// Hex-dump a range of records
    Dump {
        /// Path to configuration file
        #[arg(long, default_value = "./recfile.json")]
        config: PathBuf,

        /// First record to dump
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Number of records to dump (default: to the end)
        #[arg(long)]
        count: Option<u64>,
    },

    /// Exercise a store end to end and print transfer metrics
    Demo {
        /// Path to configuration file
        #[arg(long, default_value = "./recfile.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
