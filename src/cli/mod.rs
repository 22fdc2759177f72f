//! CLI module for recfile.
//!
//! A thin demonstration harness around the record store surface:
//! - info: print the record count of a table file
//! - fix: truncate a damaged table file to a record multiple
//! - dump: hex-dump a range of records
//! - demo: exercise a store end to end and print transfer metrics

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{demo, dump, fix, info, run, Config};
pub use errors::{CliError, CliResult};
