//! recfile CLI entry point
//!
//! A minimal entrypoint that parses arguments via cli::run, prints errors
//! to stderr, and exits non-zero on failure. All logic lives in the CLI
//! module.

use recfile::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
