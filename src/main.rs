//! BANDCAST CLI entrypoint.
//!
//! Provides a thin wrapper over the `cli` module: parse args, run the
//! pipeline, and exit with a non-zero status on any fatal error.
//! For programmatic use, prefer the library API (`bandcast::api`).

use clap::Parser;

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();
    cli::run(args)
}
