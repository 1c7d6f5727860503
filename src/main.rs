//! # packconf CLI
//!
//! Binary entry point for the `packconf` command-line tool.
//!
//! It parses the command line with `clap`, dispatches to the matching command
//! and lets `anyhow` report fatal errors with their cause chain. Composition,
//! dispatch and the worker protocol live in the `packconf` library crate.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
