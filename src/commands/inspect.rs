//! # Inspect Command Implementation
//!
//! Prints the resolved build descriptors as a JSON array without invoking the
//! bundler. Useful for checking what the fragment chain produced.

use std::io;

use anyhow::Result;

use packconf::output::write_descriptors;

use super::{settings_from_args, Session};
use crate::cli::GlobalArgs;

/// Execute the `inspect` command.
pub fn execute(global: &GlobalArgs) -> Result<()> {
    let session = Session::load(settings_from_args(global, None))?;
    let descriptors = session.builder().compose(&session.user_configs)?;
    write_descriptors(io::stdout().lock(), &descriptors)?;
    Ok(())
}
