//! # Serve Command Implementation
//!
//! Runs the bundler's development server over every target. Each entry is
//! prefixed with the dev-server client (and the hot-only runtime with
//! `--hot`), and the first target must declare `output.publicPath`.

use anyhow::Result;
use clap::Args;

use packconf::output::OutputConfig;
use packconf::settings::ServeSettings;

use super::{build, settings_from_args};
use crate::cli::GlobalArgs;

/// Run the development server
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Enable hot module replacement
    #[arg(long)]
    pub hot: bool,

    /// Port the dev server listens on
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Host the dev server binds to
    #[arg(long, default_value = "localhost")]
    pub host: String,
}

impl From<ServeArgs> for ServeSettings {
    fn from(args: ServeArgs) -> Self {
        ServeSettings {
            use_hmr: args.hot,
            host: args.host,
            port: args.port,
        }
    }
}

/// Execute the `serve` command.
pub fn execute(global: &GlobalArgs, args: ServeArgs, output: &OutputConfig) -> Result<()> {
    build::run(settings_from_args(global, Some(args.into())), output)
}
