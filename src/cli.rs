//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::commands;
use packconf::output::OutputConfig;

/// packconf - Compose bundler configurations and drive builds
#[derive(Parser, Debug)]
#[command(name = "packconf")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute; a one-shot build when omitted
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalArgs,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Flags shared by every build-related command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Verbose output; raises the log level to debug
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Recompile when files change
    #[arg(short, long, global = true)]
    pub watch: bool,

    /// Environment name, loaded from `envs/<NAME>` when present
    #[arg(
        long,
        global = true,
        value_name = "NAME",
        env = "NODE_ENV",
        default_value = "development"
    )]
    pub env: String,

    /// User configuration file, relative to the working directory
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// External bundler command; descriptors are printed when unset
    #[arg(long, global = true, value_name = "CMD", env = "PACKCONF_BUNDLER")]
    pub bundler: Option<String>,

    /// Compile each target in its own worker process
    #[arg(long, global = true)]
    pub parallel: bool,

    /// Directory holding the tool's own loader modules
    #[arg(long, global = true, value_name = "DIR", env = "PACKCONF_TOOL_MODULES")]
    pub tool_modules: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compose every target and compile it once (the default)
    Build,

    /// Compose every target and run the development server
    Serve(commands::serve::ServeArgs),

    /// Print the resolved build descriptors as JSON
    Inspect,

    /// Run npm install in every local library, optionally updating git submodules
    InstallLibs(commands::install_libs::InstallLibsArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),

    /// Compile one target for a parent process
    #[command(hide = true)]
    Worker,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let level = if self.global.verbose {
            "debug"
        } else {
            self.log_level.as_str()
        };
        // RUST_LOG still takes precedence over the flag.
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
            .format_timestamp(None)
            .try_init();

        let output = OutputConfig::from_env_and_flag(&self.color);
        output.apply();

        match self.command {
            None | Some(Commands::Build) => commands::build::execute(&self.global, &output),
            Some(Commands::Serve(args)) => commands::serve::execute(&self.global, args, &output),
            Some(Commands::Inspect) => commands::inspect::execute(&self.global),
            Some(Commands::InstallLibs(args)) => commands::install_libs::execute(args, &output),
            Some(Commands::Completions(args)) => commands::completions::execute(args),
            Some(Commands::Worker) => commands::worker::execute(&self.global),
        }
    }
}
