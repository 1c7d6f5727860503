//! Shell completion scripts, generated with `clap_complete`.
//!
//! ```bash
//! packconf completions bash > ~/.local/share/bash-completion/completions/packconf
//! packconf completions zsh > ~/.zfunc/_packconf
//! ```

use std::io;

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::Shell;

use crate::cli::Cli;

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell (bash, elvish, fish, powershell, zsh)
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn execute(args: CompletionsArgs) -> Result<()> {
    let mut command = Cli::command();
    let bin_name = command.get_name().to_string();
    clap_complete::generate(args.shell, &mut command, bin_name, &mut io::stdout());
    Ok(())
}
