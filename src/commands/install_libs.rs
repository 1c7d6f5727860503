//! # Install Libs Command Implementation
//!
//! `packconf install-libs [--submodules]` prepares the libraries under
//! `lib/` and `modules/` of the current directory: optionally syncing git
//! submodules, then running `npm install` in each library that has a
//! `package.json`.

use anyhow::Result;
use clap::Args;
use console::style;

use packconf::install::{LibInstaller, SubmoduleStatus};
use packconf::output::{emoji, print_header, OutputConfig};

/// Install local libraries
#[derive(Args, Debug)]
pub struct InstallLibsArgs {
    /// Sync and update git submodules before installing
    #[arg(long)]
    pub submodules: bool,

    /// Fail instead of warning when the project has uncommitted changes
    #[arg(long, requires = "submodules")]
    pub require_clean: bool,
}

/// Execute the `install-libs` command.
pub fn execute(args: InstallLibsArgs, output: &OutputConfig) -> Result<()> {
    let cwd = std::env::current_dir()?;
    print_header(output, &format!("Installing libs for {}", cwd.display()));

    let report = LibInstaller::new()
        .with_submodules(args.submodules)
        .with_require_clean(args.require_clean)
        .run(&cwd)?;

    match report.submodules {
        SubmoduleStatus::Skipped => {}
        SubmoduleStatus::NotGit => println!("   Not a git project, submodules skipped"),
        SubmoduleStatus::Updated => println!("   Submodules updated"),
        SubmoduleStatus::UpdatedDirty => println!(
            "   {} Submodules updated with local changes present",
            emoji(output, "⚠️", "[WARN]")
        ),
    }
    for dir in &report.installed {
        let relative = dir.strip_prefix(&cwd).unwrap_or(dir);
        println!("   npm install: {}", relative.display());
    }
    println!(
        "{} {}",
        emoji(output, "✅", "[OK]"),
        style("install-libs complete!").green()
    );
    Ok(())
}
