//! # Build Command Implementation
//!
//! Implements `build`, the default command: compose every target in the user
//! configuration and hand the descriptors to the bundler. `--watch` keeps the
//! bundler running; `--parallel` compiles each target in a worker process and
//! shows a progress bar while they run.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use packconf::output::{print_header, print_stats, OutputConfig};
use packconf::runtime::{target_label, CompileStats};
use packconf::settings::BuildSettings;
use packconf::worker::{OutcomeCallback, TargetOutcome};

use super::{settings_from_args, Session};
use crate::cli::GlobalArgs;

/// Execute the `build` command.
pub fn execute(global: &GlobalArgs, output: &OutputConfig) -> Result<()> {
    run(settings_from_args(global, None), output)
}

/// Compose and compile with `settings`; shared with `serve`.
pub fn run(settings: BuildSettings, output: &OutputConfig) -> Result<()> {
    let session = Session::load(settings)?;
    let stats = if session.settings.enable_child_process {
        compile_with_progress(&session)?
    } else {
        session.builder().start(&session.user_configs)?
    };

    // Without a bundler the descriptors themselves are the output.
    if session.settings.bundler.is_some() {
        print_header(output, &format!("Built {} target(s)", stats.len()));
        print_stats(output, &stats);
    }
    Ok(())
}

fn compile_with_progress(session: &Session) -> Result<Vec<CompileStats>> {
    let bar = ProgressBar::new(session.user_configs.len() as u64);
    bar.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{pos}/{len}] {msg}",
    )?);

    let report = |outcome: &TargetOutcome| {
        let label = target_label(outcome.index());
        let status = match outcome {
            TargetOutcome::Succeeded { .. } => "compiled",
            TargetOutcome::Failed { .. } => "failed",
            TargetOutcome::Cancelled { .. } => "cancelled",
        };
        bar.inc(1);
        bar.set_message(format!("{} {}", label, status));
    };
    let callback: OutcomeCallback<'_> = &report;

    let result = session
        .builder()
        .start_with(&session.user_configs, Some(callback));
    bar.finish_and_clear();
    Ok(result?)
}
