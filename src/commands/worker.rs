//! Hidden `worker` command: compile one target for a parent process.
//!
//! The parent writes a single JSON request line to stdin and reads the reply,
//! including the target's compile stats, from the last line of stdout. Settings come from the request, not from the
//! worker's own flags, so every worker composes exactly what the parent did.

use std::io;
use std::path::Path;

use anyhow::Result;
use log::info;

use packconf::builder::Builder;
use packconf::config::{get_user_configs, YamlUserConfigLoader};
use packconf::env::EnvironmentSnapshot;
use packconf::runtime::CompileStats;
use packconf::worker::{serve_worker, WorkerRequest};

use crate::cli::GlobalArgs;

/// Execute the `worker` command.
pub fn execute(_global: &GlobalArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    serve_worker(io::stdin().lock(), io::stdout(), |request| {
        compile_request(&cwd, request)
    })?;
    Ok(())
}

fn compile_request(cwd: &Path, request: &WorkerRequest) -> packconf::error::Result<CompileStats> {
    let settings = request.config.clone();
    let env = EnvironmentSnapshot::load(&settings.env, cwd, std::env::vars().collect())?;
    let user_configs = get_user_configs(cwd, &settings, &YamlUserConfigLoader::default())?;

    let stats = Builder::new(settings, cwd, env)
        .compile_index(&user_configs, request.webpack_config_index)?;
    info!("Worker finished {}", stats.target);
    Ok(stats)
}
