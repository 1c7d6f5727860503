//! # CLI Command Implementations
//!
//! Each subcommand of the `packconf` tool lives in its own file. Commands that
//! compose targets share the [`Session`] below: the build settings derived from
//! the global flags, the environment snapshot and the loaded user targets.

pub mod build;
pub mod completions;
pub mod inspect;
pub mod install_libs;
pub mod serve;
pub mod worker;

use std::path::PathBuf;

use anyhow::Result;
use log::debug;

use packconf::builder::Builder;
use packconf::config::{get_user_configs, UserConfig, YamlUserConfigLoader};
use packconf::env::EnvironmentSnapshot;
use packconf::settings::{BuildSettings, ServeSettings};

use crate::cli::GlobalArgs;

/// Translate the global flags into build settings.
///
/// `serve` is set by the `serve` subcommand and switches the build into
/// dev-server mode.
pub fn settings_from_args(args: &GlobalArgs, serve: Option<ServeSettings>) -> BuildSettings {
    let mut settings = BuildSettings {
        env: args.env.clone(),
        verbose: args.verbose,
        watch: args.watch,
        enable_child_process: args.parallel,
        tool_modules_dir: args.tool_modules.clone(),
        bundler: args.bundler.clone(),
        ..Default::default()
    };
    if let Some(config) = &args.config {
        settings.user_config_name = config.to_string_lossy().into_owned();
    }
    if let Some(serve) = serve {
        settings.is_server = true;
        settings.serve = serve;
    }
    settings
}

/// Everything a command needs to compose the project's targets.
pub struct Session {
    pub settings: BuildSettings,
    pub cwd: PathBuf,
    pub env: EnvironmentSnapshot,
    pub user_configs: Vec<UserConfig>,
}

impl Session {
    /// Load the environment and user configuration for the current directory.
    pub fn load(settings: BuildSettings) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::load_in(settings, cwd)
    }

    pub fn load_in(settings: BuildSettings, cwd: PathBuf) -> Result<Self> {
        let env = EnvironmentSnapshot::load(&settings.env, &cwd, std::env::vars().collect())?;
        let user_configs = get_user_configs(&cwd, &settings, &YamlUserConfigLoader::default())?;
        debug!("Session settings: {:?}", settings);
        Ok(Self {
            settings,
            cwd,
            env,
            user_configs,
        })
    }

    pub fn builder(&self) -> Builder {
        Builder::new(self.settings.clone(), self.cwd.clone(), self.env.clone())
    }
}
