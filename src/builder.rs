//! # Builder
//!
//! Turns the user's targets into resolved descriptors and hands them to a
//! bundler runtime.
//!
//! For every target the fragment chain is:
//!
//! 1. the user's `configure` fragment
//! 2. `common`
//! 3. `production`, when the environment is `production`
//! 4. `serve` or `watch`, serve taking priority
//! 5. in serve mode, the dev-server client entries are prepended
//! 6. the user's `post_configure` fragment, if any
//!
//! Targets are composed one after another, never concurrently. Only the
//! final compilation may fan out across worker processes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use serde_json::{json, Value};

use crate::config::UserConfig;
use crate::configurator::Patch;
use crate::descriptor::BuildDescriptor;
use crate::env::EnvironmentSnapshot;
use crate::error::{Error, Result};
use crate::fragments::BuiltinFragment;
use crate::multi_conf::MultiConf;
use crate::options::MultiConfOptions;
use crate::runtime::{runtime_for, BundlerRuntime, CompileStats};
use crate::settings::{BuildSettings, RunMode, ServeSettings};
use crate::worker::{
    self, CancellationToken, OutcomeCallback, ProcessLauncher, WorkerLauncher,
};

/// Entry that makes the hot-module runtime refuse full reloads.
const HOT_ONLY_ENTRY: &str = "webpack/hot/only-dev-server";

/// Built-in fragments applied after the user's `configure`.
pub fn fragment_chain(settings: &BuildSettings) -> Vec<BuiltinFragment> {
    let mut chain = vec![BuiltinFragment::Common];
    if settings.is_production() {
        chain.push(BuiltinFragment::Production);
    }
    match settings.mode() {
        RunMode::Serve => chain.push(BuiltinFragment::Serve),
        RunMode::Watch => chain.push(BuiltinFragment::Watch),
        RunMode::Once => {}
    }
    chain
}

fn serve_entries(serve: &ServeSettings, original: Value) -> Value {
    let mut entries = vec![json!(format!("webpack-dev-server/client?{}", serve.client_url()))];
    if serve.use_hmr {
        entries.push(json!(HOT_ONLY_ENTRY));
    }
    match original {
        Value::Array(values) => entries.extend(values),
        other => entries.push(other),
    }
    Value::Array(entries)
}

/// Prepend the dev-server client (and hot-only runtime) to every entry.
fn rewrite_serve_entries(multi_conf: &mut MultiConf, serve: &ServeSettings) -> Result<()> {
    let serve = serve.clone();
    multi_conf.configurator_mut().merge(Patch::replace(move |mut document| {
        let entry = document.get_mut("entry").map(Value::take);
        let rewritten = match entry {
            Some(Value::Object(map)) => Value::Object(
                map.into_iter()
                    .map(|(name, value)| (name, serve_entries(&serve, value)))
                    .collect(),
            ),
            Some(Value::Null) | None => return Some(document),
            Some(single) => serve_entries(&serve, single),
        };
        document["entry"] = rewritten;
        Some(document)
    }))
}

/// Run the full fragment chain for each target, in order.
pub fn build_multi_confs(
    user_configs: &[UserConfig],
    settings: &BuildSettings,
    env: &EnvironmentSnapshot,
    cwd: &Path,
    token: &CancellationToken,
) -> Result<Vec<MultiConf>> {
    let chain = fragment_chain(settings);
    debug!(
        "Fragment chain: configure, {}",
        chain
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut multi_confs = Vec::with_capacity(user_configs.len());
    for user_config in user_configs {
        token.check()?;
        info!("Composing target: {}", user_config.name);

        let options = MultiConfOptions::new(env.clone(), settings.clone());
        let mut multi_conf = MultiConf::new(&user_config.name, cwd, options);

        multi_conf.append(user_config.configure.as_ref())?;
        for fragment in &chain {
            multi_conf.append(fragment)?;
        }
        if settings.mode() == RunMode::Serve {
            rewrite_serve_entries(&mut multi_conf, &settings.serve)?;
        }
        if let Some(post_configure) = &user_config.post_configure {
            multi_conf.append(post_configure.as_ref())?;
        }
        multi_confs.push(multi_conf);
    }
    Ok(multi_confs)
}

pub fn resolve_descriptors(multi_confs: &mut [MultiConf]) -> Result<Vec<BuildDescriptor>> {
    multi_confs.iter_mut().map(MultiConf::resolve).collect()
}

/// Composes targets and dispatches them to a runtime or the worker pool.
pub struct Builder {
    settings: BuildSettings,
    cwd: PathBuf,
    env: EnvironmentSnapshot,
    runtime: Box<dyn BundlerRuntime>,
    launcher: Option<Arc<dyn WorkerLauncher>>,
    concurrency: usize,
    token: CancellationToken,
}

impl Builder {
    /// Builder using the runtime selected by `settings`.
    pub fn new(settings: BuildSettings, cwd: impl Into<PathBuf>, env: EnvironmentSnapshot) -> Self {
        let cwd = cwd.into();
        let runtime = runtime_for(&settings, &cwd);
        Self {
            settings,
            cwd,
            env,
            runtime,
            launcher: None,
            concurrency: worker::default_concurrency(),
            token: CancellationToken::new(),
        }
    }

    pub fn with_runtime(mut self, runtime: Box<dyn BundlerRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Compose and resolve every target.
    pub fn compose(&self, user_configs: &[UserConfig]) -> Result<Vec<BuildDescriptor>> {
        let mut multi_confs =
            build_multi_confs(user_configs, &self.settings, &self.env, &self.cwd, &self.token)?;
        let descriptors = resolve_descriptors(&mut multi_confs)?;

        if self.settings.mode() == RunMode::Serve {
            let public_path = descriptors.first().and_then(BuildDescriptor::public_path);
            if public_path.is_none() {
                return Err(Error::Config {
                    message: "First build descriptor must specify output.publicPath".to_string(),
                });
            }
        }
        Ok(descriptors)
    }

    fn use_workers(&self, count: usize) -> bool {
        self.settings.enable_child_process && count > 1 && self.settings.mode() == RunMode::Once
    }

    pub fn start(&self, user_configs: &[UserConfig]) -> Result<Vec<CompileStats>> {
        self.start_with(user_configs, None)
    }

    /// Like [`Builder::start`], reporting worker outcomes to `on_outcome`.
    pub fn start_with(
        &self,
        user_configs: &[UserConfig],
        on_outcome: Option<OutcomeCallback<'_>>,
    ) -> Result<Vec<CompileStats>> {
        let descriptors = self.compose(user_configs)?;
        let mode = self.settings.mode();
        info!("Resolved {} descriptor(s), {:?} mode", descriptors.len(), mode);

        if !self.use_workers(descriptors.len()) {
            debug!("Using the {} runtime", self.runtime.name());
            return self.runtime.compile(&descriptors, mode, &self.settings);
        }

        let launcher: Arc<dyn WorkerLauncher> = match &self.launcher {
            Some(launcher) => Arc::clone(launcher),
            None => Arc::new(ProcessLauncher::current_exe(&self.cwd)?),
        };
        let outcomes = worker::run_workers(
            launcher.as_ref(),
            &self.settings,
            descriptors.len(),
            self.concurrency,
            &self.token,
            on_outcome,
        )?;
        worker::aggregate(outcomes)
    }

    /// Worker entry point: compose every target and compile only `index`.
    pub fn compile_index(&self, user_configs: &[UserConfig], index: usize) -> Result<CompileStats> {
        let descriptors = self.compose(user_configs)?;
        let descriptor = descriptors.get(index).ok_or_else(|| Error::Config {
            message: format!(
                "target index {} out of range ({} target(s))",
                index,
                descriptors.len()
            ),
        })?;
        self.runtime.compile_target(index, descriptor, &self.settings)
    }
}
