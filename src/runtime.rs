//! Bundler runtimes
//!
//! A [`BundlerRuntime`] receives the resolved descriptors and does the actual
//! compilation. [`CommandRuntime`] drives an external bundler command;
//! [`DryRunRuntime`] prints the descriptors and compiles nothing, which is
//! the default when no bundler command is configured.
//!
//! The external command is invoked as
//!
//! ```text
//! <bundler> --config <cwd>/.packconf/descriptor-<i>.json [--watch | --serve --host H --port P]
//! ```
//!
//! and may print JSON stats (`{"assets": [...], "warnings": [...], "errors": [...]}`)
//! on stdout. Reported errors fail the target; warnings are only logged.
//!
//! In watch and serve mode the bundler keeps running and talks to the
//! terminal directly; packconf returns once it exits.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::BuildDescriptor;
use crate::error::{Error, Result};
use crate::process;
use crate::settings::{BuildSettings, RunMode};

/// Directory under the project holding descriptors handed to the bundler.
pub const DESCRIPTOR_DIR: &str = ".packconf";

/// Summary of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileStats {
    pub target: String,
    pub assets: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// Bundler output that was not JSON stats
    pub output: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStats {
    assets: Vec<Value>,
    warnings: Vec<Value>,
    errors: Vec<Value>,
}

fn describe_item(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Object(map) => {
            let label = map
                .get("name")
                .or_else(|| map.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string);
            label.unwrap_or_else(|| Value::Object(map).to_string())
        }
        other => other.to_string(),
    }
}

impl CompileStats {
    /// Parse bundler stdout; anything that is not a JSON stats object is kept
    /// verbatim in `output`.
    pub fn parse(target: &str, stdout: &str) -> Self {
        match serde_json::from_str::<RawStats>(stdout.trim()) {
            Ok(raw) => Self {
                target: target.to_string(),
                assets: raw.assets.into_iter().map(describe_item).collect(),
                warnings: raw.warnings.into_iter().map(describe_item).collect(),
                errors: raw.errors.into_iter().map(describe_item).collect(),
                output: None,
            },
            Err(_) => Self {
                target: target.to_string(),
                output: if stdout.trim().is_empty() {
                    None
                } else {
                    Some(stdout.to_string())
                },
                ..Default::default()
            },
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Log warnings and turn reported errors into [`Error::Compile`].
    pub fn into_result(self) -> Result<Self> {
        for warning in &self.warnings {
            warn!("{}: {}", self.target, warning);
        }
        if self.has_errors() {
            return Err(Error::Compile {
                target: self.target,
                errors: self.errors,
            });
        }
        Ok(self)
    }
}

/// Label for target `index` in logs and stats.
pub fn target_label(index: usize) -> String {
    format!("target-{}", index)
}

/// Compiles resolved descriptors.
pub trait BundlerRuntime: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "custom"
    }

    /// Compile one target once.
    fn compile_target(
        &self,
        index: usize,
        descriptor: &BuildDescriptor,
        settings: &BuildSettings,
    ) -> Result<CompileStats>;

    /// Hand every descriptor to the bundler in `mode`.
    ///
    /// The default compiles each target once, in order, stopping at the first
    /// failure.
    fn compile(
        &self,
        descriptors: &[BuildDescriptor],
        mode: RunMode,
        settings: &BuildSettings,
    ) -> Result<Vec<CompileStats>> {
        debug!("compile {} descriptor(s) in {:?} mode", descriptors.len(), mode);
        descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| self.compile_target(index, descriptor, settings))
            .collect()
    }
}

/// Runs an external bundler command.
#[derive(Debug, Clone)]
pub struct CommandRuntime {
    command: String,
    cwd: PathBuf,
}

impl CommandRuntime {
    /// `command` may carry arguments, separated by whitespace.
    pub fn new(command: &str, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.to_string(),
            cwd: cwd.into(),
        }
    }

    pub fn descriptor_path(&self, index: usize) -> PathBuf {
        self.cwd
            .join(DESCRIPTOR_DIR)
            .join(format!("descriptor-{}.json", index))
    }

    fn write_descriptor(&self, index: usize, descriptor: &BuildDescriptor) -> Result<PathBuf> {
        let path = self.descriptor_path(index);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(descriptor)?)?;
        debug!("Wrote descriptor {}", path.display());
        Ok(path)
    }

    fn command_line<'a>(&'a self, extra: &'a [String]) -> Result<(&'a str, Vec<&'a str>)> {
        let mut parts = self.command.split_whitespace();
        let program = parts.next().ok_or_else(|| Error::Config {
            message: "bundler command is empty".to_string(),
        })?;
        let args = parts.chain(extra.iter().map(String::as_str)).collect();
        Ok((program, args))
    }

    fn run(&self, extra: &[String]) -> Result<process::ProcessOutput> {
        let (program, args) = self.command_line(extra)?;
        process::run_child_process(program, &args, &self.cwd, None)
    }

    fn run_attached(&self, extra: &[String]) -> Result<()> {
        let (program, args) = self.command_line(extra)?;
        process::run_attached(program, &args, &self.cwd)
    }

    fn mode_args(mode: RunMode, settings: &BuildSettings) -> Vec<String> {
        match mode {
            RunMode::Once => Vec::new(),
            RunMode::Watch => vec!["--watch".to_string()],
            RunMode::Serve => vec![
                "--serve".to_string(),
                "--host".to_string(),
                settings.serve.host.clone(),
                "--port".to_string(),
                settings.serve.port.to_string(),
            ],
        }
    }
}

fn config_args(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .flat_map(|path| ["--config".to_string(), path.to_string_lossy().into_owned()])
        .collect()
}

impl BundlerRuntime for CommandRuntime {
    fn name(&self) -> &str {
        "command"
    }

    fn compile_target(
        &self,
        index: usize,
        descriptor: &BuildDescriptor,
        _settings: &BuildSettings,
    ) -> Result<CompileStats> {
        let target = target_label(index);
        info!("Compiling {}", target);
        let path = self.write_descriptor(index, descriptor)?;
        let output = self.run(&config_args(&[path]))?;
        CompileStats::parse(&target, &output.stdout).into_result()
    }

    fn compile(
        &self,
        descriptors: &[BuildDescriptor],
        mode: RunMode,
        settings: &BuildSettings,
    ) -> Result<Vec<CompileStats>> {
        if mode == RunMode::Once {
            return descriptors
                .iter()
                .enumerate()
                .map(|(index, descriptor)| self.compile_target(index, descriptor, settings))
                .collect();
        }

        // Watch and serve keep running, so every target goes to one process.
        let paths = descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| self.write_descriptor(index, descriptor))
            .collect::<Result<Vec<_>>>()?;
        let mut args = config_args(&paths);
        args.extend(Self::mode_args(mode, settings));
        info!("Starting bundler in {:?} mode", mode);

        self.run_attached(&args)?;
        info!("Bundler exited");
        Ok(vec![CompileStats {
            target: "all targets".to_string(),
            ..Default::default()
        }])
    }
}

/// Prints descriptors as JSON instead of compiling them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRuntime;

impl BundlerRuntime for DryRunRuntime {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn compile_target(
        &self,
        index: usize,
        descriptor: &BuildDescriptor,
        _settings: &BuildSettings,
    ) -> Result<CompileStats> {
        println!("{}", serde_json::to_string_pretty(descriptor)?);
        Ok(CompileStats {
            target: target_label(index),
            ..Default::default()
        })
    }

    fn compile(
        &self,
        descriptors: &[BuildDescriptor],
        mode: RunMode,
        _settings: &BuildSettings,
    ) -> Result<Vec<CompileStats>> {
        info!(
            "No bundler configured; printing {} descriptor(s) ({:?} mode)",
            descriptors.len(),
            mode
        );
        println!("{}", serde_json::to_string_pretty(descriptors)?);
        Ok((0..descriptors.len())
            .map(|index| CompileStats {
                target: target_label(index),
                ..Default::default()
            })
            .collect())
    }
}

/// Pick the runtime for `settings`: an external command if one is set.
pub fn runtime_for(settings: &BuildSettings, cwd: &Path) -> Box<dyn BundlerRuntime> {
    match &settings.bundler {
        Some(command) => Box::new(CommandRuntime::new(command, cwd)),
        None => Box::new(DryRunRuntime),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> BuildDescriptor {
        BuildDescriptor::new(json!({"entry": {"main": "./a"}}), Vec::new())
    }

    #[test]
    fn test_parse_json_stats() {
        let stats = CompileStats::parse(
            "target-0",
            r#"{"assets": ["main.js", {"name": "vendors.js", "size": 10}], "warnings": [{"message": "big"}], "errors": []}"#,
        );
        assert_eq!(stats.assets, vec!["main.js", "vendors.js"]);
        assert_eq!(stats.warnings, vec!["big"]);
        assert!(!stats.has_errors());
        assert_eq!(stats.output, None);
    }

    #[test]
    fn test_parse_plain_text() {
        let stats = CompileStats::parse("target-0", "Hash: abc\nTime: 10ms\n");
        assert!(stats.assets.is_empty());
        assert_eq!(stats.output.as_deref(), Some("Hash: abc\nTime: 10ms\n"));
    }

    #[test]
    fn test_errors_fail_and_warnings_pass() {
        let stats = CompileStats::parse("target-1", r#"{"errors": ["Module not found"]}"#);
        match stats.into_result() {
            Err(Error::Compile { target, errors }) => {
                assert_eq!(target, "target-1");
                assert_eq!(errors, vec!["Module not found"]);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let stats = CompileStats::parse("target-1", r#"{"warnings": ["slow"]}"#);
        assert!(stats.into_result().is_ok());
    }

    #[test]
    fn test_mode_args() {
        let settings = BuildSettings::default();
        assert!(CommandRuntime::mode_args(RunMode::Once, &settings).is_empty());
        assert_eq!(CommandRuntime::mode_args(RunMode::Watch, &settings), vec!["--watch"]);
        assert_eq!(
            CommandRuntime::mode_args(RunMode::Serve, &settings),
            vec!["--serve", "--host", "localhost", "--port", "8080"]
        );
    }

    #[test]
    fn test_dry_run_reports_each_target() {
        let stats = DryRunRuntime
            .compile(
                &[descriptor(), descriptor()],
                RunMode::Once,
                &BuildSettings::default(),
            )
            .unwrap();
        assert_eq!(
            stats.iter().map(|s| s.target.as_str()).collect::<Vec<_>>(),
            vec!["target-0", "target-1"]
        );
    }

    #[test]
    fn test_runtime_for_settings() {
        let settings = BuildSettings {
            bundler: Some("webpack".to_string()),
            ..Default::default()
        };
        // Only checks selection; nothing is run.
        assert_eq!(runtime_for(&settings, Path::new("/work")).name(), "command");
        assert_eq!(
            runtime_for(&BuildSettings::default(), Path::new("/work")).name(),
            "dry-run"
        );
    }

    #[cfg(unix)]
    mod command {
        use super::*;
        use tempfile::TempDir;

        fn script(temp: &TempDir, body: &str) -> String {
            let path = temp.path().join("bundler.sh");
            fs::write(&path, body).unwrap();
            format!("sh {}", path.display())
        }

        #[test]
        fn test_writes_descriptor_and_parses_stats() {
            let temp = TempDir::new().unwrap();
            let command = script(
                &temp,
                "test \"$1\" = --config && test -f \"$2\" && echo '{\"assets\":[\"main.js\"]}'\n",
            );
            let runtime = CommandRuntime::new(&command, temp.path());
            let stats = runtime
                .compile(&[descriptor()], RunMode::Once, &BuildSettings::default())
                .unwrap();

            assert_eq!(stats[0].assets, vec!["main.js"]);
            let written: Value =
                serde_json::from_str(&fs::read_to_string(runtime.descriptor_path(0)).unwrap())
                    .unwrap();
            assert_eq!(written["entry"]["main"], "./a");
            assert_eq!(written["plugins"], json!([]));
        }

        #[test]
        fn test_reported_errors_fail() {
            let temp = TempDir::new().unwrap();
            let command = script(&temp, "echo '{\"errors\":[\"Module not found\"]}'\n");
            let err = CommandRuntime::new(&command, temp.path())
                .compile(&[descriptor()], RunMode::Once, &BuildSettings::default())
                .unwrap_err();
            assert!(matches!(err, Error::Compile { .. }));
        }

        #[test]
        fn test_non_zero_exit_is_child_process_error() {
            let temp = TempDir::new().unwrap();
            let command = script(&temp, "echo broken >&2; exit 3\n");
            let err = CommandRuntime::new(&command, temp.path())
                .compile(&[descriptor()], RunMode::Once, &BuildSettings::default())
                .unwrap_err();
            match err {
                Error::ChildProcess { code, stderr, .. } => {
                    assert_eq!(code, Some(3));
                    assert!(stderr.contains("broken"));
                }
                other => panic!("unexpected: {:?}", other),
            }
        }

        #[test]
        fn test_watch_passes_every_config_to_one_process() {
            let temp = TempDir::new().unwrap();
            let command = script(&temp, "echo \"$@\" > args.txt\n");
            CommandRuntime::new(&command, temp.path())
                .compile(
                    &[descriptor(), descriptor()],
                    RunMode::Watch,
                    &BuildSettings::default(),
                )
                .unwrap();
            let args = fs::read_to_string(temp.path().join("args.txt")).unwrap();
            assert_eq!(args.matches("--config").count(), 2);
            assert!(args.trim_end().ends_with("--watch"));
        }

        #[test]
        fn test_serve_exit_code_fails() {
            let temp = TempDir::new().unwrap();
            let command = script(&temp, "echo \"$@\" > args.txt; exit 2\n");
            let err = CommandRuntime::new(&command, temp.path())
                .compile(&[descriptor()], RunMode::Serve, &BuildSettings::default())
                .unwrap_err();
            assert!(matches!(err, Error::ChildProcess { code: Some(2), .. }));
            let args = fs::read_to_string(temp.path().join("args.txt")).unwrap();
            assert!(args.contains("--serve --host localhost --port 8080"));
        }
    }
}
