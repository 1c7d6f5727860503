//! # Error Handling
//!
//! This module defines the centralized error type for `packconf`. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure
//! the composition engine, the builder and the worker pool can report.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Composition failures (`Config`, `Collision`,
//!   `LoaderNotFound`) abort the fragment chain of the current target; user
//!   configuration failures (`MissingUserConfig`, `UserConfigParse`) abort
//!   before any target is composed; process and compile failures
//!   (`ChildProcess`, `Compile`, `Worker`, `Workers`) are reported after
//!   dispatch to the bundler. `MissingLibDir` and `GitDirty` come from
//!   library installation.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Warnings reported by the bundler are never errors; they are only logged.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for packconf operations
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration step could not produce a usable descriptor.
    ///
    /// Raised when a function-form merge patch returns nothing, or when a
    /// built-in fragment meets an impossible setting.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Two fragments registered a plugin under the same name.
    #[error("Plugin definition collision for name \"{name}\"")]
    Collision { name: String },

    /// A loader was modified before anything registered it.
    #[error("Loader not found: \"{name}\"")]
    LoaderNotFound { name: String },

    /// The project has no user configuration file.
    #[error("Missing user configuration: {}", path.display())]
    MissingUserConfig { path: PathBuf },

    /// The user configuration file exists but could not be understood.
    #[error("User configuration parsing error in {}: {message}{}", path.display(), hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    UserConfigParse {
        path: PathBuf,
        message: String,
        /// Optional hint for how to fix the configuration
        hint: Option<String>,
    },

    /// A declarative plugin entry named a kind the catalog does not know.
    #[error("Unknown plugin kind \"{kind}\" for plugin \"{name}\"")]
    UnknownPlugin { name: String, kind: String },

    /// A plugin constructor rejected its parameters.
    #[error("Could not construct plugin \"{name}\": {message}")]
    PluginConstruct { name: String, message: String },

    /// Two scanned packages declared the same module alias.
    #[error("Alias collision: {alias} (from {}). Existing alias: {existing}", module.display())]
    AliasCollision {
        alias: String,
        module: PathBuf,
        existing: String,
    },

    /// An options override produced an invalid options record.
    #[error("Invalid option {option}: {message}")]
    InvalidOption { option: String, message: String },

    /// A spawned process exited unsuccessfully.
    #[error("Child process failed: {command} (exit code: {}){}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()), if stderr.is_empty() { String::new() } else { format!("\n{}", stderr.trim_end()) })]
    ChildProcess {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The project handed to the library installer is not a directory.
    #[error("Missing lib directory: {}", path.display())]
    MissingLibDir { path: PathBuf },

    /// The project has uncommitted changes and a clean tree was required.
    #[error("Changes detected in git project: {}", path.display())]
    GitDirty { path: PathBuf },

    /// The bundler reported compilation errors for a target.
    #[error("Compilation failed for {target}: {} error(s)\n{}", errors.len(), errors.join("\n"))]
    Compile { target: String, errors: Vec<String> },

    /// A worker process reported a structured failure.
    #[error("Worker for target {index} failed: {name}: {message}")]
    Worker {
        index: usize,
        name: String,
        message: String,
        stack: Option<String>,
    },

    /// One or more worker targets failed.
    #[error("{} of {total} target(s) failed:\n{}", failures.len(), failures.iter().map(|f| format!("  - {}", f)).collect::<Vec<_>>().join("\n"))]
    Workers { total: usize, failures: Vec<String> },

    /// Work was skipped because a sibling target failed first.
    #[error("Build cancelled")]
    Cancelled,

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Short name used when the error crosses the worker protocol.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::Config { .. } => "ConfigError",
            Error::Collision { .. } => "CollisionError",
            Error::LoaderNotFound { .. } => "NotFoundError",
            Error::MissingUserConfig { .. } => "MissingUserConfigError",
            Error::UserConfigParse { .. } => "UserConfigParseError",
            Error::UnknownPlugin { .. } => "UnknownPluginError",
            Error::PluginConstruct { .. } => "PluginConstructError",
            Error::AliasCollision { .. } => "AliasCollisionError",
            Error::InvalidOption { .. } => "InvalidOptionError",
            Error::ChildProcess { .. } => "ChildProcessError",
            Error::MissingLibDir { .. } => "MissingLibDirError",
            Error::GitDirty { .. } => "GitDirtyError",
            Error::Compile { .. } => "CompileError",
            Error::Worker { .. } => "WorkerError",
            Error::Workers { .. } => "WorkersError",
            Error::Cancelled => "CancelledError",
            Error::Io(_) => "IoError",
            Error::Yaml(_) => "YamlError",
            Error::Json(_) => "JsonError",
            Error::Glob(_) => "GlobError",
            Error::Regex(_) => "RegexError",
            Error::LockPoisoned { .. } => "LockPoisonedError",
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
