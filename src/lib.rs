//! # packconf
//!
//! Layered configuration composition for a JavaScript module bundler. A
//! project declares one or more build targets; packconf composes each
//! target's bundler configuration from named fragments (the user's own, a
//! shared `common` base, and mode overlays for production, dev-server and
//! watch builds), resolves it into a finished descriptor and hands the
//! descriptors to the bundler.
//!
//! ## Quick Example
//!
//! ```
//! use packconf::configurator::Configurator;
//! use serde_json::json;
//!
//! let mut conf = Configurator::new("/work/project");
//! conf.merge(json!({"entry": {"main": "./src/index.js"}})).unwrap();
//!
//! // Rules are keyed by name; a later registration replaces an earlier one.
//! conf.loader("json", json!({"test": "\\.json$", "use": ["json-loader"]}));
//! conf.loader("json", json!({"test": "\\.json5?$", "use": ["json5-loader"]}));
//!
//! let descriptor = conf.resolve().unwrap();
//! assert_eq!(descriptor.rules().len(), 1);
//! assert_eq!(descriptor.rules()[0]["use"][0], "json5-loader");
//! ```
//!
//! ## Core Concepts
//!
//! - **Configurator (`configurator`)**: one descriptor under construction,
//!   plus name-keyed registries of rules and plugins.
//! - **Fragments (`fragments`)**: named configuration steps applied in
//!   sequence. The built-ins are `common`, `production`, `serve` and `watch`.
//! - **MultiConf (`multi_conf`)**: one target's configurator and options
//!   bag, with the chain of fragments applied so far.
//! - **User configuration (`config`)**: the project's `packconf.yaml`,
//!   loaded into declarative fragments.
//! - **Builder (`builder`)**: runs the fragment chain for every target and
//!   dispatches the resolved descriptors to a bundler runtime (`runtime`),
//!   optionally through worker processes (`worker`).
//!
//! ## Execution Flow
//!
//! 1.  **Settings**: the CLI produces [`settings::BuildSettings`] and an
//!     [`env::EnvironmentSnapshot`] for the requested environment.
//! 2.  **Discovery**: the user configuration file yields one
//!     [`config::UserConfig`] per target.
//! 3.  **Composition**: each target runs `configure`, `common`, the mode
//!     fragments and `post_configure`, strictly in order.
//! 4.  **Resolution**: every target's registries are flattened into a
//!     [`descriptor::BuildDescriptor`].
//! 5.  **Dispatch**: descriptors go to the bundler runtime, or to one worker
//!     process per target when multi-process compilation is enabled.
//!
//! Separately, `install` prepares the project's local libraries (git
//! submodules and `npm install`) before a build.

pub mod builder;
pub mod config;
pub mod configurator;
pub mod descriptor;
pub mod env;
pub mod error;
pub mod fragments;
pub mod install;
pub mod libs;
pub mod multi_conf;
pub mod options;
pub mod output;
pub mod plugins;
pub mod process;
pub mod runtime;
pub mod settings;
pub mod worker;

#[cfg(test)]
mod configurator_proptest;
