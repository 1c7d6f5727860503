//! The options bag threaded through one target's fragment chain
//!
//! Every fragment receives the same [`MultiConfOptions`] by mutable reference,
//! so a user `configure` fragment can switch features on before `common`
//! reads them. The bag also carries the [`EnvironmentSnapshot`] and the
//! [`BuildSettings`] so fragments never consult process globals.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::{self, ArrayMerge};
use crate::env::EnvironmentSnapshot;
use crate::error::{Error, Result};
use crate::settings::BuildSettings;

/// Babel preset flavour for ES2015 sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Es2015Preset {
    #[default]
    Default,
    WithoutStrict,
}

/// When the current commit hash is embedded in the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitRevisionMode {
    #[default]
    Never,
    Production,
    Always,
}

impl GitRevisionMode {
    pub fn applies(self, node_env: &str) -> bool {
        match self {
            GitRevisionMode::Never => false,
            GitRevisionMode::Production => node_env == "production",
            GitRevisionMode::Always => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TsLoader {
    #[default]
    #[serde(rename = "ts-loader")]
    TsLoader,
    #[serde(rename = "awesome-typescript-loader")]
    AwesomeTypescriptLoader,
}

/// Options for excluding `node_modules` from backend bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeExternalsOptions {
    pub modules_from_file: bool,
    pub whitelist: Vec<String>,
}

impl Default for NodeExternalsOptions {
    fn default() -> Self {
        Self {
            modules_from_file: true,
            whitelist: Vec::new(),
        }
    }
}

/// Default value for a whitelisted environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvDefault {
    Value(String),
    /// Default chosen by `NODE_ENV`
    PerEnv(IndexMap<String, String>),
}

impl EnvDefault {
    pub fn for_env(&self, node_env: &str) -> Option<&str> {
        match self {
            EnvDefault::Value(value) => Some(value),
            EnvDefault::PerEnv(values) => values.get(node_env).map(String::as_str),
        }
    }
}

/// Environment variables exposed to the bundle.
///
/// The list form whitelists names without defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvWhitelist {
    List(Vec<String>),
    Map(IndexMap<String, EnvDefault>),
}

impl Default for EnvWhitelist {
    fn default() -> Self {
        EnvWhitelist::List(Vec::new())
    }
}

impl EnvWhitelist {
    /// Normalize to name → default.
    pub fn entries(&self) -> IndexMap<String, EnvDefault> {
        match self {
            EnvWhitelist::List(names) => names
                .iter()
                .map(|name| (name.clone(), EnvDefault::Value(String::new())))
                .collect(),
            EnvWhitelist::Map(entries) => entries.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultiConfOptions {
    pub use_stylus_extract_text: bool,
    pub use_vendor_chunk: bool,
    pub use_base64_font_loader: bool,
    pub use_react_hot: bool,
    pub backend_build: bool,
    pub devtool: Option<String>,
    pub use_circular_dependency_plugin: bool,
    pub use_notifications: bool,
    pub use_json_schema: bool,
    pub use_shaders: bool,
    pub es2015: Es2015Preset,
    pub use_git_revision_plugin: GitRevisionMode,
    pub use_visualizer_plugin: bool,
    pub typescript_ignore_diagnostics: Vec<u32>,
    pub node_externals: NodeExternalsOptions,
    pub scan_libs: bool,
    pub use_module_aliases: bool,
    pub env_whitelist: EnvWhitelist,
    pub flat_process_env: bool,
    pub ifdef_opts: Map<String, Value>,
    pub use_es_lint: bool,
    pub use_jsx: bool,
    pub use_typescript: bool,
    pub ts_loader: TsLoader,
    pub use_fonts: bool,
    pub use_stylus: bool,

    #[serde(skip)]
    pub env: EnvironmentSnapshot,
    #[serde(skip)]
    pub build: BuildSettings,
}

impl Default for MultiConfOptions {
    fn default() -> Self {
        Self {
            use_stylus_extract_text: false,
            use_vendor_chunk: false,
            use_base64_font_loader: false,
            use_react_hot: false,
            backend_build: false,
            devtool: None,
            use_circular_dependency_plugin: false,
            use_notifications: false,
            use_json_schema: false,
            use_shaders: false,
            es2015: Es2015Preset::Default,
            use_git_revision_plugin: GitRevisionMode::Never,
            use_visualizer_plugin: false,
            typescript_ignore_diagnostics: vec![
                // Module 'xxx' has no default export.
                1192,
                // Module 'xxx' has no exported member 'default'.
                2305,
                // Cannot find module
                2307,
            ],
            node_externals: NodeExternalsOptions::default(),
            scan_libs: false,
            use_module_aliases: false,
            env_whitelist: EnvWhitelist::default(),
            flat_process_env: true,
            ifdef_opts: Map::new(),
            use_es_lint: false,
            use_jsx: false,
            use_typescript: false,
            ts_loader: TsLoader::TsLoader,
            use_fonts: false,
            use_stylus: false,
            env: EnvironmentSnapshot::default(),
            build: BuildSettings::default(),
        }
    }
}

impl MultiConfOptions {
    pub fn new(env: EnvironmentSnapshot, build: BuildSettings) -> Self {
        Self {
            env,
            build,
            ..Default::default()
        }
    }

    /// Merge a partial options record into this one. Arrays replace.
    pub fn apply_overrides(&mut self, overrides: &Value) -> Result<()> {
        let fields = match overrides {
            Value::Object(fields) => fields,
            other => {
                return Err(Error::InvalidOption {
                    option: "options".to_string(),
                    message: format!("expected a mapping of options, got {}", other),
                })
            }
        };

        let mut current = serde_json::to_value(&*self)?;
        descriptor::deep_merge(&mut current, overrides, ArrayMerge::Replace);

        let mut next: MultiConfOptions =
            serde_json::from_value(current).map_err(|e| Error::InvalidOption {
                option: fields.keys().cloned().collect::<Vec<_>>().join(", "),
                message: e.to_string(),
            })?;
        next.env = std::mem::take(&mut self.env);
        next.build = std::mem::take(&mut self.build);
        *self = next;
        Ok(())
    }
}
