//! # User Configuration
//!
//! A project describes its build targets in `packconf.yaml`. The file holds
//! either one target or a sequence of targets:
//!
//! ```yaml
//! - name: app
//!   configure:
//!     options:
//!       use_jsx: true
//!     merge:
//!       entry: { main: ./src/index.jsx }
//!       output: { path: ./dist, publicPath: /static/ }
//!   post_configure:
//!     loader_includes:
//!       babel: ["glob:src/**"]
//!     remove_plugins: [progressBar]
//! - merge:
//!     entry: { server: ./server/index.js }
//!   options:
//!     backend_build: true
//! ```
//!
//! A target without a `configure:` key is itself the `configure` fragment.
//!
//! ## Fragment keys
//!
//! A declarative fragment applies its keys in this fixed order:
//!
//! 1. `options`: partial options override
//! 2. `merge`: partial descriptor, deep-merged
//! 3. `loaders`: name → rule, registered or overwritten
//! 4. `modify_loaders`: name → partial rule merged into the existing rule
//! 5. `loader_includes`: name → include conditions (`glob:` patterns allowed)
//! 6. `remove_loaders` and then `remove_plugins`
//! 7. `plugins`: `{name, kind, params}` entries looked up in the plugin catalog
//!
//! Library callers can skip the file and build [`UserConfig`] values with
//! code fragments directly.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::configurator::Configurator;
use crate::descriptor::{self, ArrayMerge};
use crate::error::{Error, Result};
use crate::fragments::Fragment;
use crate::options::MultiConfOptions;
use crate::plugins::PluginCatalog;
use crate::settings::BuildSettings;

const FRAGMENT_KEYS_HINT: &str = "fragment keys are: options, merge, loaders, modify_loaders, \
     loader_includes, remove_loaders, remove_plugins, plugins";

/// A plugin registration inside a declarative fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSpec {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// The declarative form of a fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FragmentSpec {
    pub options: Option<Value>,
    pub merge: Option<Value>,
    pub loaders: IndexMap<String, Value>,
    pub modify_loaders: IndexMap<String, Value>,
    pub loader_includes: IndexMap<String, Vec<Value>>,
    pub remove_loaders: Vec<String>,
    pub remove_plugins: Vec<String>,
    pub plugins: Vec<PluginSpec>,
}

/// A target entry with explicit `configure` and `post_configure` fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub configure: FragmentSpec,
    #[serde(default)]
    pub post_configure: Option<FragmentSpec>,
}

/// A [`FragmentSpec`] bound to the plugin catalog it resolves kinds against.
#[derive(Debug, Clone)]
pub struct DeclarativeFragment {
    name: String,
    spec: FragmentSpec,
    catalog: PluginCatalog,
}

impl DeclarativeFragment {
    pub fn new(name: &str, spec: FragmentSpec, catalog: PluginCatalog) -> Self {
        Self {
            name: name.to_string(),
            spec,
            catalog,
        }
    }

    pub fn spec(&self) -> &FragmentSpec {
        &self.spec
    }
}

impl Fragment for DeclarativeFragment {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, configurator: &mut Configurator, options: &mut MultiConfOptions) -> Result<()> {
        let spec = &self.spec;

        if let Some(overrides) = &spec.options {
            options.apply_overrides(overrides)?;
        }
        if let Some(patch) = &spec.merge {
            configurator.merge(patch.clone())?;
        }
        for (name, rule) in &spec.loaders {
            configurator.loader(name, rule.clone());
        }
        for (name, patch) in &spec.modify_loaders {
            configurator.modify_loader(name, |rule| {
                let mut next = rule.clone();
                descriptor::deep_merge(&mut next, patch, ArrayMerge::Replace);
                Some(next)
            })?;
        }
        for (name, conditions) in &spec.loader_includes {
            configurator.add_loader_include(name, conditions.iter().cloned())?;
        }
        for name in &spec.remove_loaders {
            configurator.remove_loader(name);
        }
        for name in &spec.remove_plugins {
            configurator.remove_plugin(name);
        }
        for plugin in &spec.plugins {
            let constructor = self
                .catalog
                .get(&plugin.kind)
                .ok_or_else(|| Error::UnknownPlugin {
                    name: plugin.name.clone(),
                    kind: plugin.kind.clone(),
                })?;
            configurator.plugin(&plugin.name, constructor, plugin.params.clone())?;
        }
        Ok(())
    }
}

/// One build target: a required `configure` fragment run before the built-in
/// fragments and an optional `post_configure` run after them.
#[derive(Clone)]
pub struct UserConfig {
    pub name: String,
    pub configure: Arc<dyn Fragment>,
    pub post_configure: Option<Arc<dyn Fragment>>,
}

impl UserConfig {
    pub fn new(name: &str, configure: impl Fragment + 'static) -> Self {
        Self {
            name: name.to_string(),
            configure: Arc::new(configure),
            post_configure: None,
        }
    }

    pub fn with_post_configure(mut self, post_configure: impl Fragment + 'static) -> Self {
        self.post_configure = Some(Arc::new(post_configure));
        self
    }
}

impl fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfig")
            .field("name", &self.name)
            .field("configure", &self.configure.name())
            .field(
                "post_configure",
                &self.post_configure.as_ref().map(|p| p.name().to_string()),
            )
            .finish()
    }
}

/// Loads the user's targets from a resolved path.
pub trait UserConfigLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<UserConfig>>;
}

/// Reads the YAML format described in the module docs.
#[derive(Debug, Clone, Default)]
pub struct YamlUserConfigLoader {
    catalog: PluginCatalog,
}

impl YamlUserConfigLoader {
    pub fn new(catalog: PluginCatalog) -> Self {
        Self { catalog }
    }
}

impl UserConfigLoader for YamlUserConfigLoader {
    fn load(&self, path: &Path) -> Result<Vec<UserConfig>> {
        let content = fs::read_to_string(path)?;
        parse(&content, path, &self.catalog)
    }
}

fn parse_error(path: &Path, message: impl Into<String>, hint: Option<&str>) -> Error {
    Error::UserConfigParse {
        path: path.to_path_buf(),
        message: message.into(),
        hint: hint.map(str::to_string),
    }
}

fn hint_for(message: &str) -> Option<&'static str> {
    if message.contains("unknown field") {
        Some(FRAGMENT_KEYS_HINT)
    } else if message.contains("missing field `configure`") {
        Some("a target with 'name' or 'post_configure' needs a 'configure:' block")
    } else {
        None
    }
}

fn parse_target(
    index: usize,
    raw: serde_yaml::Value,
    path: &Path,
    catalog: &PluginCatalog,
) -> Result<UserConfig> {
    let is_full = match &raw {
        serde_yaml::Value::Mapping(map) => ["configure", "post_configure", "name"]
            .iter()
            .any(|key| map.contains_key(*key)),
        _ => {
            return Err(parse_error(
                path,
                format!("target {} must be a mapping", index),
                Some("each target is a mapping of fragment keys or a 'configure:' block"),
            ))
        }
    };

    let target = if is_full {
        serde_yaml::from_value::<TargetSpec>(raw)
    } else {
        serde_yaml::from_value::<FragmentSpec>(raw).map(|configure| TargetSpec {
            name: None,
            configure,
            post_configure: None,
        })
    }
    .map_err(|e| {
        let message = format!("target {}: {}", index, e);
        let hint = hint_for(&message);
        parse_error(path, message, hint)
    })?;

    let name = target
        .name
        .unwrap_or_else(|| format!("target-{}", index));
    debug!("Parsed user target: {}", name);

    let configure = DeclarativeFragment::new("configure", target.configure, catalog.clone());
    let mut config = UserConfig::new(&name, configure);
    if let Some(post) = target.post_configure {
        config = config.with_post_configure(DeclarativeFragment::new(
            "post_configure",
            post,
            catalog.clone(),
        ));
    }
    Ok(config)
}

/// Parse the user configuration `content` read from `path`.
pub fn parse(content: &str, path: &Path, catalog: &PluginCatalog) -> Result<Vec<UserConfig>> {
    if content.trim().is_empty() {
        return Err(parse_error(
            path,
            "file is empty",
            Some("define at least one target with a 'configure:' block"),
        ));
    }

    let raw: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| {
        parse_error(path, e.to_string(), Some("check the YAML syntax near the reported line"))
    })?;

    let items = match raw {
        serde_yaml::Value::Sequence(items) => items,
        // Comments only
        serde_yaml::Value::Null => Vec::new(),
        other => vec![other],
    };
    if items.is_empty() {
        return Err(parse_error(
            path,
            "no targets defined",
            Some("define at least one target with a 'configure:' block"),
        ));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| parse_target(index, item, path, catalog))
        .collect()
}

/// Locate and load the user configuration for `project_dir`.
pub fn get_user_configs(
    project_dir: &Path,
    settings: &BuildSettings,
    loader: &dyn UserConfigLoader,
) -> Result<Vec<UserConfig>> {
    let path = project_dir.join(&settings.user_config_name);
    if !path.exists() {
        return Err(Error::MissingUserConfig { path });
    }
    info!("Loading user configuration: {}", path.display());
    let configs = loader.load(&path)?;
    debug!(
        "User targets: {:?}",
        configs.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
    );
    Ok(configs)
}
