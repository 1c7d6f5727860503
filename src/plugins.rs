//! Bundler plugins and the catalog of known plugin kinds
//!
//! Fragments register plugins by name together with a constructor and its
//! parameters. Nothing is instantiated until the configurator resolves, which
//! is why constructors are stored rather than plugin values.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};

/// A live plugin instance inside a resolved descriptor.
pub trait Plugin: fmt::Debug + Send + Sync {
    /// Plugin kind understood by the bundler, e.g. `define`.
    fn kind(&self) -> &str;

    /// Options the bundler receives for this plugin.
    fn options(&self) -> Value;
}

/// Builds a plugin instance from registration parameters.
pub type PluginConstructor = Arc<dyn Fn(&[Value]) -> Result<Box<dyn Plugin>> + Send + Sync>;

/// Plugin whose options are its constructor parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BundlerPlugin {
    kind: String,
    params: Vec<Value>,
}

impl BundlerPlugin {
    pub fn new(kind: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

impl Plugin for BundlerPlugin {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn options(&self) -> Value {
        match self.params.as_slice() {
            [] => Value::Null,
            [single] => single.clone(),
            many => Value::Array(many.to_vec()),
        }
    }
}

/// Environment definitions injected into the bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinePlugin {
    definitions: serde_json::Map<String, Value>,
}

impl DefinePlugin {
    pub fn definitions(&self) -> &serde_json::Map<String, Value> {
        &self.definitions
    }
}

impl Plugin for DefinePlugin {
    fn kind(&self) -> &str {
        "define"
    }

    fn options(&self) -> Value {
        Value::Object(self.definitions.clone())
    }
}

/// Constructor that wraps its parameters in a [`BundlerPlugin`] of `kind`.
pub fn passthrough(kind: &str) -> PluginConstructor {
    let kind = kind.to_string();
    Arc::new(move |params: &[Value]| {
        Ok(Box::new(BundlerPlugin::new(kind.clone(), params.to_vec())) as Box<dyn Plugin>)
    })
}

/// Constructor for [`DefinePlugin`]; the first parameter must be an object.
pub fn define() -> PluginConstructor {
    Arc::new(|params: &[Value]| match params.first() {
        Some(Value::Object(definitions)) => Ok(Box::new(DefinePlugin {
            definitions: definitions.clone(),
        }) as Box<dyn Plugin>),
        _ => Err(Error::PluginConstruct {
            name: "define".to_string(),
            message: "expected an object of definitions as the first parameter".to_string(),
        }),
    })
}

pub const BUILTIN_KINDS: &[&str] = &[
    "define",
    "progress-bar",
    "hot-module-replacement",
    "uglify",
    "dedupe",
    "banner",
    "circular-dependency",
    "error-notification",
    "visualizer",
    "extract-text",
    "commons-chunk",
    "typescript-checker",
    "build-encryption",
];

/// Named plugin constructors available to declarative configuration.
#[derive(Clone)]
pub struct PluginCatalog {
    constructors: HashMap<String, PluginConstructor>,
}

impl PluginCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Catalog with every built-in plugin kind.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for kind in BUILTIN_KINDS {
            let constructor = if *kind == "define" {
                define()
            } else {
                passthrough(kind)
            };
            catalog.register(kind, constructor);
        }
        catalog
    }

    pub fn register(&mut self, kind: &str, constructor: PluginConstructor) {
        self.constructors.insert(kind.to_string(), constructor);
    }

    pub fn get(&self, kind: &str) -> Option<PluginConstructor> {
        self.constructors.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }
}

impl Default for PluginCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.constructors.keys().collect();
        kinds.sort();
        f.debug_struct("PluginCatalog").field("kinds", &kinds).finish()
    }
}
