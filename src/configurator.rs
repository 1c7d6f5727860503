//! # Configurator
//!
//! The configurator owns one descriptor document under construction plus two
//! name-keyed registries: transformation rules ("loaders") and plugins.
//! Fragments edit it in sequence; [`Configurator::resolve`] flattens the
//! registries into a [`BuildDescriptor`].
//!
//! ## Registration policies
//!
//! Both registries share [`Registry`], but with different insertion policies:
//!
//! - Rules use [`InsertPolicy::Overwrite`]. A later fragment registering the
//!   same name replaces the earlier rule in place, keeping its position.
//! - Plugins use [`InsertPolicy::RejectDuplicate`]. Registering a taken name is
//!   a [`Error::Collision`] and leaves the registry untouched.
//!
//! ## Resolution
//!
//! `resolve` never mutates the accumulated document. Every call starts from a
//! copy, appends registered rules after any rules merged directly into
//! `module.rules`, and instantiates a fresh plugin list, so repeated calls
//! yield the same descriptor.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use serde_json::{Map, Value};

use crate::descriptor::{self, ArrayMerge, BuildDescriptor, Condition};
use crate::error::{Error, Result};
use crate::plugins::PluginConstructor;

/// What happens when a name is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    Overwrite,
    RejectDuplicate,
}

/// Insertion-ordered, name-keyed registry.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    policy: InsertPolicy,
    entries: IndexMap<String, T>,
}

impl<T> Registry<T> {
    pub fn new(policy: InsertPolicy) -> Self {
        Self {
            policy,
            entries: IndexMap::new(),
        }
    }

    /// Register `value` under `name` according to the registry's policy.
    pub fn insert(&mut self, name: &str, value: T) -> Result<()> {
        match self.policy {
            InsertPolicy::Overwrite => {
                self.upsert(name, value);
                Ok(())
            }
            InsertPolicy::RejectDuplicate => {
                if self.entries.contains_key(name) {
                    return Err(Error::Collision {
                        name: name.to_string(),
                    });
                }
                self.entries.insert(name.to_string(), value);
                Ok(())
            }
        }
    }

    /// Register or replace `name` regardless of policy, returning the
    /// replaced value. A replaced entry keeps its original position.
    pub fn upsert(&mut self, name: &str, value: T) -> Option<T> {
        self.entries.insert(name.to_string(), value)
    }

    /// Remove `name`; absent names are ignored.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.entries.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A named transformation rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefinition {
    pub name: String,
    pub rule: Value,
}

/// A named plugin factory, instantiated at resolve time.
#[derive(Clone)]
pub struct PluginDefinition {
    pub name: String,
    pub constructor: PluginConstructor,
    pub params: Vec<Value>,
}

impl fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A change to the descriptor document.
pub enum Patch {
    /// Partial document, deep-merged into the current one
    Partial(Value),
    /// Function receiving the current document and returning its replacement
    Replace(Box<dyn FnOnce(Value) -> Option<Value>>),
}

impl Patch {
    pub fn replace<F>(f: F) -> Self
    where
        F: FnOnce(Value) -> Option<Value> + 'static,
    {
        Patch::Replace(Box::new(f))
    }
}

impl From<Value> for Patch {
    fn from(value: Value) -> Self {
        Patch::Partial(value)
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::Partial(value) => f.debug_tuple("Partial").field(value).finish(),
            Patch::Replace(_) => f.write_str("Replace(<function>)"),
        }
    }
}

/// Accumulates descriptor edits and named registrations.
#[derive(Debug)]
pub struct Configurator {
    document: Value,
    rules: Registry<RuleDefinition>,
    plugins: Registry<PluginDefinition>,
    cwd: PathBuf,
}

impl Configurator {
    /// Create an empty configurator; glob conditions resolve against `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            document: Value::Object(Map::new()),
            rules: Registry::new(InsertPolicy::Overwrite),
            plugins: Registry::new(InsertPolicy::RejectDuplicate),
            cwd: cwd.into(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// The document as accumulated so far, without registered rules or plugins.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Apply a partial document or a replacement function.
    ///
    /// A replacement function that returns `None`, `null` or a non-object fails
    /// with [`Error::Config`] and leaves the document unchanged.
    pub fn merge(&mut self, patch: impl Into<Patch>) -> Result<()> {
        match patch.into() {
            Patch::Partial(value) => {
                debug!("merge: {}", value);
                if !value.is_object() {
                    return Err(Error::Config {
                        message: format!("merge patch must be an object, got {}", value),
                    });
                }
                descriptor::deep_merge(&mut self.document, &value, ArrayMerge::Append);
            }
            Patch::Replace(f) => {
                debug!("merge: function");
                match f(self.document.clone()) {
                    Some(next) if next.is_object() => self.document = next,
                    _ => {
                        return Err(Error::Config {
                            message: "merge function must return a descriptor object".to_string(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Register or overwrite the rule called `name`.
    pub fn loader(&mut self, name: &str, rule: Value) {
        debug!("loader: {} {}", name, rule);
        let replaced = self.rules.upsert(
            name,
            RuleDefinition {
                name: name.to_string(),
                rule,
            },
        );
        if replaced.is_some() {
            debug!("loader: {} overwritten", name);
        }
    }

    /// Replace the rule called `name` with `f(current)`; `None` keeps it.
    pub fn modify_loader<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&Value) -> Option<Value>,
    {
        debug!("modifyLoader: {}", name);
        let definition = self
            .rules
            .get_mut(name)
            .ok_or_else(|| Error::LoaderNotFound {
                name: name.to_string(),
            })?;
        if let Some(rule) = f(&definition.rule) {
            debug!("> newRule={}", rule);
            definition.rule = rule;
        }
        Ok(())
    }

    pub fn remove_loader(&mut self, name: &str) {
        debug!("removeLoader: {}", name);
        self.rules.remove(name);
    }

    /// Append include conditions to the rule called `name`.
    ///
    /// Strings prefixed with `glob:` become path conditions relative to the
    /// working directory. A non-array `include` becomes a one-element list
    /// first.
    pub fn add_loader_include<I, V>(&mut self, name: &str, conditions: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let resolved = conditions
            .into_iter()
            .map(|raw| Condition::resolve(raw.into(), &self.cwd).map(|c| c.to_value()))
            .collect::<Result<Vec<_>>>()?;

        self.modify_loader(name, move |current| {
            let mut rule = current.clone();
            let rule_map = match rule.as_object_mut() {
                Some(map) => map,
                None => return None,
            };
            let mut include = match rule_map.remove("include") {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(single) => vec![single],
            };
            include.extend(resolved);
            rule_map.insert("include".to_string(), Value::Array(include));
            Some(rule)
        })
    }

    /// Register a plugin factory; a taken name is a [`Error::Collision`].
    pub fn plugin(
        &mut self,
        name: &str,
        constructor: PluginConstructor,
        params: Vec<Value>,
    ) -> Result<()> {
        debug!("plugin: {}", name);
        self.plugins.insert(
            name,
            PluginDefinition {
                name: name.to_string(),
                constructor,
                params,
            },
        )
    }

    pub fn remove_plugin(&mut self, name: &str) {
        debug!("removePlugin: {}", name);
        self.plugins.remove(name);
    }

    pub fn rule(&self, name: &str) -> Option<&Value> {
        self.rules.get(name).map(|definition| &definition.rule)
    }

    pub fn has_loader(&self, name: &str) -> bool {
        self.rules.contains(name)
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains(name)
    }

    pub fn plugin_definition(&self, name: &str) -> Option<&PluginDefinition> {
        self.plugins.get(name)
    }

    pub fn loader_names(&self) -> Vec<&str> {
        self.rules.names().collect()
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.names().collect()
    }

    /// Materialize the registries into a finished descriptor.
    pub fn resolve(&self) -> Result<BuildDescriptor> {
        debug!("resolve");
        let mut document = self.document.clone();

        debug!("> Building plugin instances");
        let mut plugins = Vec::with_capacity(self.plugins.len());
        for definition in self.plugins.values() {
            debug!("> creating new plugin instance: {}", definition.name);
            let plugin = (definition.constructor)(&definition.params).map_err(|e| match e {
                Error::PluginConstruct { message, .. } => Error::PluginConstruct {
                    name: definition.name.clone(),
                    message,
                },
                other => other,
            })?;
            plugins.push(plugin);
        }

        debug!("> Building rules");
        let rules = descriptor::rules_mut(&mut document);
        rules.extend(self.rules.values().map(|definition| definition.rule.clone()));

        Ok(BuildDescriptor::new(document, plugins))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{define, passthrough};
    use serde_json::json;

    fn configurator() -> Configurator {
        Configurator::new("/work/project")
    }

    #[test]
    fn test_merge_partial_deep_merges() {
        let mut conf = configurator();
        conf.merge(json!({"entry": {"main": "./a"}})).unwrap();
        conf.merge(json!({"entry": {"admin": "./b"}, "output": {"path": "/dist"}}))
            .unwrap();
        assert_eq!(
            conf.document(),
            &json!({"entry": {"main": "./a", "admin": "./b"}, "output": {"path": "/dist"}})
        );
    }

    #[test]
    fn test_merge_function_replaces_document() {
        let mut conf = configurator();
        conf.merge(json!({"entry": {"main": "./a"}})).unwrap();
        conf.merge(Patch::replace(|mut current| {
            current["devtool"] = json!("source-map");
            Some(current)
        }))
        .unwrap();
        assert_eq!(conf.document()["devtool"], "source-map");
        assert_eq!(conf.document()["entry"]["main"], "./a");
    }

    #[test]
    fn test_merge_function_returning_nothing_fails() {
        let mut conf = configurator();
        conf.merge(json!({"entry": {"main": "./a"}})).unwrap();
        let err = conf.merge(Patch::replace(|_| None)).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        // The document survives the failed merge.
        assert_eq!(conf.document()["entry"]["main"], "./a");

        let err = conf.merge(Patch::replace(|_| Some(Value::Null))).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_merge_rejects_non_object_patch() {
        let mut conf = configurator();
        assert!(conf.merge(json!([1, 2])).is_err());
    }

    #[test]
    fn test_loader_last_registration_wins() {
        let mut conf = configurator();
        conf.loader("json", json!({"test": "a"}));
        conf.loader("babel", json!({"test": "b"}));
        conf.loader("json", json!({"test": "c"}));

        let descriptor = conf.resolve().unwrap();
        assert_eq!(descriptor.rules(), &[json!({"test": "c"}), json!({"test": "b"})]);
    }

    #[test]
    fn test_modify_loader_replaces_rule() {
        let mut conf = configurator();
        conf.loader("babel", json!({"test": "\\.js$"}));
        conf.modify_loader("babel", |rule| {
            let mut rule = rule.clone();
            rule["exclude"] = json!("node_modules");
            Some(rule)
        })
        .unwrap();
        assert_eq!(
            conf.rule("babel").unwrap(),
            &json!({"test": "\\.js$", "exclude": "node_modules"})
        );
    }

    #[test]
    fn test_modify_loader_returning_none_is_noop() {
        let mut conf = configurator();
        conf.loader("babel", json!({"test": "\\.js$"}));
        conf.modify_loader("babel", |_| None).unwrap();
        assert_eq!(conf.rule("babel").unwrap(), &json!({"test": "\\.js$"}));
    }

    #[test]
    fn test_modify_missing_loader_fails() {
        let mut conf = configurator();
        let err = conf.modify_loader("nope", |r| Some(r.clone())).unwrap_err();
        assert!(matches!(err, Error::LoaderNotFound { ref name } if name == "nope"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut conf = configurator();
        conf.loader("json", json!({}));
        conf.plugin("define", define(), vec![json!({})]).unwrap();
        conf.remove_loader("json");
        conf.remove_loader("json");
        conf.remove_plugin("define");
        conf.remove_plugin("define");
        conf.remove_plugin("never-registered");
        assert!(!conf.has_loader("json"));
        assert!(!conf.has_plugin("define"));
    }

    #[test]
    fn test_add_loader_include_without_prior_include() {
        let mut conf = configurator();
        conf.loader("babel", json!({"test": "\\.js$"}));
        conf.add_loader_include("babel", ["glob:src/**"]).unwrap();

        let include = conf.rule("babel").unwrap()["include"].as_array().unwrap();
        assert_eq!(include.len(), 1);
        let condition = Condition::from_value(&include[0]).unwrap();
        assert!(condition.matches_path(Path::new("/work/project/src/a/b/c.js")));
        assert!(!condition.matches_path(Path::new("/work/project/test/a.js")));
    }

    #[test]
    fn test_add_loader_include_normalizes_scalar() {
        let mut conf = configurator();
        conf.loader("babel", json!({"include": "/vendor"}));
        conf.add_loader_include("babel", vec![json!("/shared"), json!("glob:lib/*.js")])
            .unwrap();
        assert_eq!(
            conf.rule("babel").unwrap()["include"],
            json!(["/vendor", "/shared", {"glob": "/work/project/lib/*.js"}])
        );
    }

    #[test]
    fn test_add_loader_include_missing_loader() {
        let mut conf = configurator();
        assert!(matches!(
            conf.add_loader_include("babel", ["glob:src/**"]),
            Err(Error::LoaderNotFound { .. })
        ));
    }

    #[test]
    fn test_plugin_collision_keeps_original() {
        let mut conf = configurator();
        conf.plugin("compress", passthrough("uglify"), vec![]).unwrap();
        let err = conf
            .plugin("compress", passthrough("dedupe"), vec![])
            .unwrap_err();
        assert!(matches!(err, Error::Collision { ref name } if name == "compress"));

        let descriptor = conf.resolve().unwrap();
        assert_eq!(descriptor.plugins().len(), 1);
        assert_eq!(descriptor.plugins()[0].kind(), "uglify");
    }

    #[test]
    fn test_resolve_orders_plugins_and_rules_by_registration() {
        let mut conf = configurator();
        conf.merge(json!({"module": {"rules": [{"test": "direct"}]}}))
            .unwrap();
        conf.loader("a", json!({"test": "a"}));
        conf.loader("b", json!({"test": "b"}));
        conf.plugin("p1", passthrough("progress-bar"), vec![]).unwrap();
        conf.plugin("p2", passthrough("dedupe"), vec![]).unwrap();

        let descriptor = conf.resolve().unwrap();
        assert_eq!(
            descriptor.rules(),
            &[json!({"test": "direct"}), json!({"test": "a"}), json!({"test": "b"})]
        );
        let kinds: Vec<&str> = descriptor.plugins().iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec!["progress-bar", "dedupe"]);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut conf = configurator();
        conf.loader("json", json!({"test": "\\.json$"}));
        conf.plugin("define", define(), vec![json!({"A": "1"})]).unwrap();

        let first = conf.resolve().unwrap();
        let second = conf.resolve().unwrap();
        assert_eq!(first.to_value(), second.to_value());
        assert_eq!(second.rules().len(), 1);
        assert_eq!(second.plugins().len(), 1);
    }

    #[test]
    fn test_resolve_reports_constructor_failure_by_name() {
        let mut conf = configurator();
        conf.plugin("webpackDefine", define(), vec![json!("bad")])
            .unwrap();
        let err = conf.resolve().unwrap_err();
        assert!(
            matches!(err, Error::PluginConstruct { ref name, .. } if name == "webpackDefine")
        );
    }

    #[test]
    fn test_registry_policies() {
        let mut rules: Registry<u8> = Registry::new(InsertPolicy::Overwrite);
        rules.insert("a", 1).unwrap();
        rules.insert("b", 2).unwrap();
        rules.insert("a", 3).unwrap();
        assert_eq!(rules.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(rules.get("a"), Some(&3));

        let mut plugins: Registry<u8> = Registry::new(InsertPolicy::RejectDuplicate);
        plugins.insert("a", 1).unwrap();
        assert!(plugins.insert("a", 2).is_err());
        assert_eq!(plugins.get("a"), Some(&1));
        assert_eq!(plugins.remove("a"), Some(1));
        assert!(plugins.remove("a").is_none());
        assert!(plugins.is_empty());
    }

    #[test]
    fn test_registry_upsert_ignores_policy() {
        let mut plugins: Registry<u8> = Registry::new(InsertPolicy::RejectDuplicate);
        assert_eq!(plugins.upsert("a", 1), None);
        assert_eq!(plugins.upsert("b", 2), None);
        assert_eq!(plugins.upsert("a", 3), Some(1));
        assert_eq!(plugins.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(plugins.get("a"), Some(&3));
    }
}
