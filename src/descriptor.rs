//! Build descriptors and the deep merge used to assemble them
//!
//! A descriptor is the configuration document handed to the bundler runtime.
//! While fragments run, the [`Configurator`](crate::configurator::Configurator)
//! keeps it as a plain JSON object; [`BuildDescriptor`] is the resolved form
//! that additionally owns live plugin instances.
//!
//! ## Merge semantics
//!
//! - Objects: merged key by key, recursing into nested objects
//! - Arrays: appended ([`ArrayMerge::Append`]) or replaced ([`ArrayMerge::Replace`])
//! - Scalars and type mismatches: the incoming value wins

use std::path::Path;

use glob::{MatchOptions, Pattern};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::plugins::Plugin;

/// Prefix marking an include condition as a working-directory relative glob.
pub const GLOB_MARKER: &str = "glob:";

/// How arrays in a patch combine with arrays already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayMerge {
    /// Patch items are appended after existing items
    Append,
    /// The patch array replaces the existing array
    Replace,
}

/// Recursively merge `source` into `target`.
pub fn deep_merge(target: &mut Value, source: &Value, arrays: ArrayMerge) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value, arrays),
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(target_array), Value::Array(source_array)) => match arrays {
            ArrayMerge::Append => target_array.extend(source_array.iter().cloned()),
            ArrayMerge::Replace => *target_array = source_array.clone(),
        },
        (target, source) => *target = source.clone(),
    }
}

/// Get a mutable child object of `value`, creating it (or replacing a
/// non-object) when needed.
pub fn object_entry<'a>(value: &'a mut Value, key: &str) -> &'a mut Map<String, Value> {
    let child = ensure_object(value)
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    ensure_object(child)
}

/// Ensure `module.rules` exists as an array and return it.
pub fn rules_mut(document: &mut Value) -> &mut Vec<Value> {
    let rules = object_entry(document, "module")
        .entry("rules".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    ensure_array(rules)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            *other = Value::Object(Map::new());
            ensure_object(other)
        }
    }
}

fn ensure_array(value: &mut Value) -> &mut Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => {
            *other = Value::Array(Vec::new());
            ensure_array(other)
        }
    }
}

/// An include/exclude condition attached to a rule.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Absolute path pattern with globstar semantics
    Glob(Pattern),
    /// Any other condition, passed through to the bundler untouched
    Other(Value),
}

impl Condition {
    /// Turn a user-supplied condition into its stored form.
    ///
    /// Strings starting with [`GLOB_MARKER`] are resolved against `cwd`.
    pub fn resolve(raw: Value, cwd: &Path) -> Result<Self> {
        match raw.as_str().and_then(|s| s.strip_prefix(GLOB_MARKER)) {
            Some(relative) => {
                let relative = relative.trim_start_matches("./");
                let pattern = if Path::new(relative).is_absolute() {
                    relative.to_string()
                } else {
                    let base = Pattern::escape(&cwd.to_string_lossy());
                    format!("{}/{}", base.trim_end_matches('/'), relative)
                };
                Ok(Condition::Glob(Pattern::new(&pattern)?))
            }
            None => Ok(Condition::Other(raw)),
        }
    }

    /// Read a stored condition back.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value.get("glob").and_then(Value::as_str) {
            Some(pattern) if value.as_object().map(Map::len) == Some(1) => {
                Ok(Condition::Glob(Pattern::new(pattern)?))
            }
            _ => Ok(Condition::Other(value.clone())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Condition::Glob(pattern) => serde_json::json!({ "glob": pattern.as_str() }),
            Condition::Other(value) => value.clone(),
        }
    }

    /// Whether `path` satisfies a path condition. Non-path conditions are
    /// evaluated by the bundler and never match here.
    pub fn matches_path(&self, path: &Path) -> bool {
        match self {
            Condition::Glob(pattern) => pattern.matches_path_with(
                path,
                MatchOptions {
                    case_sensitive: true,
                    require_literal_separator: true,
                    require_literal_leading_dot: false,
                },
            ),
            Condition::Other(_) => false,
        }
    }
}

/// A fully resolved build descriptor.
#[derive(Debug)]
pub struct BuildDescriptor {
    document: Value,
    plugins: Vec<Box<dyn Plugin>>,
}

impl BuildDescriptor {
    pub fn new(document: Value, plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { document, plugins }
    }

    /// The configuration document without plugins.
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Value {
        &mut self.document
    }

    pub fn plugins(&self) -> &[Box<dyn Plugin>] {
        &self.plugins
    }

    /// Look up a value by JSON pointer, e.g. `/output/publicPath`.
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        self.document.pointer(pointer)
    }

    pub fn entry(&self) -> Option<&Map<String, Value>> {
        self.document.get("entry").and_then(Value::as_object)
    }

    pub fn rules(&self) -> &[Value] {
        self.document
            .pointer("/module/rules")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn dev_server(&self) -> Option<&Value> {
        self.document.get("devServer")
    }

    pub fn is_watch(&self) -> bool {
        self.document
            .get("watch")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Public path of the output, required for the dev server.
    pub fn public_path(&self) -> Option<&str> {
        self.get("/output/publicPath").and_then(Value::as_str)
    }

    /// Serialize the document together with its plugin list.
    pub fn to_value(&self) -> Value {
        let mut document = self.document.clone();
        let plugins = self
            .plugins
            .iter()
            .map(|plugin| {
                serde_json::json!({
                    "kind": plugin.kind(),
                    "options": plugin.options(),
                })
            })
            .collect();
        if let Value::Object(map) = &mut document {
            map.insert("plugins".to_string(), Value::Array(plugins));
        }
        document
    }
}

impl Serialize for BuildDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.to_value() {
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in &map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            other => other.serialize(serializer),
        }
    }
}

/// Require `value` to be an object, as every descriptor document is.
pub fn expect_object(value: Value, context: &str) -> Result<Value> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(Error::Config {
            message: format!("{} must be an object, got {}", context, value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_deep_merge_nested_objects() {
        let mut target = json!({"output": {"path": "/dist", "filename": "[name].js"}});
        deep_merge(
            &mut target,
            &json!({"output": {"pathinfo": true, "path": "/build"}}),
            ArrayMerge::Append,
        );
        assert_eq!(
            target,
            json!({"output": {"path": "/build", "filename": "[name].js", "pathinfo": true}})
        );
    }

    #[test]
    fn test_deep_merge_arrays_append() {
        let mut target = json!({"resolve": {"extensions": [".js"]}});
        deep_merge(
            &mut target,
            &json!({"resolve": {"extensions": [".ts"]}}),
            ArrayMerge::Append,
        );
        assert_eq!(target, json!({"resolve": {"extensions": [".js", ".ts"]}}));
    }

    #[test]
    fn test_deep_merge_arrays_replace() {
        let mut target = json!({"whitelist": ["a", "b"]});
        deep_merge(&mut target, &json!({"whitelist": ["c"]}), ArrayMerge::Replace);
        assert_eq!(target, json!({"whitelist": ["c"]}));
    }

    #[test]
    fn test_deep_merge_scalar_overwrites_structure() {
        let mut target = json!({"devtool": {"weird": true}});
        deep_merge(&mut target, &json!({"devtool": "source-map"}), ArrayMerge::Append);
        assert_eq!(target, json!({"devtool": "source-map"}));
    }

    #[test]
    fn test_rules_mut_creates_container() {
        let mut document = json!({});
        rules_mut(&mut document).push(json!({"test": "\\.json$"}));
        assert_eq!(document, json!({"module": {"rules": [{"test": "\\.json$"}]}}));
    }

    #[test]
    fn test_rules_mut_keeps_existing_rules() {
        let mut document = json!({"module": {"rules": [{"test": "a"}], "noParse": "x"}});
        rules_mut(&mut document).push(json!({"test": "b"}));
        assert_eq!(document["module"]["rules"].as_array().unwrap().len(), 2);
        assert_eq!(document["module"]["noParse"], "x");
    }

    #[test]
    fn test_non_container_values_are_replaced() {
        let mut document = json!("not an object");
        object_entry(&mut document, "resolve").insert("symlinks".to_string(), json!(false));
        assert_eq!(document, json!({"resolve": {"symlinks": false}}));

        let mut document = json!({"resolve": ["x"], "module": {"rules": "bad"}});
        object_entry(&mut document, "resolve").insert("symlinks".to_string(), json!(true));
        rules_mut(&mut document).push(json!({"test": "a"}));
        assert_eq!(
            document,
            json!({"resolve": {"symlinks": true}, "module": {"rules": [{"test": "a"}]}})
        );
    }

    #[test]
    fn test_condition_glob_is_resolved_against_cwd() {
        let cwd = PathBuf::from("/work/project");
        let condition = Condition::resolve(json!("glob:src/**"), &cwd).unwrap();
        assert_eq!(condition.to_value(), json!({"glob": "/work/project/src/**"}));
        assert!(condition.matches_path(Path::new("/work/project/src/a.js")));
        assert!(condition.matches_path(Path::new("/work/project/src/deep/nested/b.ts")));
        assert!(!condition.matches_path(Path::new("/work/project/lib/a.js")));
    }

    #[test]
    fn test_condition_single_star_stays_in_segment() {
        let cwd = PathBuf::from("/work");
        let condition = Condition::resolve(json!("glob:src/*.js"), &cwd).unwrap();
        assert!(condition.matches_path(Path::new("/work/src/a.js")));
        assert!(!condition.matches_path(Path::new("/work/src/nested/a.js")));
    }

    #[test]
    fn test_condition_passthrough() {
        let cwd = PathBuf::from("/work");
        let condition = Condition::resolve(json!("node_modules"), &cwd).unwrap();
        assert_eq!(condition.to_value(), json!("node_modules"));
        assert!(!condition.matches_path(Path::new("/work/node_modules")));
    }

    #[test]
    fn test_condition_from_value_round_trip() {
        let stored = json!({"glob": "/work/src/**"});
        let condition = Condition::from_value(&stored).unwrap();
        assert!(matches!(condition, Condition::Glob(_)));
        assert_eq!(condition.to_value(), stored);

        let other = json!({"glob": "/x", "and": []});
        assert!(matches!(
            Condition::from_value(&other).unwrap(),
            Condition::Other(_)
        ));
    }

    #[test]
    fn test_descriptor_accessors() {
        let descriptor = BuildDescriptor::new(
            json!({
                "entry": {"main": "./a"},
                "output": {"publicPath": "/dist/"},
                "module": {"rules": [{"test": "x"}]},
                "watch": true
            }),
            Vec::new(),
        );
        assert_eq!(descriptor.entry().unwrap()["main"], "./a");
        assert_eq!(descriptor.public_path(), Some("/dist/"));
        assert_eq!(descriptor.rules().len(), 1);
        assert!(descriptor.is_watch());
        assert!(descriptor.dev_server().is_none());
        assert_eq!(descriptor.to_value()["plugins"], json!([]));
    }

    #[test]
    fn test_expect_object() {
        assert!(expect_object(json!({}), "descriptor").is_ok());
        let err = expect_object(json!(null), "descriptor").unwrap_err();
        assert!(err.to_string().contains("descriptor must be an object"));
    }
}
