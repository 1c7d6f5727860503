//! Environment snapshots
//!
//! Fragments read environment variables from an [`EnvironmentSnapshot`] carried
//! in the options bag instead of the process environment. The snapshot is
//! taken once, `NODE_ENV` is set to the requested environment name, and the
//! project's `envs/<name>` file is layered on top.
//!
//! ## Environment file format
//!
//! ```text
//! # comment
//! export API_URL="https://api.example.com"
//! export FEATURE_X=1
//! ```
//!
//! Lines not starting with `export ` are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{info, warn};
use regex::Regex;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    node_env: String,
    variables: IndexMap<String, String>,
}

impl EnvironmentSnapshot {
    /// Snapshot holding exactly `variables`, with `NODE_ENV` set to `node_env`.
    pub fn new<I, K, V>(node_env: &str, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut snapshot = Self {
            node_env: node_env.to_string(),
            variables: variables
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };
        snapshot.set("NODE_ENV", node_env);
        snapshot
    }

    /// Capture the current process environment.
    pub fn from_process(node_env: &str) -> Self {
        Self::new(node_env, std::env::vars())
    }

    /// Build the snapshot for `env_name`, layering `<project_dir>/envs/<env_name>`
    /// over `base`.
    pub fn load(env_name: &str, project_dir: &Path, base: IndexMap<String, String>) -> Result<Self> {
        info!("Setting up env for: {}", env_name);
        let mut snapshot = Self::new(env_name, base);

        let env_file = env_file_path(project_dir, env_name);
        if !env_file.exists() {
            warn!("Env file not found: {}", env_file.display());
            return Ok(snapshot);
        }

        let content = fs::read_to_string(&env_file)?;
        for (key, value) in parse_env_file(&content)? {
            info!("\t {} = {}", key, value);
            snapshot.set(&key, &value);
        }
        Ok(snapshot)
    }

    pub fn node_env(&self) -> &str {
        &self.node_env
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Like [`get`](Self::get), but empty values count as unset.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if key == "NODE_ENV" {
            self.node_env = value.to_string();
        }
        self.variables.insert(key.to_string(), value.to_string());
    }

    pub fn variables(&self) -> &IndexMap<String, String> {
        &self.variables
    }
}

pub fn env_file_path(project_dir: &Path, env_name: &str) -> PathBuf {
    project_dir.join("envs").join(env_name)
}

/// Parse `export KEY=VALUE` lines, in file order.
pub fn parse_env_file(content: &str) -> Result<Vec<(String, String)>> {
    let export_line = Regex::new(r"^export ([a-zA-Z_]+)=(.*)$")?;
    let mut loaded = Vec::new();

    for line in content.lines() {
        if line.starts_with('#') || !line.starts_with("export ") {
            continue;
        }
        let captures = match export_line.captures(line) {
            Some(captures) => captures,
            None => {
                warn!("line didnt match: {}", line);
                continue;
            }
        };
        let key = captures[1].to_string();
        let value = strip_quotes(&captures[2]);
        loaded.push((key, value.to_string()));
    }

    Ok(loaded)
}

/// Strip one leading and one trailing quote character, independently.
fn strip_quotes(value: &str) -> &str {
    let value = value
        .strip_prefix('\'')
        .or_else(|| value.strip_prefix('"'))
        .unwrap_or(value);
    value
        .strip_suffix('\'')
        .or_else(|| value.strip_suffix('"'))
        .unwrap_or(value)
}
