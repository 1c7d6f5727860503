//! Dependency tree scanning for module aliases and env whitelists
//!
//! Packages can contribute build settings through a `packconf` key in their
//! `package.json`:
//!
//! ```json
//! {
//!   "name": "shared-ui",
//!   "packconf": {
//!     "alias": { "ui": "src" },
//!     "envWhitelist": { "UI_THEME": "light" }
//!   }
//! }
//! ```
//!
//! The scan starts at the project directory and follows declared
//! dependencies through `node_modules` as well as every lib directory under
//! `lib/` and `modules/`. It only reads from disk.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::options::{EnvDefault, EnvWhitelist};

/// Directories whose children are treated as local libraries.
pub const LIB_DIR_NAMES: &[&str] = &["lib", "modules"];

/// Key inside `package.json` holding packconf settings.
pub const PACKAGE_KEY: &str = "packconf";

/// A library directory and its parsed `package.json`, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct LibDir {
    pub dir: PathBuf,
    pub package: Option<Value>,
}

/// Settings collected from the dependency tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleOpts {
    pub aliases: IndexMap<String, String>,
    pub env_whitelist: IndexMap<String, EnvDefault>,
}

fn read_package(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// List the immediate subdirectories of `lib/` and `modules/`, sorted by path.
pub fn get_lib_dirs(project_dir: &Path) -> Result<Vec<LibDir>> {
    debug!("> getLibDirs: {}", project_dir.display());
    let mut lib_dirs = Vec::new();

    for name in LIB_DIR_NAMES {
        let root = project_dir.join(name);
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let dir = entry.into_path();
            let package = read_package(&dir.join("package.json"))?;
            lib_dirs.push(LibDir { dir, package });
        }
    }

    Ok(lib_dirs)
}

/// Scan the dependency tree rooted at `project_dir`.
pub fn scan_module_opts(project_dir: &Path, collect_aliases: bool) -> Result<ModuleOpts> {
    let mut scanner = Scanner {
        project_dir: project_dir.to_path_buf(),
        collect_aliases,
        visited: HashSet::new(),
        opts: ModuleOpts::default(),
    };
    if let Some(package) = read_package(&project_dir.join("package.json"))? {
        scanner.handle_module(project_dir, &package)?;
    } else {
        scanner.visited.insert(project_dir.to_path_buf());
        scanner.handle_lib_dirs(project_dir)?;
    }
    debug!("> moduleOpts={:?}", scanner.opts);
    Ok(scanner.opts)
}

struct Scanner {
    project_dir: PathBuf,
    collect_aliases: bool,
    visited: HashSet<PathBuf>,
    opts: ModuleOpts,
}

impl Scanner {
    fn handle_module(&mut self, module_path: &Path, package: &Value) -> Result<()> {
        if !self.visited.insert(module_path.to_path_buf()) {
            return Ok(());
        }
        let package_name = package
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>");
        debug!("handleModule: {} ({})", module_path.display(), package_name);

        let settings = package.get(PACKAGE_KEY);

        if self.collect_aliases {
            if let Some(aliases) = settings
                .and_then(|s| s.get("alias"))
                .and_then(Value::as_object)
            {
                for (alias, target) in aliases {
                    let target = target.as_str().unwrap_or_default();
                    if let Some(existing) = self.opts.aliases.get(alias) {
                        return Err(Error::AliasCollision {
                            alias: alias.clone(),
                            module: module_path.to_path_buf(),
                            existing: existing.clone(),
                        });
                    }
                    let resolved = module_path.join(target).to_string_lossy().into_owned();
                    debug!("Adding alias from {}: {} -> {}", package_name, alias, resolved);
                    self.opts.aliases.insert(alias.clone(), resolved);
                }
            }
        }

        if let Some(raw) = settings.and_then(|s| s.get("envWhitelist")) {
            let whitelist: EnvWhitelist =
                serde_json::from_value(raw.clone()).map_err(|e| Error::Config {
                    message: format!(
                        "invalid envWhitelist in {}: {}",
                        module_path.join("package.json").display(),
                        e
                    ),
                })?;
            for (key, default) in whitelist.entries() {
                if self.opts.env_whitelist.contains_key(&key) {
                    warn!("Overwriting existing envWhitelist entry: {}", key);
                }
                self.opts.env_whitelist.insert(key, default);
            }
        }

        if let Some(dependencies) = package.get("dependencies").and_then(Value::as_object) {
            for dep in dependencies.keys() {
                let candidates = [
                    module_path.join("node_modules").join(dep),
                    self.project_dir.join("node_modules").join(dep),
                ];
                let found = candidates
                    .iter()
                    .find(|dir| dir.join("package.json").exists())
                    .cloned();
                match found {
                    Some(dep_path) => {
                        if let Some(dep_package) = read_package(&dep_path.join("package.json"))? {
                            self.handle_module(&dep_path, &dep_package)?;
                        }
                    }
                    None => debug!("> > package not found, skipping: {}", dep),
                }
            }
        }

        self.handle_lib_dirs(module_path)
    }

    fn handle_lib_dirs(&mut self, module_path: &Path) -> Result<()> {
        for lib_dir in get_lib_dirs(module_path)? {
            match &lib_dir.package {
                Some(package) => self.handle_module(&lib_dir.dir, package)?,
                None => debug!("> > package not found: {}", lib_dir.dir.display()),
            }
        }
        Ok(())
    }
}
