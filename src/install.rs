//! Local library installation
//!
//! Prepares the libraries under `lib/` and `modules/` for a build:
//!
//! 1. With submodules enabled, `git diff --quiet HEAD` checks the project.
//!    Exit code 129 means the project is not a git checkout and the update
//!    is skipped. Exit code 1 means uncommitted changes: a warning, or
//!    [`Error::GitDirty`] when a clean tree is required. Otherwise
//!    `git submodule sync --recursive` and `git submodule update --init` run.
//! 2. `npm install` runs in every lib directory with a `package.json`, one
//!    at a time, in path order.
//!
//! Commands run with the terminal attached, so their progress is visible.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::libs::get_lib_dirs;
use crate::process;

/// `git` exit code for "not a git repository" with `diff --quiet`.
const GIT_NOT_A_REPOSITORY: i32 = 129;

/// `git diff --quiet` exit code when the tree has changes.
const GIT_CHANGES_DETECTED: i32 = 1;

/// What happened to the project's git submodules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmoduleStatus {
    /// Submodule handling was not requested
    Skipped,
    /// The project is not a git checkout
    NotGit,
    Updated,
    /// Updated even though the project has uncommitted changes
    UpdatedDirty,
}

/// Result of a successful installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub submodules: SubmoduleStatus,
    /// Lib directories `npm install` ran in
    pub installed: Vec<PathBuf>,
}

/// Installs a project's local libraries.
#[derive(Debug, Clone)]
pub struct LibInstaller {
    git: String,
    npm: String,
    submodules: bool,
    require_clean: bool,
}

impl Default for LibInstaller {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            npm: "npm".to_string(),
            submodules: false,
            require_clean: false,
        }
    }
}

impl LibInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also sync and update git submodules first.
    pub fn with_submodules(mut self, submodules: bool) -> Self {
        self.submodules = submodules;
        self
    }

    /// Fail with [`Error::GitDirty`] instead of warning about local changes.
    pub fn with_require_clean(mut self, require_clean: bool) -> Self {
        self.require_clean = require_clean;
        self
    }

    pub fn with_git(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    pub fn with_npm(mut self, npm: impl Into<String>) -> Self {
        self.npm = npm.into();
        self
    }

    pub fn run(&self, project_dir: &Path) -> Result<InstallReport> {
        info!("Installing libs for {}", project_dir.display());
        if !project_dir.is_dir() {
            return Err(Error::MissingLibDir {
                path: project_dir.to_path_buf(),
            });
        }

        let submodules = if self.submodules {
            self.update_submodules(project_dir)?
        } else {
            SubmoduleStatus::Skipped
        };

        let mut installed = Vec::new();
        for lib_dir in get_lib_dirs(project_dir)? {
            debug!("> processing: {}", lib_dir.dir.display());
            if lib_dir.package.is_none() {
                debug!("> > no package");
                continue;
            }
            info!("Running npm install for {}", lib_dir.dir.display());
            process::run_attached(&self.npm, &["install"], &lib_dir.dir)?;
            installed.push(lib_dir.dir);
        }

        Ok(InstallReport {
            submodules,
            installed,
        })
    }

    fn update_submodules(&self, project_dir: &Path) -> Result<SubmoduleStatus> {
        info!("Updating git submodules");
        let diff = ["diff", "--quiet", "HEAD"];
        let status = match process::run_child_process(&self.git, &diff, project_dir, None) {
            Ok(_) => SubmoduleStatus::Updated,
            Err(Error::ChildProcess {
                code: Some(GIT_NOT_A_REPOSITORY),
                ..
            }) => {
                warn!("Not a git project: {}", project_dir.display());
                return Ok(SubmoduleStatus::NotGit);
            }
            Err(Error::ChildProcess {
                code: Some(GIT_CHANGES_DETECTED),
                ..
            }) => {
                if self.require_clean {
                    return Err(Error::GitDirty {
                        path: project_dir.to_path_buf(),
                    });
                }
                warn!("Changes detected in git project: {}", project_dir.display());
                SubmoduleStatus::UpdatedDirty
            }
            Err(err) => return Err(err),
        };

        process::run_attached(&self.git, &["submodule", "sync", "--recursive"], project_dir)?;
        process::run_attached(&self.git, &["submodule", "update", "--init"], project_dir)?;
        Ok(status)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Executable script recording its arguments to `calls.log` in its own
    /// directory, then exiting with `code` for `diff`.
    fn stub(dir: &Path, name: &str, diff_code: i32) -> String {
        let path = dir.join(name);
        let log = dir.join("calls.log");
        let body = format!(
            "#!/bin/sh\necho \"{name} $* @ $(pwd)\" >> '{log}'\nif [ \"$1\" = diff ]; then exit {code}; fi\nexit 0\n",
            name = name,
            log = log.display(),
            code = diff_code,
        );
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn calls(dir: &Path) -> Vec<String> {
        fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        for (dir, package) in [
            ("lib/a", true),
            ("lib/b", false),
            ("modules/c", true),
        ] {
            let path = temp.path().join(dir);
            fs::create_dir_all(&path).unwrap();
            if package {
                fs::write(path.join("package.json"), "{\"name\": \"x\"}").unwrap();
            }
        }
        temp
    }

    fn installer(bin: &Path, diff_code: i32) -> LibInstaller {
        LibInstaller::new()
            .with_git(stub(bin, "git", diff_code))
            .with_npm(stub(bin, "npm", 0))
    }

    #[test]
    fn test_npm_install_runs_in_packaged_libs() {
        let project = project();
        let bin = TempDir::new().unwrap();
        let report = installer(bin.path(), 0).run(project.path()).unwrap();

        assert_eq!(report.submodules, SubmoduleStatus::Skipped);
        assert_eq!(
            report.installed,
            vec![project.path().join("lib/a"), project.path().join("modules/c")]
        );
        let calls = calls(bin.path());
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.starts_with("npm install @")));
    }

    #[test]
    fn test_submodules_are_synced_then_updated() {
        let project = project();
        let bin = TempDir::new().unwrap();
        let report = installer(bin.path(), 0)
            .with_submodules(true)
            .run(project.path())
            .unwrap();

        assert_eq!(report.submodules, SubmoduleStatus::Updated);
        let calls = calls(bin.path());
        assert!(calls[0].starts_with("git diff --quiet HEAD"));
        assert!(calls[1].starts_with("git submodule sync --recursive"));
        assert!(calls[2].starts_with("git submodule update --init"));
        assert!(calls[3].starts_with("npm install"));
    }

    #[test]
    fn test_not_a_git_project_skips_submodules() {
        let project = project();
        let bin = TempDir::new().unwrap();
        let report = installer(bin.path(), 129)
            .with_submodules(true)
            .run(project.path())
            .unwrap();

        assert_eq!(report.submodules, SubmoduleStatus::NotGit);
        assert!(!calls(bin.path()).iter().any(|c| c.contains("submodule")));
        assert_eq!(report.installed.len(), 2);
    }

    #[test]
    fn test_dirty_project_warns_or_fails() {
        let project = project();
        let bin = TempDir::new().unwrap();
        let report = installer(bin.path(), 1)
            .with_submodules(true)
            .run(project.path())
            .unwrap();
        assert_eq!(report.submodules, SubmoduleStatus::UpdatedDirty);

        let err = installer(bin.path(), 1)
            .with_submodules(true)
            .with_require_clean(true)
            .run(project.path())
            .unwrap_err();
        assert!(matches!(err, Error::GitDirty { .. }));
        assert_eq!(err.kind_name(), "GitDirtyError");
    }

    #[test]
    fn test_unexpected_git_code_fails() {
        let project = project();
        let bin = TempDir::new().unwrap();
        let err = installer(bin.path(), 128)
            .with_submodules(true)
            .run(project.path())
            .unwrap_err();
        assert!(matches!(err, Error::ChildProcess { code: Some(128), .. }));
        assert!(!calls(bin.path()).iter().any(|c| c.starts_with("npm")));
    }

    #[test]
    fn test_missing_project_dir() {
        let temp = TempDir::new().unwrap();
        let err = LibInstaller::new()
            .run(&temp.path().join("gone"))
            .unwrap_err();
        assert!(matches!(err, Error::MissingLibDir { .. }));
        assert_eq!(err.kind_name(), "MissingLibDirError");
    }

    #[test]
    fn test_failed_npm_install_stops() {
        let project = project();
        let bin = TempDir::new().unwrap();
        let npm = bin.path().join("npm-broken");
        fs::write(&npm, "#!/bin/sh\nexit 7\n").unwrap();
        fs::set_permissions(&npm, fs::Permissions::from_mode(0o755)).unwrap();

        let err = LibInstaller::new()
            .with_npm(npm.to_string_lossy().into_owned())
            .run(project.path())
            .unwrap_err();
        assert!(matches!(err, Error::ChildProcess { code: Some(7), .. }));
    }
}
