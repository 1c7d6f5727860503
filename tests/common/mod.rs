//! Shared test utilities for integration and E2E tests.
//!
//! Add `mod common;` to a test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_config(configs::SINGLE_TARGET);
//!     // ... test code
//! }
//! ```

use assert_fs::prelude::*;
use std::path::Path;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    pub use super::TestFixture;
}

/// User configuration snippets for testing.
#[allow(dead_code)]
pub mod configs {
    /// One bare target with an entry and a public path.
    pub const SINGLE_TARGET: &str = r#"
merge:
  entry:
    main: ./src/index.js
  output:
    path: ./dist
    publicPath: /static/
"#;

    /// Two named targets, the second a backend build.
    pub const TWO_TARGETS: &str = r#"
- name: app
  configure:
    merge:
      entry: { main: ./src/index.js }
      output: { path: ./dist, publicPath: /static/ }
- name: server
  configure:
    options:
      backend_build: true
    merge:
      entry: { server: ./server/index.js }
"#;

    /// A target without `output.publicPath`, rejected in serve mode.
    pub const NO_PUBLIC_PATH: &str = r#"
merge:
  entry:
    main: ./src/index.js
"#;

    /// Modifies a loader nothing registered.
    pub const MISSING_LOADER: &str = r#"
modify_loaders:
  coffee:
    exclude: [node_modules]
"#;

    /// Uses a plugin kind the catalog does not know.
    pub const UNKNOWN_PLUGIN: &str = r#"
plugins:
  - name: magic
    kind: webpack-magic
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "merge: [unclosed";

    /// A file with nothing in it.
    pub const EMPTY: &str = "# packconf configuration\n";
}

/// A temporary project directory with an optional `packconf.yaml`.
///
/// ```rust,ignore
/// let fixture = TestFixture::new()
///     .with_config(configs::SINGLE_TARGET)
///     .with_file("envs/production", "export API_URL=https://api");
///
/// let mut cmd = cargo_bin_cmd!("packconf");
/// cmd.current_dir(fixture.path())
///     .arg("inspect")
///     .assert()
///     .success();
/// ```
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().unwrap(),
        }
    }

    /// Write `content` to `packconf.yaml`.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child("packconf.yaml")
            .write_str(content)
            .unwrap();
        self
    }

    /// Write an arbitrary file, creating parent directories.
    #[allow(dead_code)]
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir.child(path).write_str(content).unwrap();
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get a child path within the temporary directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
