//! Build-wide settings shared by every target
//!
//! These are the values the command line controls. They are serialized into
//! each worker request so child processes compose with the same settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default user configuration file name.
pub const USER_CONFIG_NAME: &str = "packconf.yaml";

/// How the resolved descriptors are handed to the bundler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Compile once and exit
    Once,
    /// Recompile on file changes
    Watch,
    /// Run the development server
    Serve,
}

/// Development server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSettings {
    pub use_hmr: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            use_hmr: false,
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

impl ServeSettings {
    /// URL the dev-server client entry connects to.
    pub fn client_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub user_config_name: String,
    /// Environment name, exported to fragments as `NODE_ENV`
    pub env: String,
    /// Devtool used by serve/watch when the target sets none
    pub devtool: String,
    pub verbose: bool,
    pub watch: bool,
    pub is_server: bool,
    pub serve: ServeSettings,
    /// Compile targets in separate worker processes
    pub enable_child_process: bool,
    /// Directory holding the tool's own loader modules
    pub tool_modules_dir: Option<PathBuf>,
    /// External bundler command; descriptors are only printed when unset
    pub bundler: Option<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            user_config_name: USER_CONFIG_NAME.to_string(),
            env: "development".to_string(),
            devtool: "eval-source-map".to_string(),
            verbose: false,
            watch: false,
            is_server: false,
            serve: ServeSettings::default(),
            enable_child_process: false,
            tool_modules_dir: None,
            bundler: None,
        }
    }
}

impl BuildSettings {
    /// Serve wins over watch; a descriptor cannot do both.
    pub fn mode(&self) -> RunMode {
        if self.is_server {
            RunMode::Serve
        } else if self.watch {
            RunMode::Watch
        } else {
            RunMode::Once
        }
    }

    pub fn is_production(&self) -> bool {
        self.env == "production"
    }
}
