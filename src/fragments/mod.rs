//! # Configuration Fragments
//!
//! A fragment is one named step of configuration: it receives the target's
//! [`Configurator`] and options bag and edits them. Fragments run strictly in
//! sequence, each seeing everything the earlier ones did.
//!
//! The built-in fragments are:
//!
//! - **`common`**: resolution paths, every default loader, the define plugin
//! - **`production`**: minification and deduplication plugins
//! - **`serve`**: dev-server settings and hot module replacement
//! - **`watch`**: file-watching compilation
//!
//! User code contributes fragments through [`fragment_fn`] or the declarative
//! fragments loaded from the user configuration file.

use std::fmt;

use crate::configurator::Configurator;
use crate::error::Result;
use crate::options::MultiConfOptions;

pub mod common;
pub mod production;
pub mod serve;
pub mod watch;

/// One composable configuration step.
pub trait Fragment: Send + Sync {
    fn name(&self) -> &str;

    /// Edit `configurator` and `options`. Returning an error aborts the chain.
    fn apply(&self, configurator: &mut Configurator, options: &mut MultiConfOptions) -> Result<()>;
}

/// Fragment backed by a closure.
pub struct FnFragment<F> {
    name: String,
    f: F,
}

impl<F> Fragment for FnFragment<F>
where
    F: Fn(&mut Configurator, &mut MultiConfOptions) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, configurator: &mut Configurator, options: &mut MultiConfOptions) -> Result<()> {
        (self.f)(configurator, options)
    }
}

impl<F> fmt::Debug for FnFragment<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFragment").field("name", &self.name).finish()
    }
}

/// Wrap a closure as a named fragment.
pub fn fragment_fn<F>(name: &str, f: F) -> FnFragment<F>
where
    F: Fn(&mut Configurator, &mut MultiConfOptions) -> Result<()> + Send + Sync,
{
    FnFragment {
        name: name.to_string(),
        f,
    }
}

/// The fragments shipped with packconf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFragment {
    Common,
    Production,
    Serve,
    Watch,
}

impl BuiltinFragment {
    pub const ALL: [BuiltinFragment; 4] = [
        BuiltinFragment::Common,
        BuiltinFragment::Production,
        BuiltinFragment::Serve,
        BuiltinFragment::Watch,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuiltinFragment::Common => "common",
            BuiltinFragment::Production => "production",
            BuiltinFragment::Serve => "serve",
            BuiltinFragment::Watch => "watch",
        }
    }
}

impl fmt::Display for BuiltinFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Fragment for BuiltinFragment {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn apply(&self, configurator: &mut Configurator, options: &mut MultiConfOptions) -> Result<()> {
        match self {
            BuiltinFragment::Common => common::configure(configurator, options),
            BuiltinFragment::Production => production::configure(configurator, options),
            BuiltinFragment::Serve => serve::configure(configurator, options),
            BuiltinFragment::Watch => watch::configure(configurator, options),
        }
    }
}
