//! Composition orchestrator for one build target
//!
//! A [`MultiConf`] owns one [`Configurator`] and one options bag and applies
//! fragments to them strictly in order. A fragment that blocks (for instance
//! while scanning the dependency tree) holds up the chain until it returns,
//! so every later fragment sees the complete effect of every earlier one.
//! The first failing fragment aborts the chain; its error is returned to the
//! caller and nothing after it runs.

use std::path::PathBuf;

use log::{debug, warn};

use crate::configurator::Configurator;
use crate::descriptor::BuildDescriptor;
use crate::error::Result;
use crate::fragments::Fragment;
use crate::options::MultiConfOptions;

/// Lifecycle of a [`MultiConf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfState {
    Created,
    /// Number of fragments applied so far
    Appending(usize),
    Resolved,
}

#[derive(Debug)]
pub struct MultiConf {
    name: String,
    configurator: Configurator,
    options: MultiConfOptions,
    chain: Vec<String>,
    state: ConfState,
}

impl MultiConf {
    pub fn new(name: &str, cwd: impl Into<PathBuf>, options: MultiConfOptions) -> Self {
        Self {
            name: name.to_string(),
            configurator: Configurator::new(cwd),
            options,
            chain: Vec::new(),
            state: ConfState::Created,
        }
    }

    /// Apply `fragment` to this target's configurator and options.
    ///
    /// The fragment's name is recorded in the chain only once it succeeds.
    pub fn append(&mut self, fragment: &dyn Fragment) -> Result<&mut Self> {
        if self.state == ConfState::Resolved {
            warn!(
                "{}: appending '{}' after resolve",
                self.name,
                fragment.name()
            );
        }
        debug!("{}: append {}", self.name, fragment.name());
        fragment.apply(&mut self.configurator, &mut self.options)?;

        self.chain.push(fragment.name().to_string());
        if self.state != ConfState::Resolved {
            self.state = ConfState::Appending(self.chain.len());
        }
        Ok(self)
    }

    pub fn resolve(&mut self) -> Result<BuildDescriptor> {
        debug!("{}: resolve after [{}]", self.name, self.chain.join(", "));
        let descriptor = self.configurator.resolve()?;
        self.state = ConfState::Resolved;
        Ok(descriptor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the fragments applied so far, in order.
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub fn state(&self) -> ConfState {
        self.state
    }

    pub fn options(&self) -> &MultiConfOptions {
        &self.options
    }

    pub fn configurator(&self) -> &Configurator {
        &self.configurator
    }

    pub fn configurator_mut(&mut self) -> &mut Configurator {
        &mut self.configurator
    }
}
