//! Overlay registry
//!
//! Maps overlay ids to factories. A module is built the first time its id is
//! resolved and then kept, so `init` runs at most once per overlay.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::RuntimeConfig;
use crate::error::ActivationError;
use crate::overlay::devices::DeviceRing;
use crate::overlay::dna::{DnaMode, KernelDna};
use crate::overlay::filesystem::BlockMap;
use crate::overlay::matrix::ProcessMatrix;
use crate::overlay::network::NetworkStack;
use crate::overlay::timeline::ProcessTimeline;
use crate::overlay::{OverlayId, OverlayModule, Visualization};

pub type VisualizationFactory = Box<dyn Fn() -> Box<dyn Visualization> + Send + Sync>;

#[derive(Default)]
pub struct OverlayRegistry {
    factories: BTreeMap<OverlayId, VisualizationFactory>,
    modules: BTreeMap<OverlayId, OverlayModule>,
}

impl std::fmt::Debug for OverlayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayRegistry")
            .field("registered", &self.factories.keys().collect::<Vec<_>>())
            .field("built", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OverlayRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in overlay
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(OverlayId::Matrix, || Box::new(ProcessMatrix::new()));
        registry.register(OverlayId::Timeline, || Box::new(ProcessTimeline::new()));
        registry.register(OverlayId::Dna, || Box::new(KernelDna::new(DnaMode::Kernel)));
        registry.register(OverlayId::DnaTimeline, || Box::new(KernelDna::new(DnaMode::Process)));
        registry.register(OverlayId::Network, || Box::new(NetworkStack::new()));
        registry.register(OverlayId::Devices, || Box::new(DeviceRing::new()));
        registry.register(OverlayId::Filesystem, || Box::new(BlockMap::new()));
        registry
    }

    /// Register (or replace) the factory for `id`. A module already built
    /// for `id` is dropped; callers replace factories before activation.
    pub fn register<F>(&mut self, id: OverlayId, factory: F)
    where
        F: Fn() -> Box<dyn Visualization> + Send + Sync + 'static,
    {
        self.modules.remove(&id);
        self.factories.insert(id, Box::new(factory));
    }

    pub fn is_registered(&self, id: OverlayId) -> bool {
        self.factories.contains_key(&id)
    }

    /// Registered ids in menu order
    pub fn ids(&self) -> impl Iterator<Item = OverlayId> + '_ {
        self.factories.keys().copied()
    }

    /// The module for `id`, building it on first use
    pub fn resolve(
        &mut self,
        id: OverlayId,
        config: &RuntimeConfig,
    ) -> Result<&mut OverlayModule, ActivationError> {
        let factory = self
            .factories
            .get(&id)
            .ok_or(ActivationError::NotRegistered(id))?;
        let module = self.modules.entry(id).or_insert_with(|| {
            debug!(overlay = %id, "building overlay module");
            OverlayModule::new(factory(), config.overlay(id))
        });
        Ok(module)
    }

    /// Already-built module, if any
    pub fn get(&self, id: OverlayId) -> Option<&OverlayModule> {
        self.modules.get(&id)
    }

    pub fn get_mut(&mut self, id: OverlayId) -> Option<&mut OverlayModule> {
        self.modules.get_mut(&id)
    }

    /// Every built module
    pub fn modules(&self) -> impl Iterator<Item = &OverlayModule> {
        self.modules.values()
    }
}
