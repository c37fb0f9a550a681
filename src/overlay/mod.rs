//! Overlay contract
//!
//! Every overlay shares one lifecycle, implemented once by
//! [`OverlayModule`]. A concrete visualization only supplies the hooks in
//! [`Visualization`]: which endpoint to poll, how to build its static scene,
//! how to apply a telemetry payload and how to advance one frame.
//!
//! All scene mutation goes through a [`SceneBuilder`], which tags every node
//! with the overlay and the activation generation that created it.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::animation::FrameStep;
use crate::error::TelemetryError;
use crate::scene::{Generation, Layer, NodeHandle, Projection, ResourceArena, SceneNode};
use crate::telemetry::{FallbackIndicator, FetchRequest};

pub mod devices;
pub mod dna;
pub mod filesystem;
pub mod matrix;
pub mod module;
pub mod network;
pub mod timeline;

pub use module::OverlayModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayId {
    Matrix,
    Timeline,
    Dna,
    DnaTimeline,
    Network,
    Devices,
    Filesystem,
}

impl OverlayId {
    pub const ALL: [OverlayId; 7] = [
        OverlayId::Matrix,
        OverlayId::Timeline,
        OverlayId::Dna,
        OverlayId::DnaTimeline,
        OverlayId::Network,
        OverlayId::Devices,
        OverlayId::Filesystem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayId::Matrix => "matrix",
            OverlayId::Timeline => "timeline",
            OverlayId::Dna => "dna",
            OverlayId::DnaTimeline => "dna_timeline",
            OverlayId::Network => "network",
            OverlayId::Devices => "devices",
            OverlayId::Filesystem => "filesystem",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OverlayId::Matrix => "Process Matrix",
            OverlayId::Timeline => "Process Timeline",
            OverlayId::Dna => "Kernel DNA",
            OverlayId::DnaTimeline => "Process DNA Timeline",
            OverlayId::Network => "Network Stack",
            OverlayId::Devices => "Device Ring",
            OverlayId::Filesystem => "Filesystem Blocks",
        }
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Increments on every render request; a completion carrying an older token
/// is discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderToken(u64);

impl RenderToken {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Identity and status of one overlay singleton
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayDescriptor {
    pub id: OverlayId,
    pub display_name: &'static str,
    pub is_active: bool,
}

impl OverlayDescriptor {
    pub fn new(id: OverlayId) -> Self {
        Self {
            id,
            display_name: id.display_name(),
            is_active: false,
        }
    }
}

/// Scoped access to the arena for one overlay activation
pub struct SceneBuilder<'a> {
    arena: &'a mut ResourceArena,
    owner: OverlayId,
    generation: Generation,
}

impl<'a> SceneBuilder<'a> {
    pub fn new(arena: &'a mut ResourceArena, owner: OverlayId, generation: Generation) -> Self {
        Self {
            arena,
            owner,
            generation,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn spawn(&mut self, layer: Layer, node: SceneNode) -> NodeHandle {
        self.arena.alloc(self.owner, self.generation, layer, node)
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&SceneNode> {
        self.arena.get(handle)
    }

    /// Mutable access, limited to nodes of this activation
    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut SceneNode> {
        if self.arena.generation_of(handle) != Some(self.generation) {
            return None;
        }
        self.arena.get_mut(handle)
    }

    pub fn is_live(&self, handle: NodeHandle) -> bool {
        self.arena.generation_of(handle) == Some(self.generation)
    }

    /// Release a node and its descendants
    pub fn release(&mut self, handle: NodeHandle) -> usize {
        if !self.is_live(handle) {
            return 0;
        }
        self.arena.release(handle)
    }

    pub fn release_layer(&mut self, layer: Layer) -> usize {
        self.arena.release_layer(self.generation, layer)
    }

    pub fn arena(&self) -> &ResourceArena {
        self.arena
    }
}

/// Per-overlay hooks plugged into the shared lifecycle
pub trait Visualization: Send {
    fn id(&self) -> OverlayId;

    /// What to poll, given the currently selected process. `None` disables
    /// polling for this activation.
    fn endpoint(&mut self, selected_pid: Option<u32>) -> Option<FetchRequest>;

    /// Build the static scene for a fresh activation
    fn build_scene(&mut self, scene: &mut SceneBuilder<'_>);

    /// Apply a successful snapshot. A decode error turns into a fallback.
    fn apply_telemetry(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        payload: &Value,
    ) -> Result<(), TelemetryError>;

    /// React to a failed fetch; the readout already shows the reason
    fn apply_fallback(&mut self, _scene: &mut SceneBuilder<'_>, _fallback: &FallbackIndicator) {}

    /// Advance one frame
    fn update(&mut self, scene: &mut SceneBuilder<'_>, step: FrameStep);

    /// Viewpoint at `elapsed` seconds since activation
    fn projection(&self, elapsed: f32) -> Projection;

    /// Lines for the on-screen telemetry readout
    fn readout(&self) -> Vec<String>;

    /// Forget every handle into the arena; called after the generation is released
    fn clear_cached(&mut self);

    fn as_any(&self) -> &dyn Any;
}

/// Up to `wanted` indices spread evenly over `0..total`
pub(crate) fn sample_indices(total: usize, wanted: usize) -> Vec<usize> {
    let take = wanted.min(total);
    (0..take).map(|i| i * total / take.max(1)).collect()
}
