//! Overlay Runtime
//!
//! Telemetry-driven kernel visualization overlays shown on top of a live
//! dashboard. At most one overlay is on screen at a time; switching tears the
//! previous one down completely (scene nodes, tickets, chrome, in-flight
//! fetches) before the next one builds its scene.
//!
//! The crate has no UI shell of its own unless the `viewer` feature is
//! enabled, which adds the eframe application in [`app`] and the
//! `overlay_viewer` binary.

pub mod animation;
pub mod chrome;
pub mod clock;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod dashboard;
pub mod disposal;
pub mod error;
pub mod hover;
pub mod overlay;
pub mod registry;
pub mod scene;
pub mod scheduler;
pub mod surface;
pub mod telemetry;

#[cfg(feature = "viewer")]
pub mod app;

pub use context::{AppContext, AppContextBuilder, PumpReport, Services};
pub use coordinator::{Coordinator, ViewState};
pub use registry::OverlayRegistry;

pub use config::{OverlaySettings, RuntimeConfig};
pub use error::{ActivationError, ConfigError, TelemetryError};

pub use clock::{Clock, ManualClock, SystemClock};
pub use surface::{SurfaceProbe, SurfaceStatus};

pub use overlay::{OverlayId, OverlayModule, RenderToken, Visualization};
pub use telemetry::{
    FallbackIndicator, HttpTransport, PollResult, Spawner, TelemetryHub, TelemetryTransport,
    TokioSpawner,
};

pub use dashboard::{Dashboard, DashboardElements, RefresherKind};
