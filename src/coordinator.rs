//! View exclusivity
//!
//! The coordinator is the only writer of the current view. Activating an
//! overlay always tears the previous one down completely first, so at most
//! one overlay owns scene nodes, tickets or chrome at any time.

use std::fmt;

use tracing::{info, warn};

use crate::chrome::ChromeKey;
use crate::context::Services;
use crate::dashboard::{Dashboard, DashboardElements};
use crate::disposal::DisposalReport;
use crate::error::ActivationError;
use crate::overlay::{OverlayId, OverlayModule};
use crate::registry::OverlayRegistry;

/// Which overlay is on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    None,
    Matrix,
    Timeline,
    Dna,
    DnaTimeline,
    Network,
    Devices,
    Filesystem,
}

impl ViewState {
    pub fn overlay(&self) -> Option<OverlayId> {
        match self {
            ViewState::None => None,
            ViewState::Matrix => Some(OverlayId::Matrix),
            ViewState::Timeline => Some(OverlayId::Timeline),
            ViewState::Dna => Some(OverlayId::Dna),
            ViewState::DnaTimeline => Some(OverlayId::DnaTimeline),
            ViewState::Network => Some(OverlayId::Network),
            ViewState::Devices => Some(OverlayId::Devices),
            ViewState::Filesystem => Some(OverlayId::Filesystem),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ViewState::None)
    }
}

impl From<OverlayId> for ViewState {
    fn from(id: OverlayId) -> Self {
        match id {
            OverlayId::Matrix => ViewState::Matrix,
            OverlayId::Timeline => ViewState::Timeline,
            OverlayId::Dna => ViewState::Dna,
            OverlayId::DnaTimeline => ViewState::DnaTimeline,
            OverlayId::Network => ViewState::Network,
            OverlayId::Devices => ViewState::Devices,
            OverlayId::Filesystem => ViewState::Filesystem,
        }
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.overlay() {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("none"),
        }
    }
}

#[derive(Debug)]
pub struct Coordinator {
    registry: OverlayRegistry,
    view: ViewState,
}

impl Coordinator {
    pub fn new(registry: OverlayRegistry) -> Self {
        Self {
            registry,
            view: ViewState::None,
        }
    }

    pub fn current_view(&self) -> ViewState {
        self.view
    }

    pub fn registry(&self) -> &OverlayRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut OverlayRegistry {
        &mut self.registry
    }

    /// Module behind the current view
    pub fn active_module(&self) -> Option<&OverlayModule> {
        self.view.overlay().and_then(|id| self.registry.get(id))
    }

    /// Put `id` on screen. A no-op when it already is.
    ///
    /// Whatever was showing is torn down first, even when `id` turns out not
    /// to be registered.
    pub fn activate(
        &mut self,
        id: OverlayId,
        services: &mut Services,
        dashboard: &mut Dashboard,
    ) -> Result<(), ActivationError> {
        if self.view.overlay() == Some(id) {
            return Ok(());
        }

        if !self.registry.is_registered(id) {
            warn!(overlay = %id, "activation requested for unregistered overlay");
            self.deactivate_all(services, dashboard);
            return Err(ActivationError::NotRegistered(id));
        }

        self.teardown(services);
        self.view = ViewState::from(id);
        dashboard.dim(DashboardElements::all());
        dashboard.stop_refreshers(&mut services.scheduler);
        services.chrome.ensure(ChromeKey::EXIT, true);
        services.chrome.remove(ChromeKey::NOTICE);

        let module = self.registry.resolve(id, &services.config)?;
        if let Err(err) = module.activate(services) {
            warn!(overlay = %id, error = %err, "overlay activation failed");
            services.chrome.ensure(ChromeKey::NOTICE, true);
            services.chrome.set_text(ChromeKey::NOTICE, err.to_string());
            self.deactivate_all(services, dashboard);
            return Err(err);
        }
        info!(view = %self.view, "view opened");
        Ok(())
    }

    /// Tear down whatever is on screen and bring the dashboard back.
    /// Safe to call any number of times.
    pub fn deactivate_all(
        &mut self,
        services: &mut Services,
        dashboard: &mut Dashboard,
    ) -> Option<DisposalReport> {
        let previous = self.view;
        let report = self.teardown(services);

        dashboard.restore();
        if !dashboard.is_refreshing() {
            let now = services.clock.now();
            dashboard.start_refreshers(&mut services.scheduler, &mut services.telemetry, now);
        }

        if !previous.is_none() {
            info!(view = %previous, "view closed");
        }
        report
    }

    /// Release the current overlay without touching the dashboard
    fn teardown(&mut self, services: &mut Services) -> Option<DisposalReport> {
        let report = self
            .view
            .overlay()
            .and_then(|id| self.registry.get_mut(id))
            .map(|module| module.deactivate(services));
        services.chrome.remove(ChromeKey::EXIT);
        self.view = ViewState::None;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_state_round_trips_ids() {
        for id in OverlayId::ALL {
            assert_eq!(ViewState::from(id).overlay(), Some(id));
        }
        assert_eq!(ViewState::None.overlay(), None);
        assert_eq!(ViewState::DnaTimeline.to_string(), "dna_timeline");
        assert_eq!(ViewState::default().to_string(), "none");
    }
}
