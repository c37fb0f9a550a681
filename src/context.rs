//! Application context
//!
//! [`AppContext`] owns everything the runtime needs: the coordinator (and
//! through it the registry), the base dashboard and the shared [`Services`].
//! State only changes inside the context's methods, on the thread that owns
//! it. Background fetches talk back exclusively through the telemetry hub's
//! completion channel, which [`AppContext::pump`] drains.

use std::sync::Arc;
use std::time::Duration;

use egui::{Pos2, Rect};
use tracing::debug;

use crate::chrome::{Chrome, ChromeKey};
use crate::clock::{Clock, SystemClock};
use crate::config::RuntimeConfig;
use crate::coordinator::{Coordinator, ViewState};
use crate::dashboard::Dashboard;
use crate::disposal::DisposalReport;
use crate::error::ActivationError;
use crate::overlay::{OverlayId, OverlayModule};
use crate::registry::OverlayRegistry;
use crate::scene::{Generation, NodeAction, Projection, ResourceArena};
use crate::scheduler::{Scheduler, TicketKind, TicketOwner};
use crate::surface::{SurfaceProbe, SurfaceStatus};
use crate::telemetry::{CompletionTarget, Spawner, TelemetryHub, TelemetryTransport};

/// Shared state handed to overlay modules and the coordinator
pub struct Services {
    pub config: Arc<RuntimeConfig>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Scheduler,
    pub arena: ResourceArena,
    pub chrome: Chrome,
    pub telemetry: TelemetryHub,
    pub surface: Arc<dyn SurfaceProbe>,
    /// Process chosen from the matrix panel
    pub selected_pid: Option<u32>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("scheduler", &self.scheduler)
            .field("live_nodes", &self.arena.live_count())
            .field("chrome", &self.chrome.len())
            .field("selected_pid", &self.selected_pid)
            .finish_non_exhaustive()
    }
}

/// What one [`AppContext::pump`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub fired: usize,
    pub applied: usize,
    pub discarded: usize,
}

pub struct AppContextBuilder {
    config: RuntimeConfig,
    transport: Arc<dyn TelemetryTransport>,
    spawner: Arc<dyn Spawner>,
    clock: Option<Arc<dyn Clock>>,
    surface: Option<Arc<dyn SurfaceProbe>>,
    registry: Option<OverlayRegistry>,
}

impl AppContextBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn surface(mut self, surface: Arc<dyn SurfaceProbe>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn registry(mut self, registry: OverlayRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> AppContext {
        let config = Arc::new(self.config);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);
        let telemetry = TelemetryHub::new(
            self.transport,
            clock.clone(),
            self.spawner,
            config.telemetry.negative_cache(),
        );
        let dashboard = Dashboard::new(config.dashboard.clone());
        AppContext {
            services: Services {
                config,
                clock,
                scheduler: Scheduler::new(),
                arena: ResourceArena::new(),
                chrome: Chrome::new(),
                telemetry,
                surface: self
                    .surface
                    .unwrap_or_else(|| Arc::new(SurfaceStatus::Available) as Arc<dyn SurfaceProbe>),
                selected_pid: None,
            },
            coordinator: Coordinator::new(
                self.registry.unwrap_or_else(OverlayRegistry::with_defaults),
            ),
            dashboard,
            last_pump: None,
        }
    }
}

#[derive(Debug)]
pub struct AppContext {
    services: Services,
    coordinator: Coordinator,
    dashboard: Dashboard,
    last_pump: Option<Duration>,
}

impl AppContext {
    pub fn builder(
        config: RuntimeConfig,
        transport: Arc<dyn TelemetryTransport>,
        spawner: Arc<dyn Spawner>,
    ) -> AppContextBuilder {
        AppContextBuilder {
            config,
            transport,
            spawner,
            clock: None,
            surface: None,
            registry: None,
        }
    }

    /// Context with the system clock, every built-in overlay and an
    /// available surface
    pub fn new(
        config: RuntimeConfig,
        transport: Arc<dyn TelemetryTransport>,
        spawner: Arc<dyn Spawner>,
    ) -> Self {
        Self::builder(config, transport, spawner).build()
    }

    /// Start the dashboard refreshers
    pub fn start(&mut self) {
        let now = self.services.clock.now();
        let services = &mut self.services;
        self.dashboard
            .start_refreshers(&mut services.scheduler, &mut services.telemetry, now);
    }

    /// Run due tickets and apply finished fetches. Call once per UI frame.
    pub fn pump(&mut self) -> PumpReport {
        let now = self.services.clock.now();
        let dt = self
            .last_pump
            .map(|last| now.saturating_sub(last))
            .unwrap_or_default();
        self.last_pump = Some(now);

        let mut report = PumpReport::default();
        for fired in self.services.scheduler.due(now) {
            report.fired += 1;
            match fired.owner {
                TicketOwner::Overlay(id) => {
                    let Some(module) = self.coordinator.registry_mut().get_mut(id) else {
                        continue;
                    };
                    match fired.kind {
                        TicketKind::Frame => module.on_frame(&mut self.services, fired.ticket),
                        TicketKind::Periodic => module.on_poll(&mut self.services, fired.ticket),
                    }
                }
                TicketOwner::Dashboard(kind) => {
                    self.dashboard
                        .on_tick(kind, fired.ticket, &mut self.services.telemetry);
                }
            }
        }

        for completion in self.services.telemetry.drain() {
            let applied = match completion.target {
                CompletionTarget::Overlay {
                    id,
                    generation,
                    token,
                } => match self.coordinator.registry_mut().get_mut(id) {
                    Some(module) => module.on_completion(
                        &mut self.services,
                        generation,
                        token,
                        completion.result,
                    ),
                    None => false,
                },
                CompletionTarget::Dashboard { kind, token } => {
                    self.dashboard.on_completion(kind, token, completion.result)
                }
            };
            if applied {
                report.applied += 1;
            } else {
                report.discarded += 1;
            }
        }

        self.dashboard.tick(dt.as_secs_f32());
        report
    }

    pub fn activate(&mut self, id: OverlayId) -> Result<(), ActivationError> {
        self.coordinator
            .activate(id, &mut self.services, &mut self.dashboard)
    }

    pub fn deactivate_all(&mut self) -> Option<DisposalReport> {
        self.coordinator
            .deactivate_all(&mut self.services, &mut self.dashboard)
    }

    pub fn current_view(&self) -> ViewState {
        self.coordinator.current_view()
    }

    /// Remember `pid` for the timeline overlays
    pub fn select_process(&mut self, pid: u32) {
        debug!(pid, "process selected");
        self.services.selected_pid = Some(pid);
    }

    pub fn selected_pid(&self) -> Option<u32> {
        self.services.selected_pid
    }

    /// Pointer moved over the overlay viewport; `None` when it left
    pub fn pointer_moved(&mut self, pointer: Option<Pos2>, viewport: Rect) {
        let Some(id) = self.current_view().overlay() else {
            return;
        };
        if let Some(module) = self.coordinator.registry_mut().get_mut(id) {
            module.hover(&mut self.services, pointer, viewport);
        }
    }

    /// Click on the overlay viewport. Selecting a process opens its timeline.
    pub fn click(
        &mut self,
        pointer: Pos2,
        viewport: Rect,
    ) -> Result<Option<NodeAction>, ActivationError> {
        let action = self
            .coordinator
            .active_module()
            .and_then(|module| module.click(&self.services, pointer, viewport));
        if let Some(NodeAction::SelectProcess(pid)) = action {
            self.select_process(pid);
            self.activate(OverlayId::Timeline)?;
        }
        Ok(action)
    }

    /// Blocking notice text, if one is up
    pub fn notice(&self) -> Option<String> {
        self.services
            .chrome
            .get(ChromeKey::NOTICE)
            .filter(|element| element.visible)
            .map(|element| element.lines.join("\n"))
    }

    pub fn dismiss_notice(&mut self) -> bool {
        self.services.chrome.remove(ChromeKey::NOTICE)
    }

    /// Generation and viewpoint to paint the active overlay with
    pub fn active_scene(&self) -> Option<(Generation, Projection)> {
        let module = self.coordinator.active_module()?;
        let generation = module.generation()?;
        Some((generation, module.projection(self.services.clock.now())))
    }

    /// When the scheduler next needs a pump, if nothing is animating
    pub fn next_deadline(&self) -> Option<Duration> {
        self.services.scheduler.next_deadline()
    }

    pub fn is_animating(&self) -> bool {
        self.services.scheduler.has_pending_frame()
    }

    pub fn module(&self, id: OverlayId) -> Option<&OverlayModule> {
        self.coordinator.registry().get(id)
    }

    pub fn registered_overlays(&self) -> Vec<OverlayId> {
        self.coordinator.registry().ids().collect()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }
}
