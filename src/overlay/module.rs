//! Shared overlay lifecycle
//!
//! `activate` builds a fresh generation, arms the frame loop and the poller
//! and requests the first snapshot. `deactivate` hands every handle to
//! [`dispose`] and bumps the render token, so completions still in flight are
//! discarded when they arrive.

use std::sync::Arc;
use std::time::Duration;

use egui::{Pos2, Rect};
use tracing::{debug, info, warn};

use super::{OverlayDescriptor, OverlayId, RenderToken, SceneBuilder, Visualization};
use crate::animation::FrameStep;
use crate::chrome::ChromeKey;
use crate::config::OverlaySettings;
use crate::context::Services;
use crate::disposal::{dispose, DisposalReport, OverlayResources};
use crate::error::ActivationError;
use crate::hover::{self, HoverState};
use crate::scene::{Generation, NodeAction, Projection};
use crate::scheduler::{Ticket, TicketOwner};
use crate::telemetry::{
    CompletionTarget, FallbackIndicator, FetchRequest, PollResult, TelemetrySnapshot,
};

pub struct OverlayModule {
    descriptor: OverlayDescriptor,
    viz: Box<dyn Visualization>,
    settings: OverlaySettings,
    initialized: bool,
    resources: OverlayResources,
    token: RenderToken,
    request: Option<FetchRequest>,
    latest: Option<Arc<TelemetrySnapshot>>,
    fallback: Option<FallbackIndicator>,
    activated_at: Duration,
    hover: HoverState,
}

impl std::fmt::Debug for OverlayModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayModule")
            .field("descriptor", &self.descriptor)
            .field("generation", &self.resources.generation)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl OverlayModule {
    pub fn new(viz: Box<dyn Visualization>, settings: OverlaySettings) -> Self {
        Self {
            descriptor: OverlayDescriptor::new(viz.id()),
            viz,
            settings,
            initialized: false,
            resources: OverlayResources::default(),
            token: RenderToken::default(),
            request: None,
            latest: None,
            fallback: None,
            activated_at: Duration::ZERO,
            hover: HoverState::default(),
        }
    }

    pub fn id(&self) -> OverlayId {
        self.descriptor.id
    }

    fn owner(&self) -> TicketOwner {
        TicketOwner::Overlay(self.descriptor.id)
    }

    pub fn descriptor(&self) -> &OverlayDescriptor {
        &self.descriptor
    }

    pub fn is_active(&self) -> bool {
        self.descriptor.is_active
    }

    pub fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn generation(&self) -> Option<Generation> {
        self.resources.generation
    }

    pub fn token(&self) -> RenderToken {
        self.token
    }

    pub fn frame_handle(&self) -> Option<Ticket> {
        self.resources.frame.handle()
    }

    pub fn poll_ticket(&self) -> Option<Ticket> {
        self.resources.poll_ticket
    }

    pub fn latest(&self) -> Option<&Arc<TelemetrySnapshot>> {
        self.latest.as_ref()
    }

    pub fn fallback(&self) -> Option<&FallbackIndicator> {
        self.fallback.as_ref()
    }

    pub fn visualization(&self) -> &dyn Visualization {
        self.viz.as_ref()
    }

    /// Probe the rendering surface; only the first successful call does work
    pub fn init(&mut self, services: &mut Services) -> Result<(), ActivationError> {
        if self.initialized {
            return Ok(());
        }
        let id = self.descriptor.id;
        services
            .surface
            .probe(id)
            .map_err(|reason| ActivationError::SurfaceUnavailable { overlay: id, reason })?;
        self.initialized = true;
        debug!(overlay = %id, "overlay initialized");
        Ok(())
    }

    /// Build a fresh scene and start the loop and the poller. A no-op when
    /// already active.
    pub fn activate(&mut self, services: &mut Services) -> Result<(), ActivationError> {
        if self.descriptor.is_active {
            return Ok(());
        }
        self.init(services)?;

        let id = self.descriptor.id;
        let owner = self.owner();
        let now = services.clock.now();
        let generation = services.arena.begin_generation();
        self.resources.generation = Some(generation);
        self.activated_at = now;
        self.latest = None;
        self.fallback = None;

        {
            let mut scene = SceneBuilder::new(&mut services.arena, id, generation);
            self.viz.build_scene(&mut scene);
        }

        for (key, visible) in [(ChromeKey::readout(id), true), (ChromeKey::tooltip(id), false)] {
            services.chrome.ensure(key, visible);
            self.resources.chrome.push(key);
        }

        self.resources.frame.start(&mut services.scheduler, owner);
        self.descriptor.is_active = true;

        let ttl = self.settings.ttl();
        let request = self
            .viz
            .endpoint(services.selected_pid)
            .map(|req| req.with_ttl(ttl));
        self.request = request.clone();
        match request {
            Some(request) => {
                let poller = services.telemetry.poller(&request.path, request.ttl);
                let interval = self.settings.interval();
                let ticket = poller.poll(&mut services.scheduler, owner, interval, now);
                self.resources.poll_ticket = Some(ticket);
                self.request_snapshot(services);
            }
            None => {
                self.fallback = Some(FallbackIndicator::new("no process selected"));
            }
        }
        self.refresh_readout(services);

        info!(overlay = %id, ?generation, "overlay activated");
        Ok(())
    }

    /// Release everything. Calling it again is a no-op.
    pub fn deactivate(&mut self, services: &mut Services) -> DisposalReport {
        let was_active = self.descriptor.is_active;
        self.descriptor.is_active = false;

        let report = dispose(
            &mut self.resources,
            &mut services.scheduler,
            &mut services.arena,
            &mut services.chrome,
        );

        if was_active {
            self.token = self.token.next();
            self.viz.clear_cached();
            self.hover.forget();
            if let Some(request) = self.request.take() {
                services.telemetry.forget(&request.path);
            }
            self.latest = None;
            self.fallback = None;
            info!(
                overlay = %self.descriptor.id,
                nodes = report.nodes,
                "overlay deactivated"
            );
        }
        report
    }

    fn request_snapshot(&mut self, services: &mut Services) {
        let (Some(request), Some(generation)) = (self.request.clone(), self.resources.generation)
        else {
            return;
        };
        self.token = self.token.next();
        services.telemetry.request(
            request,
            CompletionTarget::Overlay {
                id: self.descriptor.id,
                generation,
                token: self.token,
            },
        );
    }

    /// Periodic poll ticket fired
    pub fn on_poll(&mut self, services: &mut Services, ticket: Ticket) {
        if self.descriptor.is_active && self.resources.poll_ticket == Some(ticket) {
            self.request_snapshot(services);
        }
    }

    /// Frame ticket fired
    pub fn on_frame(&mut self, services: &mut Services, ticket: Ticket) {
        let owner = self.owner();
        let now = services.clock.now();
        let max_step = services.config.animation.max_step();
        let live = self.descriptor.is_active;
        let Some(dt) = self.resources.frame.on_frame(
            &mut services.scheduler,
            owner,
            ticket,
            now,
            max_step,
            live,
        ) else {
            return;
        };
        let Some(generation) = self.resources.generation else {
            return;
        };
        let step = FrameStep {
            dt,
            elapsed: now.saturating_sub(self.activated_at).as_secs_f32(),
        };
        let mut scene = SceneBuilder::new(&mut services.arena, self.descriptor.id, generation);
        self.viz.update(&mut scene, step);
    }

    /// Apply a finished fetch if it still belongs to this activation.
    /// Returns `true` when the result was applied.
    pub fn on_completion(
        &mut self,
        services: &mut Services,
        generation: Generation,
        token: RenderToken,
        result: PollResult,
    ) -> bool {
        let id = self.descriptor.id;
        if !self.descriptor.is_active
            || self.resources.generation != Some(generation)
            || self.token != token
        {
            debug!(overlay = %id, ?token, current = ?self.token, "discarding stale telemetry");
            return false;
        }

        let mut scene = SceneBuilder::new(&mut services.arena, id, generation);
        match result {
            PollResult::Snapshot(snapshot) => {
                match self.viz.apply_telemetry(&mut scene, &snapshot.payload) {
                    Ok(()) => {
                        self.latest = Some(snapshot);
                        self.fallback = None;
                    }
                    Err(err) => {
                        warn!(overlay = %id, error = %err, "telemetry payload rejected");
                        let fallback = FallbackIndicator::from(err);
                        self.viz.apply_fallback(&mut scene, &fallback);
                        self.fallback = Some(fallback);
                    }
                }
            }
            PollResult::Fallback(fallback) => {
                self.viz.apply_fallback(&mut scene, &fallback);
                self.fallback = Some(fallback);
            }
        }
        self.refresh_readout(services);
        true
    }

    fn refresh_readout(&self, services: &mut Services) {
        let key = ChromeKey::readout(self.descriptor.id);
        let lines = match &self.fallback {
            Some(fallback) => vec![format!(
                "{} telemetry fallback: {}",
                self.descriptor.id, fallback.reason
            )],
            None => self.viz.readout(),
        };
        services.chrome.set_lines(key, lines);
    }

    /// Current viewpoint, driven by time since activation
    pub fn projection(&self, now: Duration) -> Projection {
        let elapsed = now.saturating_sub(self.activated_at).as_secs_f32();
        self.viz.projection(elapsed)
    }

    /// Update hover state for a pointer position; `None` clears it
    pub fn hover(&mut self, services: &mut Services, pointer: Option<Pos2>, viewport: Rect) {
        let key = ChromeKey::tooltip(self.descriptor.id);
        let active = self.descriptor.is_active;
        let Some(generation) = self.resources.generation.filter(|_| active) else {
            return;
        };
        let Some(pointer) = pointer else {
            self.hover.clear(&mut services.arena, &mut services.chrome, key);
            return;
        };
        let projection = self.projection(services.clock.now());
        let hit = hover::pick(&services.arena, generation, &projection, pointer, viewport);
        self.hover
            .update(&mut services.arena, &mut services.chrome, key, hit, pointer);
    }

    /// Action attached to the node under `pointer`, if any
    pub fn click(&self, services: &Services, pointer: Pos2, viewport: Rect) -> Option<NodeAction> {
        let generation = self.resources.generation.filter(|_| self.descriptor.is_active)?;
        let projection = self.projection(services.clock.now());
        let hit = hover::pick(&services.arena, generation, &projection, pointer, viewport)?;
        services
            .arena
            .parent_chain(hit)
            .into_iter()
            .find_map(|h| services.arena.get(h)?.meta.as_ref()?.action)
    }
}
