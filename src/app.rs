//! Overlay Viewer - native egui shell
//!
//! Layout:
//! ┌──────────────────────────────────────────────┐
//! │  Overlay menu                       [Exit]   │
//! ├──────────────┬───────────────────────────────┤
//! │  Dashboard   │  Active overlay viewport      │
//! │  (syscalls,  │  (readout top-left,           │
//! │  connections,│   tooltip at pointer)         │
//! │  namespaces) │                               │
//! └──────────────┴───────────────────────────────┘
//!
//! The app owns an [`AppContext`] and pumps it once per frame. Everything it
//! draws is read back from the context; it never mutates runtime state except
//! through the context's methods.

use std::time::Duration;

use eframe::egui;
use egui::{Align2, Color32, FontId, RichText, Sense};
use tracing::warn;

use crate::chrome::{ChromeKey, ChromeKind};
use crate::context::AppContext;
use crate::dashboard::{DashboardElements, RefresherKind};
use crate::overlay::OverlayId;
use crate::scene::paint::paint_generation;

const PANEL_BG: Color32 = Color32::from_rgb(18, 20, 24);
const VIEWPORT_BG: Color32 = Color32::from_rgb(10, 11, 14);
const TEXT: Color32 = Color32::from_rgb(0xc8, 0xcd, 0xd6);
const ACCENT: Color32 = Color32::from_rgb(0x5a, 0xc8, 0xfa);
const WARN: Color32 = Color32::from_rgb(0xe6, 0xc1, 0x5a);

/// Upper bound on idle repaint spacing
const IDLE_REPAINT: Duration = Duration::from_millis(500);

pub struct OverlayApp {
    // Runtime
    context: AppContext,

    // Keeps fetch tasks alive for as long as the window is open
    _runtime: Option<tokio::runtime::Runtime>,
}

impl OverlayApp {
    pub fn new(mut context: AppContext, runtime: Option<tokio::runtime::Runtime>) -> Self {
        context.start();
        Self {
            context,
            _runtime: runtime,
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Put `id` on screen; failures are logged and shown as a notice
    pub fn open(&mut self, id: OverlayId) {
        if let Err(err) = self.context.activate(id) {
            warn!(overlay = %id, error = %err, "could not open overlay");
        }
    }

    fn menu_bar(&mut self, ctx: &egui::Context) {
        let mut requested: Option<OverlayId> = None;
        let mut exit = false;
        let current = self.context.current_view().overlay();
        let overlays = self.context.registered_overlays();
        let has_exit = self.context.services().chrome.contains(ChromeKey::EXIT);

        egui::TopBottomPanel::top("overlay_menu").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(RichText::new("overlays").color(ACCENT).strong());
                ui.separator();
                for id in overlays {
                    if ui
                        .selectable_label(current == Some(id), id.display_name())
                        .clicked()
                    {
                        requested = Some(id);
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if has_exit && ui.button("✕ Exit").clicked() {
                        exit = true;
                    }
                    if let Some(pid) = self.context.selected_pid() {
                        ui.label(RichText::new(format!("pid {pid}")).color(TEXT));
                    }
                });
            });
        });

        if exit {
            self.context.deactivate_all();
        } else if let Some(id) = requested {
            self.open(id);
        }
    }

    fn dashboard_panel(&self, ctx: &egui::Context) {
        let dashboard = self.context.dashboard();
        let panels = dashboard.alpha_for(DashboardElements::STATUS_PANELS);
        let indicators = dashboard.alpha_for(DashboardElements::SUBSYSTEM_INDICATORS);
        let blocks = dashboard.alpha_for(DashboardElements::CONNECTION_BLOCKS);

        egui::SidePanel::left("dashboard")
            .resizable(false)
            .exact_width(260.0)
            .frame(egui::Frame::none().fill(PANEL_BG).inner_margin(8.0))
            .show(ctx, |ui| {
                ui.label(RichText::new("SYSCALLS").color(ACCENT.gamma_multiply(panels)).strong());
                if dashboard.syscalls_warmup() {
                    ui.label(
                        RichText::new("warming up")
                            .color(WARN.gamma_multiply(panels))
                            .small(),
                    );
                }
                for row in dashboard.syscalls() {
                    ui.horizontal(|ui| {
                        ui.label(
                            RichText::new(row.subsystem.tag())
                                .monospace()
                                .color(ACCENT.gamma_multiply(indicators)),
                        );
                        ui.label(
                            RichText::new(row.display())
                                .monospace()
                                .color(TEXT.gamma_multiply(panels)),
                        );
                    });
                }
                fallback_line(ui, dashboard.fallback(RefresherKind::Syscalls), panels);

                ui.separator();
                ui.label(
                    RichText::new("CONNECTIONS")
                        .color(ACCENT.gamma_multiply(panels))
                        .strong(),
                );
                for conn in dashboard.connections() {
                    ui.label(
                        RichText::new(format!("{} → {}  {}", conn.local, conn.remote, conn.state))
                            .monospace()
                            .color(TEXT.gamma_multiply(blocks)),
                    );
                }
                fallback_line(ui, dashboard.fallback(RefresherKind::Connections), panels);

                ui.separator();
                ui.label(RichText::new("NAMESPACES").color(ACCENT.gamma_multiply(panels)).strong());
                for ns in dashboard.namespaces() {
                    let label = ns.label.as_deref().unwrap_or(&ns.id);
                    ui.label(
                        RichText::new(format!(
                            "{label}  act {:.2}  uniq {}",
                            ns.activity, ns.unique_count
                        ))
                            .monospace()
                            .color(TEXT.gamma_multiply(panels)),
                    );
                }
                fallback_line(ui, dashboard.fallback(RefresherKind::Isolation), panels);
            });
    }

    fn viewport(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(VIEWPORT_BG))
            .show(ctx, |ui| {
                let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click());
                let viewport = response.rect;

                let Some((generation, projection)) = self.context.active_scene() else {
                    painter.text(
                        viewport.center(),
                        Align2::CENTER_CENTER,
                        "choose an overlay from the menu",
                        FontId::proportional(14.0),
                        TEXT.gamma_multiply(0.6),
                    );
                    return;
                };

                paint_generation(
                    &painter,
                    &self.context.services().arena,
                    generation,
                    &projection,
                    viewport,
                );

                self.context.pointer_moved(response.hover_pos(), viewport);
                if response.clicked() {
                    if let Some(pos) = response.interact_pointer_pos() {
                        if let Err(err) = self.context.click(pos, viewport) {
                            warn!(error = %err, "click action failed");
                        }
                    }
                }

                self.paint_chrome(&painter, viewport);
            });
    }

    fn paint_chrome(&self, painter: &egui::Painter, viewport: egui::Rect) {
        let Some(active) = self.context.current_view().overlay() else {
            return;
        };
        for (key, element) in self.context.services().chrome.iter() {
            if !element.visible || key.owner != Some(active) {
                continue;
            }
            match key.kind {
                ChromeKind::Readout => {
                    let mut pos = viewport.left_top() + egui::vec2(12.0, 10.0);
                    for line in &element.lines {
                        painter.text(pos, Align2::LEFT_TOP, line, FontId::monospace(12.0), TEXT);
                        pos.y += 16.0;
                    }
                }
                ChromeKind::Tooltip => {
                    let anchor = element.anchor.unwrap_or_else(|| viewport.center());
                    let text = element.lines.join("\n");
                    let galley = painter.layout_no_wrap(text, FontId::monospace(11.0), TEXT);
                    let rect = egui::Rect::from_min_size(
                        anchor + egui::vec2(14.0, 14.0),
                        galley.size() + egui::vec2(12.0, 8.0),
                    );
                    painter.rect_filled(rect, 4.0, PANEL_BG.gamma_multiply(0.92));
                    painter.galley(rect.min + egui::vec2(6.0, 4.0), galley, TEXT);
                }
                ChromeKind::ExitControl | ChromeKind::Notice => {}
            }
        }
    }

    fn notice(&mut self, ctx: &egui::Context) {
        let Some(text) = self.context.notice() else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new("Overlay unavailable")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(RichText::new(text).color(WARN));
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.context.dismiss_notice();
        }
    }

    fn schedule_repaint(&self, ctx: &egui::Context) {
        let fading = self.context.dashboard().alpha_for(DashboardElements::all()) < 1.0;
        if self.context.is_animating() || fading {
            ctx.request_repaint();
            return;
        }
        let now = self.context.services().clock.now();
        let wait = self
            .context
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(now))
            .unwrap_or(IDLE_REPAINT)
            .min(IDLE_REPAINT);
        ctx.request_repaint_after(wait);
    }
}

fn fallback_line(
    ui: &mut egui::Ui,
    fallback: Option<&crate::telemetry::FallbackIndicator>,
    alpha: f32,
) {
    if let Some(fallback) = fallback {
        ui.label(
            RichText::new(format!("offline: {}", fallback.reason))
                .small()
                .color(WARN.gamma_multiply(alpha)),
        );
    }
}

impl eframe::App for OverlayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.context.pump();

        // Esc closes whatever overlay is up
        let escape = ctx.input(|i| i.key_pressed(egui::Key::Escape));
        if escape && !self.context.current_view().is_none() {
            self.context.deactivate_all();
        }

        self.menu_bar(ctx);
        self.dashboard_panel(ctx);
        self.viewport(ctx);
        self.notice(ctx);
        self.schedule_repaint(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.context.deactivate_all();
    }
}
