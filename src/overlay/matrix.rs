//! Process matrix panel
//!
//! Up to fifteen processes with one bar per resource, each normalised against
//! the busiest listed process. Clicking a row selects its pid.

use std::any::Any;

use egui::{Pos2, Rect};
use glam::{Vec2, Vec3};
use serde_json::Value;

use super::{OverlayId, SceneBuilder, Visualization};
use crate::animation::FrameStep;
use crate::error::TelemetryError;
use crate::scene::{
    Layer, NodeAction, NodeHandle, NodeMeta, PlanarView, Projection, SceneNode, Shape,
};
use crate::telemetry::payload::{decode, ProcMatrixPayload, ProcRow};
use crate::telemetry::FetchRequest;

pub const MAX_ROWS: usize = 15;

pub const ROW_HEIGHT: f32 = 1.0;
const ROW_WIDTH: f32 = 24.0;
pub const BAR_START: f32 = 6.0;
const BAR_SPACING: f32 = 3.6;
pub const BAR_WIDTH: f32 = 3.0;
const BAR_HEIGHT: f32 = 0.6;
const ROW_OPACITY: f32 = 0.85;
const FADE_SECS: f32 = 0.3;
const FADE_STAGGER: f32 = 0.02;

#[derive(Debug, Clone, Copy)]
pub struct Resource {
    pub key: &'static str,
    pub label: &'static str,
    pub color: u32,
    value: fn(&ProcRow) -> f64,
}

impl Resource {
    pub fn value(&self, row: &ProcRow) -> f64 {
        (self.value)(row)
    }
}

pub const RESOURCES: [Resource; 5] = [
    Resource { key: "cpu", label: "CPU", color: 0x5a7a9a, value: |r: &ProcRow| r.cpu },
    Resource { key: "mem", label: "MEM", color: 0x6a8a8a, value: |r: &ProcRow| r.mem },
    Resource { key: "io", label: "IO", color: 0x7a6a8a, value: |r: &ProcRow| r.io },
    Resource { key: "net", label: "NET", color: 0x6a7a9a, value: |r: &ProcRow| r.net },
    Resource { key: "fd", label: "FD", color: 0x7a8a8a, value: |r: &ProcRow| r.fd },
];

/// Per-resource maxima over the listed rows, never below 1
pub fn column_maxima(rows: &[ProcRow]) -> [f64; 5] {
    let mut maxima = [1.0_f64; 5];
    for row in rows {
        for (max, resource) in maxima.iter_mut().zip(RESOURCES.iter()) {
            *max = max.max(resource.value(row));
        }
    }
    maxima
}

/// Bar fill in `0..=1`
pub fn normalized(value: f64, max: f64) -> f32 {
    (value.max(0.0) / max.max(1.0)).min(1.0) as f32
}

#[derive(Debug, Clone, Copy)]
struct FadingRow {
    handle: NodeHandle,
    delay: f32,
}

#[derive(Debug, Default)]
pub struct ProcessMatrix {
    rows: Vec<ProcRow>,
    total: usize,
    fading: Vec<FadingRow>,
    since_refresh: f32,
}

impl ProcessMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows currently shown, in payload order
    pub fn rows(&self) -> &[ProcRow] {
        &self.rows
    }

    fn spawn_row(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        index: usize,
        row: &ProcRow,
        maxima: &[f64; 5],
    ) {
        let select = NodeAction::SelectProcess(row.pid);
        let handle = scene.spawn(
            Layer::Dynamic,
            SceneNode::new(Shape::Rect {
                size: Vec2::new(ROW_WIDTH, ROW_HEIGHT * 0.9),
            })
            .color(0x141a24)
            .opacity(0.0)
            .at_xy(ROW_WIDTH * 0.5, index as f32 * ROW_HEIGHT)
            .with_meta(
                NodeMeta::new(format!("{} {}", row.pid, row.name))
                    .line("click to open timeline")
                    .action(select),
            ),
        );
        self.fading.push(FadingRow {
            handle,
            delay: index as f32 * FADE_STAGGER,
        });

        let left = -ROW_WIDTH * 0.5;
        scene.spawn(
            Layer::Dynamic,
            SceneNode::new(Shape::Label {
                text: row.pid.to_string(),
                size: 11.0,
            })
            .color(0xc8ccd4)
            .at(Vec3::new(left + 0.3, 0.0, -0.1))
            .child_of(handle),
        );
        scene.spawn(
            Layer::Dynamic,
            SceneNode::new(Shape::Label {
                text: row.name.chars().take(16).collect(),
                size: 11.0,
            })
            .color(0x9aa2aa)
            .at(Vec3::new(left + 1.8, 0.0, -0.1))
            .child_of(handle),
        );

        for (i, resource) in RESOURCES.iter().enumerate() {
            let value = resource.value(row);
            let x = left + BAR_START + i as f32 * BAR_SPACING;
            scene.spawn(
                Layer::Dynamic,
                SceneNode::new(Shape::Frame {
                    size: Vec2::new(BAR_WIDTH, BAR_HEIGHT),
                })
                .color(0xa0aabe)
                .opacity(0.2)
                .at(Vec3::new(x + BAR_WIDTH * 0.5, 0.0, -0.05))
                .child_of(handle),
            );
            let fill = normalized(value, maxima[i]) * BAR_WIDTH;
            if fill > 0.0 {
                scene.spawn(
                    Layer::Dynamic,
                    SceneNode::new(Shape::Rect {
                        size: Vec2::new(fill, BAR_HEIGHT),
                    })
                    .color(resource.color)
                    .opacity(0.6)
                    .at(Vec3::new(x + fill * 0.5, 0.0, -0.05))
                    .child_of(handle)
                    .with_meta(
                        NodeMeta::new(format!("{}: {value:.2}", resource.label))
                            .line(format!("pid {} {}", row.pid, row.name))
                            .action(select),
                    ),
                );
            }
        }
    }
}

impl Visualization for ProcessMatrix {
    fn id(&self) -> OverlayId {
        OverlayId::Matrix
    }

    fn endpoint(&mut self, _selected_pid: Option<u32>) -> Option<FetchRequest> {
        Some(FetchRequest::new("/api/proc-matrix"))
    }

    fn build_scene(&mut self, scene: &mut SceneBuilder<'_>) {
        let header_y = -1.2;
        let left = 0.0;
        for (text, x) in [("PID", left + 0.3), ("NAME", left + 1.8)] {
            scene.spawn(
                Layer::Static,
                SceneNode::new(Shape::Label {
                    text: text.to_string(),
                    size: 11.0,
                })
                .color(0xc8ccd4)
                .opacity(0.8)
                .at_xy(x, header_y),
            );
        }
        for (i, resource) in RESOURCES.iter().enumerate() {
            scene.spawn(
                Layer::Static,
                SceneNode::new(Shape::Label {
                    text: resource.label.to_string(),
                    size: 11.0,
                })
                .color(resource.color)
                .opacity(0.8)
                .at_xy(left + BAR_START + i as f32 * BAR_SPACING, header_y),
            );
        }
    }

    fn apply_telemetry(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        payload: &Value,
    ) -> Result<(), TelemetryError> {
        let payload: ProcMatrixPayload = decode(payload)?;
        scene.release_layer(Layer::Dynamic);
        self.fading.clear();
        self.since_refresh = 0.0;

        self.total = payload.matrix.len();
        let rows: Vec<ProcRow> = payload.matrix.into_iter().take(MAX_ROWS).collect();
        let maxima = column_maxima(&rows);
        for (index, row) in rows.iter().enumerate() {
            self.spawn_row(scene, index, row, &maxima);
        }
        self.rows = rows;
        Ok(())
    }

    fn update(&mut self, scene: &mut SceneBuilder<'_>, step: FrameStep) {
        if self.fading.is_empty() {
            return;
        }
        self.since_refresh += step.dt;
        let t = self.since_refresh;
        self.fading.retain(|row| {
            let progress = ((t - row.delay) / FADE_SECS).clamp(0.0, 1.0);
            if let Some(node) = scene.node_mut(row.handle) {
                node.opacity = progress * ROW_OPACITY;
            }
            progress < 1.0
        });
    }

    fn projection(&self, _elapsed: f32) -> Projection {
        let rows = self.rows.len().max(1) as f32;
        Projection::Planar(PlanarView::new(
            Rect::from_min_max(
                Pos2::new(-0.5, -2.0),
                Pos2::new(ROW_WIDTH + 0.5, rows * ROW_HEIGHT),
            ),
            48.0,
        ))
    }

    fn readout(&self) -> Vec<String> {
        if self.total == 0 {
            return vec!["processes: waiting for telemetry".to_string()];
        }
        vec![format!(
            "processes: {} (showing {}) | click a row to open its timeline",
            self.total,
            self.rows.len()
        )]
    }

    fn clear_cached(&mut self) {
        *self = Self::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
