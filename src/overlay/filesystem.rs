//! Filesystem block map
//!
//! One square per block on a unit grid, coloured by state, with a frame and
//! a label for every zone. Blocks being written pulse.

use std::any::Any;

use egui::{Pos2, Rect};
use glam::{Vec2, Vec3};
use serde_json::Value;

use super::{OverlayId, SceneBuilder, Visualization};
use crate::animation::FrameStep;
use crate::error::TelemetryError;
use crate::scene::{Layer, NodeHandle, NodeMeta, PlanarView, Projection, SceneNode, Shape};
use crate::telemetry::payload::{
    decode, display_scalar, BlockState, FilesystemMeta, FilesystemPayload,
};
use crate::telemetry::FetchRequest;

const BLOCK_SIZE: f32 = 0.9;
const VIEW_PADDING: f32 = 48.0;
const WRITE_PULSE_RATE: f32 = 4.0;
const LEGEND: &str = "gray=free, black=used, yellow=actively writing";

pub fn block_color(state: BlockState) -> u32 {
    match state {
        BlockState::Free => 0x8f9499,
        BlockState::Writing => 0xe6c15a,
        BlockState::Used => 0x15171a,
    }
}

fn state_name(state: BlockState) -> &'static str {
    match state {
        BlockState::Free => "free",
        BlockState::Writing => "writing",
        BlockState::Used => "used",
    }
}

/// Zone label text, e.g. `root  used:42%  act:high`
pub fn zone_label(name: &str, used_percent: f64, activity: &Value) -> String {
    format!("{name}  used:{used_percent}%  act:{}", display_scalar(activity))
}

/// Bottom-line readout for the map meta block
pub fn meta_line(meta: &FilesystemMeta) -> String {
    format!(
        "used {}GB / {}GB ({}%) | free {}GB | write {:.0} B/s | active blocks {}",
        meta.used_gb,
        meta.total_gb,
        meta.used_percent,
        meta.free_gb,
        meta.write_bps,
        meta.writing_blocks
    )
}

#[derive(Debug, Default)]
pub struct BlockMap {
    rows: u32,
    cols: u32,
    blocks: usize,
    zones: usize,
    writing: Vec<NodeHandle>,
    meta: Option<FilesystemMeta>,
    pulse_phase: f32,
}

impl BlockMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid(&self) -> (u32, u32) {
        (self.rows, self.cols)
    }

    pub fn block_count(&self) -> usize {
        self.blocks
    }

    pub fn zone_count(&self) -> usize {
        self.zones
    }

    pub fn writing(&self) -> &[NodeHandle] {
        &self.writing
    }

    fn write_opacity(&self) -> f32 {
        0.55 + 0.45 * (self.pulse_phase * WRITE_PULSE_RATE).sin().abs()
    }
}

impl Visualization for BlockMap {
    fn id(&self) -> OverlayId {
        OverlayId::Filesystem
    }

    fn endpoint(&mut self, _selected_pid: Option<u32>) -> Option<FetchRequest> {
        Some(FetchRequest::new("/api/filesystem-blocks"))
    }

    fn build_scene(&mut self, scene: &mut SceneBuilder<'_>) {
        scene.spawn(
            Layer::Static,
            SceneNode::new(Shape::Label {
                text: "FILESYSTEM BLOCK MAP".to_string(),
                size: 18.0,
            })
            .color(0xc8ccd4)
            .at_xy(0.0, -1.6),
        );
    }

    fn apply_telemetry(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        payload: &Value,
    ) -> Result<(), TelemetryError> {
        let payload: FilesystemPayload = decode(payload)?;
        scene.release_layer(Layer::Dynamic);
        self.writing.clear();

        let rows = payload.rows.max(1);
        let cols = payload.cols.max(1);

        for block in &payload.blocks {
            let (r, c) = block.cell(cols);
            let mut node = SceneNode::new(Shape::Rect {
                size: Vec2::splat(BLOCK_SIZE),
            })
            .color(block_color(block.state))
            .at_xy(c as f32 + 0.5, r as f32 + 0.5)
            .with_meta(
                NodeMeta::new(format!("block {r},{c}"))
                    .line(format!("state: {}", state_name(block.state))),
            );
            if block.state == BlockState::Writing {
                node.opacity = self.write_opacity();
            }
            let handle = scene.spawn(Layer::Dynamic, node);
            if block.state == BlockState::Writing {
                self.writing.push(handle);
            }
        }

        for zone in &payload.zones {
            let start = zone.row_start as f32;
            let end = zone.row_end.unwrap_or(zone.row_start).max(zone.row_start) as f32 + 1.0;
            let center = Vec3::new(cols as f32 * 0.5, (start + end) * 0.5, 0.1);
            scene.spawn(
                Layer::Dynamic,
                SceneNode::new(Shape::Frame {
                    size: Vec2::new(cols as f32 + 0.3, end - start + 0.2),
                })
                .color(0xaab2bc)
                .opacity(0.26)
                .at(center)
                .with_meta(
                    NodeMeta::new(zone.name.clone())
                        .line(format!("used: {}%", zone.used_percent))
                        .line(format!("activity: {}", display_scalar(&zone.activity)))
                        .line(format!("rows {}-{}", zone.row_start, end as u32 - 1)),
                ),
            );
            scene.spawn(
                Layer::Dynamic,
                SceneNode::new(Shape::Label {
                    text: zone_label(&zone.name, zone.used_percent, &zone.activity),
                    size: 11.0,
                })
                .color(0xc8ced8)
                .opacity(0.92)
                .at(Vec3::new(0.1, start + 0.35, -0.1)),
            );
        }

        self.rows = rows;
        self.cols = cols;
        self.blocks = payload.blocks.len();
        self.zones = payload.zones.len();
        self.meta = Some(payload.meta);
        Ok(())
    }

    fn update(&mut self, scene: &mut SceneBuilder<'_>, step: FrameStep) {
        self.pulse_phase += step.dt;
        let opacity = self.write_opacity();
        for handle in &self.writing {
            if let Some(node) = scene.node_mut(*handle) {
                node.opacity = opacity;
            }
        }
    }

    fn projection(&self, _elapsed: f32) -> Projection {
        let rows = self.rows.max(1) as f32;
        let cols = self.cols.max(1) as f32;
        Projection::Planar(PlanarView::new(
            Rect::from_min_max(Pos2::new(-0.5, -2.0), Pos2::new(cols + 0.5, rows + 0.5)),
            VIEW_PADDING,
        ))
    }

    fn readout(&self) -> Vec<String> {
        match &self.meta {
            Some(meta) => vec![meta_line(meta), LEGEND.to_string()],
            None => vec!["filesystem map: waiting for telemetry".to_string(), LEGEND.to_string()],
        }
    }

    fn clear_cached(&mut self) {
        *self = Self::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
