//! Process timeline
//!
//! Events of the selected process are spread over up to ten lanes, in order,
//! `ceil(n / 10)` to a lane. Each event is a coloured marker with a one-letter
//! symbol; a lane takes the colour of the last event placed on it.

use std::any::Any;

use egui::{Pos2, Rect};
use glam::Vec3;
use serde_json::Value;

use super::{OverlayId, SceneBuilder, Visualization};
use crate::animation::FrameStep;
use crate::error::TelemetryError;
use crate::scene::{hex, Layer, NodeHandle, NodeMeta, PlanarView, Projection, SceneNode, Shape};
use crate::telemetry::payload::{decode, TimelineEvent, TimelinePayload};
use crate::telemetry::FetchRequest;

pub const MAX_LANES: usize = 10;

const LANE_LENGTH: f32 = 20.0;
const LANE_SPACING: f32 = 1.2;
const LANE_SAMPLES: usize = 32;
const LANE_IDLE: u32 = 0x3a4250;
const MARKER_RADIUS: f32 = 0.25;
const FADE_SECS: f32 = 0.3;
const FADE_STAGGER: f32 = 0.05;

/// Marker colour and symbol for an event kind
pub fn event_style(kind: &str) -> (u32, char) {
    match kind {
        "fork" => (0x4a90e2, 'F'),
        "exec" => (0x4ae24a, 'E'),
        "mmap" => (0xe24a4a, 'M'),
        "read" => (0xe2e24a, 'R'),
        "write" => (0xe2e24a, 'W'),
        "connect" => (0x9a4ae2, 'C'),
        "accept" => (0x9a4ae2, 'A'),
        "exit" => (0x666666, 'X'),
        _ => (0x888888, '?'),
    }
}

/// Lane and offset along it (`0..1`) for event `index` of `total`
pub fn lane_slot(index: usize, total: usize) -> (usize, f32) {
    let per_lane = total.div_ceil(MAX_LANES).max(1);
    (index / per_lane, (index % per_lane) as f32 / per_lane as f32)
}

fn lane_point(lane: usize, t: f32) -> Vec3 {
    let y = lane as f32 * LANE_SPACING;
    let bow = (t * std::f32::consts::PI).sin() * 0.35;
    Vec3::new(t * LANE_LENGTH, y - bow, 0.0)
}

#[derive(Debug, Clone, Copy)]
struct Appearing {
    handle: NodeHandle,
    delay: f32,
}

#[derive(Debug, Default)]
pub struct ProcessTimeline {
    pid: Option<u32>,
    name: Option<String>,
    lanes: Vec<NodeHandle>,
    events: usize,
    appearing: Vec<Appearing>,
    since_refresh: f32,
}

impl ProcessTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn event_count(&self) -> usize {
        self.events
    }

    fn spawn_event(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        index: usize,
        total: usize,
        event: &TimelineEvent,
    ) -> usize {
        let (lane, offset) = lane_slot(index, total);
        let (color, symbol) = event_style(&event.kind);

        let mut meta = NodeMeta::new(event.kind.clone());
        if let Some(ts) = &event.timestamp {
            meta = meta.line(format!("at {}", ts.clock_time()));
        }
        if event.count.is_some() || event.bytes.is_some() {
            meta = meta.line(format!("amount: {}", event.magnitude()));
        }

        let marker = scene.spawn(
            Layer::Dynamic,
            SceneNode::new(Shape::Sphere {
                radius: MARKER_RADIUS,
            })
            .color(color)
            .opacity(0.0)
            .at(lane_point(lane, offset))
            .with_meta(meta),
        );
        scene.spawn(
            Layer::Dynamic,
            SceneNode::new(Shape::Label {
                text: symbol.to_string(),
                size: 9.0,
            })
            .color(0xffffff)
            .at(Vec3::new(-0.08, 0.0, -0.1))
            .child_of(marker),
        );
        self.appearing.push(Appearing {
            handle: marker,
            delay: index as f32 * FADE_STAGGER,
        });
        lane
    }
}

impl Visualization for ProcessTimeline {
    fn id(&self) -> OverlayId {
        OverlayId::Timeline
    }

    fn endpoint(&mut self, selected_pid: Option<u32>) -> Option<FetchRequest> {
        self.pid = selected_pid;
        let pid = selected_pid?;
        Some(FetchRequest::new(format!("/api/proc-timeline?pid={pid}")).keyed(pid))
    }

    fn build_scene(&mut self, scene: &mut SceneBuilder<'_>) {
        self.lanes = (0..MAX_LANES)
            .map(|lane| {
                let points = (0..=LANE_SAMPLES)
                    .map(|i| lane_point(lane, i as f32 / LANE_SAMPLES as f32))
                    .collect();
                scene.spawn(
                    Layer::Static,
                    SceneNode::new(Shape::Path { points, width: 1.0 })
                        .color(LANE_IDLE)
                        .opacity(0.4),
                )
            })
            .collect();
    }

    fn apply_telemetry(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        payload: &Value,
    ) -> Result<(), TelemetryError> {
        let payload: TimelinePayload = decode(payload)?;
        scene.release_layer(Layer::Dynamic);
        self.appearing.clear();
        self.since_refresh = 0.0;

        for handle in &self.lanes {
            if let Some(node) = scene.node_mut(*handle) {
                node.color = hex(LANE_IDLE);
                node.opacity = 0.4;
                if let Shape::Path { width, .. } = &mut node.shape {
                    *width = 1.0;
                }
            }
        }

        let total = payload.timeline.len();
        let mut lane_colors: Vec<Option<u32>> = vec![None; MAX_LANES];
        for (index, event) in payload.timeline.iter().enumerate() {
            let lane = self.spawn_event(scene, index, total, event);
            if let Some(slot) = lane_colors.get_mut(lane) {
                *slot = Some(event_style(&event.kind).0);
            }
        }
        for (handle, color) in self.lanes.iter().zip(lane_colors) {
            let Some(color) = color else { continue };
            if let Some(node) = scene.node_mut(*handle) {
                node.color = hex(color);
                node.opacity = 0.6;
                if let Shape::Path { width, .. } = &mut node.shape {
                    *width = 1.5;
                }
            }
        }

        self.events = total;
        self.name = payload.name;
        Ok(())
    }

    fn update(&mut self, scene: &mut SceneBuilder<'_>, step: FrameStep) {
        if self.appearing.is_empty() {
            return;
        }
        self.since_refresh += step.dt;
        let t = self.since_refresh;
        self.appearing.retain(|event| {
            let progress = ((t - event.delay) / FADE_SECS).clamp(0.0, 1.0);
            if let Some(node) = scene.node_mut(event.handle) {
                node.opacity = progress;
            }
            progress < 1.0
        });
    }

    fn projection(&self, _elapsed: f32) -> Projection {
        let bottom = (MAX_LANES - 1) as f32 * LANE_SPACING;
        Projection::Planar(PlanarView::new(
            Rect::from_min_max(Pos2::new(-1.0, -1.5), Pos2::new(LANE_LENGTH + 1.0, bottom + 1.0)),
            48.0,
        ))
    }

    fn readout(&self) -> Vec<String> {
        let pid = self.pid.map_or_else(|| "-".to_string(), |p| p.to_string());
        let label = match &self.name {
            Some(name) => format!("pid {pid} ({name})"),
            None => format!("pid {pid}"),
        };
        vec![format!("{label}: {} events", self.events)]
    }

    fn clear_cached(&mut self) {
        *self = Self::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ResourceArena;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn events(n: usize) -> Value {
        let kinds = ["fork", "exec", "mmap", "read", "write", "connect", "exit"];
        let timeline: Vec<Value> = (0..n)
            .map(|i| {
                json!({
                    "type": kinds[i % kinds.len()],
                    "timestamp": 1_700_000_000.0 + i as f64,
                    "count": i
                })
            })
            .collect();
        json!({ "timeline": timeline, "name": "nginx" })
    }

    #[test]
    fn test_lane_distribution() {
        assert_eq!(lane_slot(0, 25), (0, 0.0));
        assert_eq!(lane_slot(2, 25), (0, 2.0 / 3.0));
        assert_eq!(lane_slot(3, 25), (1, 0.0));
        assert_eq!(lane_slot(24, 25).0, 8);
        assert_eq!(lane_slot(4, 5), (4, 0.0));
        assert_eq!(lane_slot(99, 100).0, 9);
    }

    #[test]
    fn test_event_styles() {
        assert_eq!(event_style("exec"), (0x4ae24a, 'E'));
        assert_eq!(event_style("write"), (0xe2e24a, 'W'));
        assert_eq!(event_style("exit"), (0x666666, 'X'));
        assert_eq!(event_style("clone3"), (0x888888, '?'));
    }

    #[test]
    fn test_endpoint_keyed_by_pid() {
        let mut timeline = ProcessTimeline::new();
        assert!(timeline.endpoint(None).is_none());
        let request = timeline.endpoint(Some(4242)).unwrap();
        assert_eq!(request.path, "/api/proc-timeline?pid=4242");
        assert_eq!(request.dedup_key, Some(4242));
    }

    #[test]
    fn test_markers_and_lane_colours() {
        let mut arena = ResourceArena::new();
        let g = arena.begin_generation();
        let mut timeline = ProcessTimeline::new();
        timeline.endpoint(Some(7));
        let mut scene = SceneBuilder::new(&mut arena, OverlayId::Timeline, g);
        timeline.build_scene(&mut scene);
        timeline.apply_telemetry(&mut scene, &events(4)).unwrap();

        // 10 lanes + 4 markers + 4 symbols
        assert_eq!(arena.live_in(g), 18);
        assert_eq!(timeline.readout(), vec!["pid 7 (nginx): 4 events"]);

        let lane_colors: Vec<_> = timeline.lanes[..5]
            .iter()
            .map(|h| arena.get(*h).unwrap().color)
            .collect();
        assert_eq!(
            lane_colors,
            vec![hex(0x4a90e2), hex(0x4ae24a), hex(0xe24a4a), hex(0xe2e24a), hex(LANE_IDLE)]
        );
    }

    #[test]
    fn test_markers_fade_in_staggered() {
        let mut arena = ResourceArena::new();
        let g = arena.begin_generation();
        let mut timeline = ProcessTimeline::new();
        timeline
            .apply_telemetry(&mut SceneBuilder::new(&mut arena, OverlayId::Timeline, g), &events(3))
            .unwrap();
        timeline.update(
            &mut SceneBuilder::new(&mut arena, OverlayId::Timeline, g),
            FrameStep { dt: 0.15, elapsed: 0.15 },
        );
        let mut opacities: Vec<f32> = arena
            .nodes(g)
            .filter(|(_, n)| matches!(n.shape, Shape::Sphere { .. }))
            .map(|(_, n)| n.opacity)
            .collect();
        opacities.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert!((opacities[0] - 0.5).abs() < 1e-4);
        assert!(opacities[1] < opacities[0]);
        assert!(opacities[2] < opacities[1]);
    }
}
