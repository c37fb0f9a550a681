//! Device ring overlay
//!
//! Devices sit on a ring around the kernel core and are linked to the kernel
//! subsystems they talk to by cubic bezier curves. Pulses travel along each
//! link at a rate and speed driven by the device's normalised load.

use std::any::Any;
use std::f32::consts::{FRAC_PI_2, TAU};

use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use super::{OverlayId, SceneBuilder, Visualization};
use crate::animation::FrameStep;
use crate::error::TelemetryError;
use crate::scene::{Layer, NodeHandle, NodeMeta, Projection, SceneNode, Shape, Viewpoint};
use crate::telemetry::payload::{decode, DevicesPayload};
use crate::telemetry::FetchRequest;

const RING_RADIUS: f32 = 6.8;
const CORE_SPIN: f32 = 0.08;
const BEZIER_SAMPLES: usize = 24;
const PULSE_RADIUS: f32 = 0.06;

const SUBSYSTEMS: [(&str, Vec2); 5] = [
    ("vfs", Vec2::new(-1.2, -0.6)),
    ("net", Vec2::new(1.4, 0.6)),
    ("sched", Vec2::new(-1.5, 1.0)),
    ("signals", Vec2::new(-0.3, 1.3)),
    ("kernel", Vec2::new(0.0, 0.0)),
];

pub fn device_color(kind: &str) -> u32 {
    match kind.to_ascii_lowercase().as_str() {
        "network" | "net" => 0x58b6d8,
        "block" | "disk" => 0xe6c15a,
        "tty" | "char" => 0xc28ee8,
        _ => 0xa0a8b2,
    }
}

fn subsystem_target(name: &str) -> Vec2 {
    SUBSYSTEMS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, p)| *p)
        .unwrap_or(Vec2::ZERO)
}

/// Ring position of device `index` out of `count`, first at the top
pub fn ring_position(index: usize, count: usize) -> Vec2 {
    let angle = index as f32 / count.max(1) as f32 * TAU - FRAC_PI_2;
    Vec2::new(angle.cos(), angle.sin()) * RING_RADIUS
}

fn cubic_bezier(p: &[Vec3; 4], t: f32) -> Vec3 {
    let u = 1.0 - t;
    p[0] * (u * u * u) + p[1] * (3.0 * u * u * t) + p[2] * (3.0 * u * t * t) + p[3] * (t * t * t)
}

fn link_curve(from: Vec2, to: Vec2, bow_up: bool) -> [Vec3; 4] {
    let bow = if bow_up { 0.4 } else { -0.4 };
    let p1 = from.lerp(to, 0.35) + Vec2::new(0.0, bow);
    let p2 = from.lerp(to, 0.7) + Vec2::new(0.0, 0.2);
    [from.extend(0.0), p1.extend(0.0), p2.extend(0.0), to.extend(0.0)]
}

/// Pulses per second on a link
pub fn pulse_rate(load: f32) -> f32 {
    0.5 + 4.5 * load
}

/// Curve parameter per second
pub fn pulse_speed(load: f32) -> f32 {
    0.2 + 1.5 * load.max(0.02)
}

#[derive(Debug, Clone)]
struct Link {
    curve: [Vec3; 4],
    load: f32,
    color: u32,
    accumulator: f32,
}

#[derive(Debug, Clone, Copy)]
struct Pulse {
    handle: NodeHandle,
    link: usize,
    t: f32,
}

pub struct DeviceRing {
    rng: StdRng,
    core: Option<NodeHandle>,
    core_rotation: f32,
    links: Vec<Link>,
    pulses: Vec<Pulse>,
    pulses_spawned: u64,
    device_count: usize,
    max_throughput: f64,
}

impl std::fmt::Debug for DeviceRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRing")
            .field("links", &self.links.len())
            .field("pulses", &self.pulses.len())
            .finish_non_exhaustive()
    }
}

impl Default for DeviceRing {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl DeviceRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            core: None,
            core_rotation: 0.0,
            links: Vec::new(),
            pulses: Vec::new(),
            pulses_spawned: 0,
            device_count: 0,
            max_throughput: 0.0,
        }
    }

    pub fn live_pulses(&self) -> usize {
        self.pulses.len()
    }

    pub fn pulses_spawned(&self) -> u64 {
        self.pulses_spawned
    }

    pub fn core_rotation(&self) -> f32 {
        self.core_rotation
    }

    fn spawn_pulses(&mut self, scene: &mut SceneBuilder<'_>, dt: f32) {
        for index in 0..self.links.len() {
            let link = &mut self.links[index];
            link.accumulator += pulse_rate(link.load) * dt;
            let color = link.color;
            while self.links[index].accumulator >= 1.0 {
                self.links[index].accumulator -= 1.0;
                let t = self.rng.gen_range(0.0..0.2);
                let handle = scene.spawn(
                    Layer::Dynamic,
                    SceneNode::new(Shape::Sphere {
                        radius: PULSE_RADIUS,
                    })
                    .color(color)
                    .at(cubic_bezier(&self.links[index].curve, t)),
                );
                self.pulses.push(Pulse {
                    handle,
                    link: index,
                    t,
                });
                self.pulses_spawned += 1;
            }
        }
    }

    fn advance_pulses(&mut self, scene: &mut SceneBuilder<'_>, dt: f32) {
        let links = &self.links;
        let mut finished = Vec::new();
        for pulse in &mut self.pulses {
            let Some(link) = links.get(pulse.link) else {
                finished.push(pulse.handle);
                continue;
            };
            pulse.t += pulse_speed(link.load) * dt;
            if pulse.t >= 1.0 {
                finished.push(pulse.handle);
            } else if let Some(node) = scene.node_mut(pulse.handle) {
                node.position = cubic_bezier(&link.curve, pulse.t);
            }
        }
        self.pulses.retain(|p| !finished.contains(&p.handle));
        for handle in finished {
            scene.release(handle);
        }
    }
}

impl Visualization for DeviceRing {
    fn id(&self) -> OverlayId {
        OverlayId::Devices
    }

    fn endpoint(&mut self, _selected_pid: Option<u32>) -> Option<FetchRequest> {
        Some(FetchRequest::new("/api/devices-realtime"))
    }

    fn build_scene(&mut self, scene: &mut SceneBuilder<'_>) {
        let core = scene.spawn(
            Layer::Static,
            SceneNode::new(Shape::Sphere { radius: 0.7 })
                .color(0x2b3340)
                .with_meta(NodeMeta::new("kernel core")),
        );
        for (name, position) in SUBSYSTEMS {
            if name == "kernel" {
                continue;
            }
            scene.spawn(
                Layer::Static,
                SceneNode::new(Shape::Ring { radius: 0.25 })
                    .color(0x6a7583)
                    .at(position.extend(0.0))
                    .child_of(core)
                    .with_meta(NodeMeta::new(name).line("kernel subsystem")),
            );
            scene.spawn(
                Layer::Static,
                SceneNode::new(Shape::Label {
                    text: name.to_string(),
                    size: 11.0,
                })
                .color(0x8f9499)
                .at(Vec3::new(position.x + 0.3, position.y, 0.0))
                .child_of(core),
            );
        }
        self.core = Some(core);
    }

    fn apply_telemetry(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        payload: &Value,
    ) -> Result<(), TelemetryError> {
        let payload: DevicesPayload = decode(payload)?;
        scene.release_layer(Layer::Dynamic);
        self.links.clear();
        self.pulses.clear();

        let count = payload.devices.len();
        for (index, device) in payload.devices.iter().enumerate() {
            let load = device.load_norm.clamp(0.0, 1.0);
            let color = device_color(&device.kind);
            let position = ring_position(index, count);

            scene.spawn(
                Layer::Dynamic,
                SceneNode::new(Shape::Sphere {
                    radius: 0.35 + 0.12 * load,
                })
                .color(color)
                .opacity(0.2 + 0.18 * load)
                .at(position.extend(-0.05)),
            );
            scene.spawn(
                Layer::Dynamic,
                SceneNode::new(Shape::Sphere {
                    radius: 0.2 + 0.1 * load,
                })
                .color(color)
                .at(position.extend(0.0))
                .with_meta(
                    NodeMeta::new(device.name.clone())
                        .line(format!("type: {}", device.kind))
                        .line(format!("load: {:.0}%", load * 100.0))
                        .line(format!("throughput: {:.0} B/s", device.throughput_bps)),
                ),
            );

            let targets: Vec<&str> = if device.targets.is_empty() {
                vec!["kernel"]
            } else {
                device.targets.iter().map(String::as_str).collect()
            };
            for target in targets {
                let to_net = target.eq_ignore_ascii_case("net");
                let curve = link_curve(position, subsystem_target(target), to_net);
                let points = (0..=BEZIER_SAMPLES)
                    .map(|i| cubic_bezier(&curve, i as f32 / BEZIER_SAMPLES as f32))
                    .collect();
                scene.spawn(
                    Layer::Dynamic,
                    SceneNode::new(Shape::Path { points, width: 1.0 })
                        .color(color)
                        .opacity(0.35 + 0.4 * load),
                );
                self.links.push(Link {
                    curve,
                    load,
                    color,
                    accumulator: 0.0,
                });
            }
        }

        self.device_count = if payload.meta.count > 0 {
            payload.meta.count as usize
        } else {
            count
        };
        self.max_throughput = if payload.meta.max_throughput_bps > 0.0 {
            payload.meta.max_throughput_bps
        } else {
            payload
                .devices
                .iter()
                .map(|d| d.throughput_bps)
                .fold(0.0, f64::max)
        };
        Ok(())
    }

    fn update(&mut self, scene: &mut SceneBuilder<'_>, step: FrameStep) {
        self.core_rotation += CORE_SPIN * step.dt;
        if let Some(node) = self.core.and_then(|h| scene.node_mut(h)) {
            node.rotation.z = self.core_rotation;
        }
        self.spawn_pulses(scene, step.dt);
        self.advance_pulses(scene, step.dt);
    }

    fn projection(&self, elapsed: f32) -> Projection {
        let phase = 0.2 * elapsed;
        Projection::Perspective(Viewpoint::looking_at(
            Vec3::new(phase.sin() * 0.9, 0.0, 16.0 + phase.cos() * 0.3),
            Vec3::ZERO,
        ))
    }

    fn readout(&self) -> Vec<String> {
        vec![format!(
            "devices: {}, max {:.0} B/s",
            self.device_count, self.max_throughput
        )]
    }

    fn clear_cached(&mut self) {
        self.core = None;
        self.core_rotation = 0.0;
        self.links.clear();
        self.pulses.clear();
        self.pulses_spawned = 0;
        self.device_count = 0;
        self.max_throughput = 0.0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
