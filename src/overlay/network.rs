//! Network stack overlay
//!
//! Seven horizontal layers from userspace down to the NIC. A packet falls
//! through them at the telemetry-reported speed; retransmits spawn ghost
//! packets at the TCP layer and drops burst at netfilter. Effects are dynamic
//! nodes with a time-to-live and are released from the arena on expiry.

use std::any::Any;

use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use super::{OverlayId, SceneBuilder, Visualization};
use crate::animation::FrameStep;
use crate::error::TelemetryError;
use crate::scene::{hex, Layer, NodeHandle, NodeMeta, Projection, SceneNode, Shape, Viewpoint};
use crate::telemetry::payload::{decode, FlowInfo, LayerMetrics, NetworkPayload, NetworkSignals};
use crate::telemetry::FetchRequest;

#[derive(Debug, Clone, Copy)]
struct StackLayer {
    name: &'static str,
    y: f32,
    color: u32,
}

const LAYERS: [StackLayer; 7] = [
    StackLayer { name: "userspace", y: 3.5, color: 0x78838f },
    StackLayer { name: "socket", y: 2.35, color: 0x6f7d8a },
    StackLayer { name: "tcp", y: 1.2, color: 0x6d7a88 },
    StackLayer { name: "ip", y: 0.05, color: 0x6a7583 },
    StackLayer { name: "netfilter", y: -1.1, color: 0x68717e },
    StackLayer { name: "driver", y: -2.25, color: 0x646c78 },
    StackLayer { name: "nic", y: -3.4, color: 0x606772 },
];

const USERSPACE_Y: f32 = 3.5;
const TCP_Y: f32 = 1.2;
const NETFILTER_Y: f32 = -1.1;
const NIC_Y: f32 = -3.4;

const PACKET_TOP: f32 = USERSPACE_Y + 0.5;
const PACKET_BOTTOM: f32 = NIC_Y - 0.75;
const TCP_WINDOW: f32 = 0.08;

const RETRANSMIT_COOLDOWN: f32 = 1.4;
const DROP_COOLDOWN: f32 = 1.8;

const GHOST_RADIUS: f32 = 0.14;
const GHOST_TTL: f32 = 0.65;
const GHOST_DRIFT_X: f32 = 0.405;
const GHOST_FALL: f32 = 0.25;
const GHOST_COLOR: u32 = 0x58b6d8;

const BURST_RADIUS: f32 = 0.36;
const BURST_TTL: f32 = 0.55;
const BURST_GROWTH: f32 = 2.1;
const BURST_COLOR: u32 = 0xff4d4d;

const UDP_COLOR: u32 = 0x58b6d8;
const TCP_COLOR: u32 = 0xe6c15a;

const SLAB_SIZE: Vec2 = Vec2::new(7.0, 0.8);

/// Probabilities and speed driving the packet animation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketSignals {
    pub drop: f64,
    pub retransmit: f64,
    pub speed: f32,
}

impl Default for PacketSignals {
    fn default() -> Self {
        Self {
            drop: 0.2,
            retransmit: 0.28,
            speed: 2.2,
        }
    }
}

fn clamped(value: Option<f64>, default: f64, lo: f64, hi: f64) -> f64 {
    value
        .filter(|v| v.is_finite())
        .unwrap_or(default)
        .clamp(lo, hi)
}

impl From<&NetworkSignals> for PacketSignals {
    fn from(signals: &NetworkSignals) -> Self {
        let defaults = PacketSignals::default();
        Self {
            drop: clamped(signals.drop_probability, defaults.drop, 0.03, 0.75),
            retransmit: clamped(signals.retransmit_probability, defaults.retransmit, 0.04, 0.75),
            speed: clamped(signals.packet_speed, f64::from(defaults.speed), 1.1, 5.2) as f32,
        }
    }
}

/// Per-layer stat line, top to bottom
pub fn layer_stats(metrics: &LayerMetrics, speed: f32) -> [String; 7] {
    let driver = &metrics.driver;
    [
        format!("Userspace: procs {}", metrics.userspace.active_processes),
        format!("Socket API: sockets {}", metrics.socket_api.active_sockets),
        format!(
            "TCP/UDP: established {}, retrans/s {:.1}",
            metrics.tcp_udp.established, metrics.tcp_udp.retrans_per_sec
        ),
        format!(
            "IP: in {:.0}/s, out {:.0}/s",
            metrics.ip.in_packets_per_sec, metrics.ip.out_packets_per_sec
        ),
        format!(
            "Netfilter: drop/s {:.1}, drop% {:.2}",
            metrics.netfilter.drop_per_sec,
            metrics.netfilter.drop_ratio * 100.0
        ),
        format!(
            "Driver: {} rx {:.2}MB/s tx {:.2}MB/s",
            driver.iface.as_deref().unwrap_or("-"),
            driver.rx_mb_s,
            driver.tx_mb_s
        ),
        format!(
            "NIC: err rx {} tx {} | speed {speed:.1}",
            metrics.nic.rx_errors, metrics.nic.tx_errors
        ),
    ]
}

pub fn flow_text(flow: Option<&FlowInfo>) -> String {
    match flow {
        Some(flow) => format!(
            "process -> syscall -> socket -> {} {} -> IP -> NIC -> wire -> {}",
            flow.kind.as_deref().unwrap_or("tcp").to_uppercase(),
            flow.state_name.as_deref().unwrap_or("-"),
            flow.remote.as_deref().unwrap_or("?")
        ),
        None => "process -> syscall -> socket -> TCP/UDP -> IP -> NIC -> wire (no active flow)"
            .to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EffectKind {
    Ghost,
    Burst,
}

#[derive(Debug, Clone, Copy)]
struct Effect {
    handle: NodeHandle,
    kind: EffectKind,
    ttl: f32,
    velocity: Vec3,
}

pub struct NetworkStack {
    rng: StdRng,
    slabs: Vec<NodeHandle>,
    labels: Vec<NodeHandle>,
    packet: Option<NodeHandle>,
    packet_y: f32,
    signals: PacketSignals,
    retransmit_cooldown: f32,
    drop_cooldown: f32,
    effects: Vec<Effect>,
    flow: String,
    udp: bool,
    drops: u64,
    retransmits: u64,
}

impl std::fmt::Debug for NetworkStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStack")
            .field("packet_y", &self.packet_y)
            .field("signals", &self.signals)
            .field("effects", &self.effects.len())
            .finish_non_exhaustive()
    }
}

impl Default for NetworkStack {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl NetworkStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic drop/retransmit rolls
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            slabs: Vec::new(),
            labels: Vec::new(),
            packet: None,
            packet_y: PACKET_TOP,
            signals: PacketSignals::default(),
            retransmit_cooldown: 0.0,
            drop_cooldown: 0.0,
            effects: Vec::new(),
            flow: flow_text(None),
            udp: false,
            drops: 0,
            retransmits: 0,
        }
    }

    pub fn signals(&self) -> PacketSignals {
        self.signals
    }

    pub fn packet_y(&self) -> f32 {
        self.packet_y
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    fn packet_position(&self) -> Vec3 {
        Vec3::new(0.0, self.packet_y, 0.3)
    }

    fn spawn_effect(&mut self, scene: &mut SceneBuilder<'_>, kind: EffectKind, velocity: Vec3) {
        let (radius, color, ttl) = match kind {
            EffectKind::Ghost => (GHOST_RADIUS, GHOST_COLOR, GHOST_TTL),
            EffectKind::Burst => (BURST_RADIUS, BURST_COLOR, BURST_TTL),
        };
        let handle = scene.spawn(
            Layer::Dynamic,
            SceneNode::new(Shape::Sphere { radius })
                .color(color)
                .at(self.packet_position()),
        );
        self.effects.push(Effect {
            handle,
            kind,
            ttl,
            velocity,
        });
    }

    fn spawn_ghosts(&mut self, scene: &mut SceneBuilder<'_>) {
        for dir in [-1.0, 1.0] {
            self.spawn_effect(
                scene,
                EffectKind::Ghost,
                Vec3::new(dir * GHOST_DRIFT_X, -GHOST_FALL, 0.0),
            );
        }
        self.retransmits += 1;
    }

    fn spawn_burst(&mut self, scene: &mut SceneBuilder<'_>) {
        self.spawn_effect(scene, EffectKind::Burst, Vec3::ZERO);
        self.drops += 1;
    }

    fn advance_packet(&mut self, scene: &mut SceneBuilder<'_>, dt: f32) {
        let previous = self.packet_y;
        self.packet_y -= self.signals.speed * dt;
        self.retransmit_cooldown = (self.retransmit_cooldown - dt).max(0.0);
        self.drop_cooldown = (self.drop_cooldown - dt).max(0.0);

        let near_tcp = (self.packet_y - TCP_Y).abs() < TCP_WINDOW;
        let crossed_tcp = previous > TCP_Y && self.packet_y <= TCP_Y;
        if (near_tcp || crossed_tcp) && self.retransmit_cooldown <= 0.0 {
            self.retransmit_cooldown = RETRANSMIT_COOLDOWN;
            if self.rng.gen_bool(self.signals.retransmit) {
                self.spawn_ghosts(scene);
            }
        }

        let crossed_netfilter = previous > NETFILTER_Y && self.packet_y <= NETFILTER_Y;
        if crossed_netfilter && self.drop_cooldown <= 0.0 {
            self.drop_cooldown = DROP_COOLDOWN;
            if self.rng.gen_bool(self.signals.drop) {
                self.spawn_burst(scene);
                self.packet_y = PACKET_TOP;
            }
        }

        if self.packet_y < PACKET_BOTTOM {
            self.packet_y = PACKET_TOP;
        }

        let position = self.packet_position();
        if let Some(node) = self.packet.and_then(|h| scene.node_mut(h)) {
            node.position = position;
        }
    }

    fn advance_effects(&mut self, scene: &mut SceneBuilder<'_>, dt: f32) {
        let mut expired = Vec::new();
        for effect in &mut self.effects {
            effect.ttl -= dt;
            if effect.ttl <= 0.0 {
                expired.push(effect.handle);
                continue;
            }
            if let Some(node) = scene.node_mut(effect.handle) {
                node.position += effect.velocity * dt;
                node.opacity = (effect.ttl * 1.2).clamp(0.0, 1.0);
                if effect.kind == EffectKind::Burst {
                    node.scale = 1.0 + (BURST_TTL - effect.ttl) * BURST_GROWTH;
                }
            }
        }
        self.effects.retain(|e| e.ttl > 0.0);
        for handle in expired {
            scene.release(handle);
        }
    }
}

impl Visualization for NetworkStack {
    fn id(&self) -> OverlayId {
        OverlayId::Network
    }

    fn endpoint(&mut self, _selected_pid: Option<u32>) -> Option<FetchRequest> {
        Some(FetchRequest::new("/api/network-stack-realtime"))
    }

    fn build_scene(&mut self, scene: &mut SceneBuilder<'_>) {
        for layer in LAYERS {
            let slab = scene.spawn(
                Layer::Static,
                SceneNode::new(Shape::Frame { size: SLAB_SIZE })
                    .color(layer.color)
                    .at(Vec3::new(0.0, layer.y, 0.0))
                    .with_meta(NodeMeta::new(layer.name).line("waiting for telemetry")),
            );
            let label = scene.spawn(
                Layer::Static,
                SceneNode::new(Shape::Label {
                    text: layer.name.to_string(),
                    size: 12.0,
                })
                .color(0xc8ccd4)
                .at(Vec3::new(-SLAB_SIZE.x * 0.5 + 0.15, layer.y + 0.2, 0.0)),
            );
            self.slabs.push(slab);
            self.labels.push(label);
        }
        self.packet_y = PACKET_TOP;
        self.packet = Some(scene.spawn(
            Layer::Static,
            SceneNode::new(Shape::Sphere { radius: 0.22 })
                .color(TCP_COLOR)
                .at(self.packet_position()),
        ));
    }

    fn apply_telemetry(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        payload: &Value,
    ) -> Result<(), TelemetryError> {
        let payload: NetworkPayload = decode(payload)?;
        self.signals = PacketSignals::from(&payload.signals);
        self.flow = flow_text(payload.flow.as_ref());
        self.udp = payload
            .flow
            .as_ref()
            .and_then(|f| f.kind.as_deref())
            .is_some_and(|k| k.eq_ignore_ascii_case("udp"));

        let stats = layer_stats(&payload.layer_metrics, self.signals.speed);
        for ((layer, stat), (slab, label)) in LAYERS
            .iter()
            .zip(stats)
            .zip(self.slabs.iter().zip(&self.labels))
        {
            if let Some(node) = scene.node_mut(*slab) {
                node.meta = Some(NodeMeta::new(layer.name).line(stat.clone()));
            }
            if let Some(node) = scene.node_mut(*label) {
                node.shape = Shape::Label {
                    text: stat,
                    size: 12.0,
                };
            }
        }

        let color = if self.udp { UDP_COLOR } else { TCP_COLOR };
        if let Some(node) = self.packet.and_then(|h| scene.node_mut(h)) {
            node.color = hex(color);
        }
        Ok(())
    }

    fn update(&mut self, scene: &mut SceneBuilder<'_>, step: FrameStep) {
        self.advance_packet(scene, step.dt);
        self.advance_effects(scene, step.dt);
    }

    fn projection(&self, elapsed: f32) -> Projection {
        let phase = 0.25 * elapsed;
        Projection::Perspective(Viewpoint::looking_at(
            Vec3::new(phase.sin() * 0.9, 0.0, 13.2 + phase.cos() * 0.35),
            Vec3::ZERO,
        ))
    }

    fn readout(&self) -> Vec<String> {
        vec![
            self.flow.clone(),
            format!(
                "drop p {:.2} | retransmit p {:.2} | speed {:.1} | drops {} | retransmits {}",
                self.signals.drop,
                self.signals.retransmit,
                self.signals.speed,
                self.drops,
                self.retransmits
            ),
        ]
    }

    fn clear_cached(&mut self) {
        self.slabs.clear();
        self.labels.clear();
        self.packet = None;
        self.effects.clear();
        self.packet_y = PACKET_TOP;
        self.retransmit_cooldown = 0.0;
        self.drop_cooldown = 0.0;
        self.signals = PacketSignals::default();
        self.flow = flow_text(None);
        self.udp = false;
        self.drops = 0;
        self.retransmits = 0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Generation, ResourceArena};
    use serde_json::json;

    fn built() -> (NetworkStack, ResourceArena, Generation) {
        let mut arena = ResourceArena::new();
        let generation = arena.begin_generation();
        let mut net = NetworkStack::seeded(7);
        net.build_scene(&mut SceneBuilder::new(&mut arena, OverlayId::Network, generation));
        (net, arena, generation)
    }

    #[test]
    fn test_signals_are_clamped() {
        let signals = NetworkSignals {
            drop_probability: Some(0.9),
            retransmit_probability: None,
            packet_speed: Some(0.5),
        };
        let packet = PacketSignals::from(&signals);
        assert_eq!(packet.drop, 0.75);
        assert_eq!(packet.retransmit, 0.28);
        assert_eq!(packet.speed, 1.1);

        let nan = NetworkSignals {
            drop_probability: Some(f64::NAN),
            ..NetworkSignals::default()
        };
        assert_eq!(PacketSignals::from(&nan).drop, 0.2);
    }

    #[test]
    fn test_layer_stats_text() {
        let metrics: LayerMetrics = decode(&json!({
            "userspace": { "active_processes": 212 },
            "tcp_udp": { "established": 14, "retrans_per_sec": 0.5 },
            "netfilter": { "drop_per_sec": 1.0, "drop_ratio": 0.0123 },
            "driver": { "iface": "eth0", "rx_mb_s": 1.5, "tx_mb_s": 0.25 },
            "nic": { "rx_errors": 2, "tx_errors": 0 }
        }))
        .unwrap();
        let stats = layer_stats(&metrics, 2.2);
        assert_eq!(stats[0], "Userspace: procs 212");
        assert_eq!(stats[2], "TCP/UDP: established 14, retrans/s 0.5");
        assert_eq!(stats[4], "Netfilter: drop/s 1.0, drop% 1.23");
        assert_eq!(stats[5], "Driver: eth0 rx 1.50MB/s tx 0.25MB/s");
        assert_eq!(stats[6], "NIC: err rx 2 tx 0 | speed 2.2");
    }

    #[test]
    fn test_flow_text() {
        let flow = FlowInfo {
            kind: Some("udp".into()),
            state_name: Some("ESTABLISHED".into()),
            remote: Some("10.0.0.5:53".into()),
        };
        assert_eq!(
            flow_text(Some(&flow)),
            "process -> syscall -> socket -> UDP ESTABLISHED -> IP -> NIC -> wire -> 10.0.0.5:53"
        );
        assert!(flow_text(None).ends_with("(no active flow)"));
    }

    #[test]
    fn test_udp_flow_recolors_packet() {
        let (mut net, mut arena, g) = built();
        net.apply_telemetry(
            &mut SceneBuilder::new(&mut arena, OverlayId::Network, g),
            &json!({ "flow": { "type": "UDP" }, "signals": { "packet_speed": 3.0 } }),
        )
        .unwrap();
        let packet = arena.get(net.packet.unwrap()).unwrap();
        assert_eq!(packet.color, hex(UDP_COLOR));
        assert_eq!(net.signals().speed, 3.0);
    }

    #[test]
    fn test_packet_motion_depends_on_elapsed_time_only() {
        let (mut fine, mut arena_a, ga) = built();
        let (mut coarse, mut arena_b, gb) = built();
        for _ in 0..10 {
            let mut scene = SceneBuilder::new(&mut arena_a, OverlayId::Network, ga);
            fine.advance_packet(&mut scene, 0.016);
        }
        for _ in 0..4 {
            let mut scene = SceneBuilder::new(&mut arena_b, OverlayId::Network, gb);
            coarse.advance_packet(&mut scene, 0.04);
        }
        assert!((fine.packet_y() - coarse.packet_y()).abs() < 1e-4);
        assert!((fine.packet_y() - (PACKET_TOP - 2.2 * 0.16)).abs() < 1e-4);
    }

    #[test]
    fn test_packet_wraps_to_top() {
        let (mut net, mut arena, g) = built();
        for _ in 0..500 {
            net.advance_packet(&mut SceneBuilder::new(&mut arena, OverlayId::Network, g), 0.04);
            assert!(net.packet_y() >= PACKET_BOTTOM && net.packet_y() <= PACKET_TOP);
        }
    }

    #[test]
    fn test_expired_effects_are_released() {
        let (mut net, mut arena, g) = built();
        let baseline = arena.live_in(g);
        {
            let mut scene = SceneBuilder::new(&mut arena, OverlayId::Network, g);
            net.spawn_burst(&mut scene);
            net.spawn_ghosts(&mut scene);
        }
        assert_eq!(arena.live_in(g), baseline + 3);

        for _ in 0..6 {
            net.advance_effects(&mut SceneBuilder::new(&mut arena, OverlayId::Network, g), 0.1);
        }
        // ghosts outlive the burst
        assert_eq!(net.effect_count(), 2);
        assert_eq!(arena.live_in(g), baseline + 2);

        for _ in 0..2 {
            net.advance_effects(&mut SceneBuilder::new(&mut arena, OverlayId::Network, g), 0.1);
        }
        assert_eq!(net.effect_count(), 0);
        assert_eq!(arena.live_in(g), baseline);
    }
}
