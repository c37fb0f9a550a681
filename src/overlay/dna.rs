//! Double-helix overlay
//!
//! Kernel mode samples up to 30 nucleotides per strand from the kernel DNA
//! endpoint and decorates the helix with gene tracks and pulsing mutation
//! markers. Process mode reads the selected process's timeline, maps each
//! event to a nucleotide and grows the helix over time.

use std::any::Any;
use std::f32::consts::TAU;

use glam::Vec3;
use serde_json::Value;

use super::{sample_indices, OverlayId, SceneBuilder, Visualization};
use crate::animation::FrameStep;
use crate::error::TelemetryError;
use crate::scene::{
    Layer, NodeHandle, NodeMeta, Projection, ResourceArena, SceneNode, Shape, Viewpoint,
};
use crate::telemetry::payload::{decode, KernelDnaPayload, TimelinePayload};
use crate::telemetry::FetchRequest;

pub const MAX_PER_STRAND: usize = 30;

const HELIX_RADIUS: f32 = 2.0;
const HELIX_HEIGHT: f32 = 20.0;
const HELIX_TURNS: f32 = 3.0;
const HELIX_SEGMENTS: usize = 200;
const GENE_MARKERS: usize = 20;
const GENE_TRACK_RADIUS: f32 = 2.6;

const SPIN_RATE: f32 = 0.3;
const ORBIT_RADIUS: f32 = 15.0;
const ORBIT_RATE: f32 = 0.5;

const GROWTH_RATE: f32 = 0.5;
const GROWTH_START: f32 = 4.0;
const GROWTH_MAX: f32 = 30.0;

const LEFT_STRAND: u32 = 0x4a9eff;
const RIGHT_STRAND: u32 = 0x58b6d8;
const MUTATION: u32 = 0xff3b3b;
const RUNG: u32 = 0x8a94a3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nucleotide {
    A,
    T,
    C,
    G,
}

impl Nucleotide {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "T" => Nucleotide::T,
            "C" => Nucleotide::C,
            "G" => Nucleotide::G,
            _ => Nucleotide::A,
        }
    }

    pub fn complement(self) -> Self {
        match self {
            Nucleotide::A => Nucleotide::T,
            Nucleotide::T => Nucleotide::A,
            Nucleotide::C => Nucleotide::G,
            Nucleotide::G => Nucleotide::C,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Nucleotide::A => 'A',
            Nucleotide::T => 'T',
            Nucleotide::C => 'C',
            Nucleotide::G => 'G',
        }
    }

    /// Kernel event class the code stands for
    pub fn kind(self) -> &'static str {
        match self {
            Nucleotide::A => "syscall",
            Nucleotide::T => "interrupt",
            Nucleotide::C => "context_switch",
            Nucleotide::G => "lock",
        }
    }

    fn shape(self) -> Shape {
        match self {
            Nucleotide::A => Shape::Sphere { radius: 0.2 },
            Nucleotide::T => Shape::Cuboid { size: 0.3 },
            Nucleotide::C => Shape::Cone {
                radius: 0.15,
                height: 0.4,
            },
            Nucleotide::G => Shape::Octahedron { radius: 0.2 },
        }
    }

    fn color(self) -> u32 {
        match self {
            Nucleotide::A => 0x58b6d8,
            Nucleotide::T => 0xff6b9d,
            Nucleotide::C => 0x6bcf7f,
            Nucleotide::G => 0xffa94d,
        }
    }
}

pub fn gene_color(name: &str) -> u32 {
    match name.to_ascii_lowercase().as_str() {
        "sched" => 0x58b6d8,
        "net" => 0x4a9eff,
        "fs" => 0x6bcf7f,
        "mm" => 0xffa94d,
        "drivers" => 0xff6b9d,
        _ => 0xc8ccd4,
    }
}

/// Process event to nucleotide code
pub fn event_nucleotide(event: &str) -> Nucleotide {
    match event {
        "exit" => Nucleotide::C,
        _ => Nucleotide::A,
    }
}

pub fn event_subsystem(event: &str) -> &'static str {
    match event {
        "exec" | "fork" | "exit" => "sched",
        "mmap" => "mm",
        "read" | "write" => "fs",
        "connect" | "accept" => "net",
        _ => "kernel",
    }
}

/// Kernel source location shown in tooltips
pub fn source_path(name: &str, kind: &str) -> &'static str {
    match name {
        "read" | "write" => "fs/read_write.c",
        "exec" | "execve" => "fs/exec.c",
        "fork" | "clone" => "kernel/fork.c",
        "exit" => "kernel/exit.c",
        "mmap" => "mm/mmap.c",
        "connect" | "accept" => "net/socket.c",
        _ => match kind {
            "interrupt" => "kernel/irq/",
            "context_switch" => "kernel/sched/core.c",
            "lock" => "kernel/locking/",
            _ => "kernel/sys.c",
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnaMode {
    /// Kernel-wide nucleotides, genes and mutations
    Kernel,
    /// Events of the selected process
    Process,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Track {
    Left,
    Right,
    Gene,
    Axis,
}

#[derive(Debug, Clone, Copy)]
struct Placed {
    handle: NodeHandle,
    t: f32,
    track: Track,
}

fn track_point(t: f32, height: f32, track: Track) -> Vec3 {
    let angle = t * HELIX_TURNS * TAU;
    let y = t * height - height * 0.5;
    let (c, s) = (angle.cos(), angle.sin());
    match track {
        Track::Left => Vec3::new(-HELIX_RADIUS * c, y, HELIX_RADIUS * s),
        Track::Right => Vec3::new(HELIX_RADIUS * c, y, -HELIX_RADIUS * s),
        Track::Gene => Vec3::new(-GENE_TRACK_RADIUS * c, y, GENE_TRACK_RADIUS * s),
        Track::Axis => Vec3::new(0.0, y, 0.0),
    }
}

fn backbone(height: f32, track: Track) -> Vec<Vec3> {
    (0..=HELIX_SEGMENTS)
        .map(|i| track_point(i as f32 / HELIX_SEGMENTS as f32, height, track))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Summary {
    nucleotides: usize,
    genes: usize,
    mutations: usize,
    events: usize,
}

#[derive(Debug)]
pub struct KernelDna {
    mode: DnaMode,
    pid: Option<u32>,
    root: Option<NodeHandle>,
    backbones: Option<[NodeHandle; 2]>,
    placed: Vec<Placed>,
    rungs: Vec<(NodeHandle, f32)>,
    mutations: Vec<NodeHandle>,
    rotation: f32,
    height: f32,
    summary: Summary,
}

impl KernelDna {
    pub fn new(mode: DnaMode) -> Self {
        Self {
            mode,
            pid: None,
            root: None,
            backbones: None,
            placed: Vec::new(),
            rungs: Vec::new(),
            mutations: Vec::new(),
            rotation: 0.0,
            height: Self::initial_height(mode),
            summary: Summary::default(),
        }
    }

    fn initial_height(mode: DnaMode) -> f32 {
        match mode {
            DnaMode::Kernel => HELIX_HEIGHT,
            DnaMode::Process => GROWTH_START,
        }
    }

    pub fn mode(&self) -> DnaMode {
        self.mode
    }

    /// Helix rotation about its axis, radians
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Live nucleotide nodes on the (left, right) strands
    pub fn strand_counts(&self, arena: &ResourceArena) -> (usize, usize) {
        let count = |track: Track| {
            self.placed
                .iter()
                .filter(|p| p.track == track && arena.is_live(p.handle))
                .count()
        };
        (count(Track::Left), count(Track::Right))
    }

    fn spin_rate(&self) -> f32 {
        match self.mode {
            DnaMode::Kernel => SPIN_RATE,
            DnaMode::Process => -SPIN_RATE,
        }
    }

    fn clear_dynamic(&mut self, scene: &mut SceneBuilder<'_>) {
        scene.release_layer(Layer::Dynamic);
        self.placed.clear();
        self.rungs.clear();
        self.mutations.clear();
    }

    fn spawn_pair(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        t: f32,
        left: (Nucleotide, NodeMeta),
        right: (Nucleotide, NodeMeta),
    ) {
        let Some(root) = self.root else { return };
        for ((code, meta), track) in [(left, Track::Left), (right, Track::Right)] {
            let handle = scene.spawn(
                Layer::Dynamic,
                SceneNode::new(code.shape())
                    .color(code.color())
                    .child_of(root)
                    .with_meta(meta),
            );
            self.placed.push(Placed { handle, t, track });
        }
        let rung = scene.spawn(
            Layer::Dynamic,
            SceneNode::new(Shape::Path {
                points: Vec::new(),
                width: 1.0,
            })
            .color(RUNG)
            .opacity(0.6)
            .child_of(root),
        );
        self.rungs.push((rung, t));
    }

    fn apply_kernel(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        payload: &Value,
    ) -> Result<(), TelemetryError> {
        let payload: KernelDnaPayload = decode(payload)?;
        self.clear_dynamic(scene);
        let Some(root) = self.root else {
            return Ok(());
        };

        let picks = sample_indices(payload.nucleotides.len(), MAX_PER_STRAND);
        let slots = picks.len().max(1) as f32;
        for (slot, &index) in picks.iter().enumerate() {
            let info = &payload.nucleotides[index];
            let code = Nucleotide::from_code(&info.code);
            let partner = code.complement();
            let kind = info.kind.clone().unwrap_or_else(|| code.kind().to_string());
            let subsystem = info.subsystem.clone().unwrap_or_else(|| "kernel".into());
            let meta = |c: Nucleotide, kind: &str| {
                NodeMeta::new(format!("{} - {}", c.letter(), kind.to_uppercase()))
                    .line(info.name.clone())
                    .line(format!("count: {}", info.count))
                    .line(format!("subsystem: {subsystem}"))
                    .line(format!("source: {}", source_path(&info.name, kind)))
            };
            let t = (slot as f32 + 0.5) / slots;
            let partner_meta = meta(partner, partner.kind());
            self.spawn_pair(scene, t, (code, meta(code, &kind)), (partner, partner_meta));
        }

        let span = payload.nucleotides.len().max(1) as f32;
        let fraction = |v: f32| (if v > 1.0 { v / span } else { v }).clamp(0.0, 1.0);

        for gene in &payload.genes {
            let (start, end) = (fraction(gene.start), fraction(gene.end));
            let group = scene.spawn(
                Layer::Dynamic,
                SceneNode::group().child_of(root).with_meta(
                    NodeMeta::new(format!("gene {}", gene.name))
                        .line(format!("span: {:.0}%-{:.0}%", start * 100.0, end * 100.0)),
                ),
            );
            for k in 0..GENE_MARKERS {
                let t = start + (end - start) * k as f32 / (GENE_MARKERS - 1) as f32;
                let handle = scene.spawn(
                    Layer::Dynamic,
                    SceneNode::new(Shape::Sphere { radius: 0.1 })
                        .color(gene_color(&gene.name))
                        .opacity(0.8)
                        .child_of(group)
                        .pickable(),
                );
                self.placed.push(Placed {
                    handle,
                    t,
                    track: Track::Gene,
                });
            }
        }

        for mutation in &payload.mutations {
            let t = fraction(mutation.position);
            let kind = mutation.kind.clone().unwrap_or_else(|| "unknown".into());
            let handle = scene.spawn(
                Layer::Dynamic,
                SceneNode::new(Shape::Sphere { radius: 0.5 })
                    .color(MUTATION)
                    .opacity(0.7)
                    .child_of(root)
                    .with_meta(
                        NodeMeta::new("MUTATION")
                            .line(format!("type: {kind}"))
                            .line(format!("position: {:.0}%", t * 100.0)),
                    ),
            );
            self.placed.push(Placed {
                handle,
                t,
                track: Track::Axis,
            });
            self.mutations.push(handle);
        }

        self.summary = Summary {
            nucleotides: picks.len(),
            genes: payload.genes.len(),
            mutations: payload.mutations.len(),
            events: 0,
        };
        self.layout(scene);
        Ok(())
    }

    fn apply_process(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        payload: &Value,
    ) -> Result<(), TelemetryError> {
        let payload: TimelinePayload = decode(payload)?;
        self.clear_dynamic(scene);

        let picks = sample_indices(payload.timeline.len(), MAX_PER_STRAND);
        let slots = picks.len().max(1) as f32;
        for (slot, &index) in picks.iter().enumerate() {
            let event = &payload.timeline[index];
            let code = event_nucleotide(&event.kind);
            let partner = code.complement();
            let subsystem = event_subsystem(&event.kind);
            let time = event
                .timestamp
                .as_ref()
                .map(|ts| ts.clock_time())
                .unwrap_or_else(|| "-".into());
            let meta = |c: Nucleotide| {
                NodeMeta::new(format!("{} - {}", c.letter(), event.kind.to_uppercase()))
                    .line(format!("time: {time}"))
                    .line(format!("count: {}", event.magnitude()))
                    .line(format!("subsystem: {subsystem}"))
                    .line(format!("source: {}", source_path(&event.kind, c.kind())))
            };
            let t = (slot as f32 + 0.5) / slots;
            self.spawn_pair(scene, t, (code, meta(code)), (partner, meta(partner)));
        }

        self.summary = Summary {
            nucleotides: picks.len(),
            events: payload.timeline.len(),
            ..Summary::default()
        };
        self.layout(scene);
        Ok(())
    }

    /// Position every placed node for the current helix height
    fn layout(&mut self, scene: &mut SceneBuilder<'_>) {
        let height = self.height;
        if let Some([left, right]) = self.backbones {
            for (handle, track) in [(left, Track::Left), (right, Track::Right)] {
                if let Some(node) = scene.node_mut(handle) {
                    node.shape = Shape::Path {
                        points: backbone(height, track),
                        width: 2.0,
                    };
                }
            }
        }
        for placed in &self.placed {
            if let Some(node) = scene.node_mut(placed.handle) {
                node.position = track_point(placed.t, height, placed.track);
            }
        }
        for &(rung, t) in &self.rungs {
            if let Some(node) = scene.node_mut(rung) {
                node.shape = Shape::Path {
                    points: vec![
                        track_point(t, height, Track::Left),
                        track_point(t, height, Track::Right),
                    ],
                    width: 1.0,
                };
            }
        }
    }
}

impl Visualization for KernelDna {
    fn id(&self) -> OverlayId {
        match self.mode {
            DnaMode::Kernel => OverlayId::Dna,
            DnaMode::Process => OverlayId::DnaTimeline,
        }
    }

    fn endpoint(&mut self, selected_pid: Option<u32>) -> Option<FetchRequest> {
        match self.mode {
            DnaMode::Kernel => Some(FetchRequest::new("/api/kernel-dna")),
            DnaMode::Process => {
                self.pid = selected_pid;
                let pid = selected_pid?;
                Some(FetchRequest::new(format!("/api/proc-timeline?pid={pid}")).keyed(pid))
            }
        }
    }

    fn build_scene(&mut self, scene: &mut SceneBuilder<'_>) {
        let root = scene.spawn(Layer::Static, SceneNode::group());
        let mut strand = |color: u32| {
            scene.spawn(
                Layer::Static,
                SceneNode::new(Shape::Path {
                    points: Vec::new(),
                    width: 2.0,
                })
                .color(color)
                .child_of(root),
            )
        };
        let left = strand(LEFT_STRAND);
        let right = strand(RIGHT_STRAND);
        self.root = Some(root);
        self.backbones = Some([left, right]);
        self.height = Self::initial_height(self.mode);
        self.layout(scene);
    }

    fn apply_telemetry(
        &mut self,
        scene: &mut SceneBuilder<'_>,
        payload: &Value,
    ) -> Result<(), TelemetryError> {
        match self.mode {
            DnaMode::Kernel => self.apply_kernel(scene, payload),
            DnaMode::Process => self.apply_process(scene, payload),
        }
    }

    fn update(&mut self, scene: &mut SceneBuilder<'_>, step: FrameStep) {
        self.rotation += self.spin_rate() * step.dt;
        if let Some(node) = self.root.and_then(|root| scene.node_mut(root)) {
            node.rotation.y = self.rotation;
        }

        let pulse = 1.0 + 0.3 * (3.0 * step.elapsed).sin();
        for &handle in &self.mutations {
            if let Some(node) = scene.node_mut(handle) {
                node.scale = pulse;
            }
        }

        if self.mode == DnaMode::Process && self.height < GROWTH_MAX {
            self.height = (self.height + GROWTH_RATE * step.dt).min(GROWTH_MAX);
            self.layout(scene);
        }
    }

    fn projection(&self, elapsed: f32) -> Projection {
        let viewpoint = match self.mode {
            DnaMode::Kernel => {
                let angle = ORBIT_RATE * elapsed;
                Viewpoint::looking_at(
                    Vec3::new(ORBIT_RADIUS * angle.sin(), 0.0, ORBIT_RADIUS * angle.cos()),
                    Vec3::ZERO,
                )
            }
            DnaMode::Process => Viewpoint::looking_at(Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO)
                .with_fov_degrees(75.0),
        };
        Projection::Perspective(viewpoint)
    }

    fn readout(&self) -> Vec<String> {
        match self.mode {
            DnaMode::Kernel => vec![format!(
                "nucleotides: {} | genes: {} | mutations: {}",
                self.summary.nucleotides, self.summary.genes, self.summary.mutations
            )],
            DnaMode::Process => {
                let pid = self.pid.map_or_else(|| "-".to_string(), |p| p.to_string());
                vec![format!(
                    "pid {pid}: {} events | helix {:.1}/{GROWTH_MAX:.0}",
                    self.summary.events, self.height
                )]
            }
        }
    }

    fn clear_cached(&mut self) {
        self.root = None;
        self.backbones = None;
        self.placed.clear();
        self.rungs.clear();
        self.mutations.clear();
        self.rotation = 0.0;
        self.height = Self::initial_height(self.mode);
        self.summary = Summary::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Generation;
    use serde_json::json;

    fn kernel_payload(n: usize) -> Value {
        let codes = ["A", "T", "C", "G"];
        let nucleotides: Vec<Value> = (0..n)
            .map(|i| json!({ "code": codes[i % 4], "name": format!("sys_{i}"), "count": i }))
            .collect();
        json!({
            "nucleotides": nucleotides,
            "genes": [{ "name": "sched", "start": 0.1, "end": 0.3 }],
            "mutations": [{ "position": 0.5, "type": "latency_spike" }]
        })
    }

    fn built(mode: DnaMode) -> (KernelDna, ResourceArena, Generation) {
        let mut arena = ResourceArena::new();
        let generation = arena.begin_generation();
        let mut dna = KernelDna::new(mode);
        dna.build_scene(&mut SceneBuilder::new(&mut arena, dna.id(), generation));
        (dna, arena, generation)
    }

    #[test]
    fn test_strands_capped_at_thirty() {
        let (mut dna, mut arena, g) = built(DnaMode::Kernel);
        let mut scene = SceneBuilder::new(&mut arena, OverlayId::Dna, g);
        dna.apply_telemetry(&mut scene, &kernel_payload(45)).unwrap();
        assert_eq!(dna.strand_counts(&arena), (30, 30));
        assert_eq!(dna.readout(), vec!["nucleotides: 30 | genes: 1 | mutations: 1"]);
    }

    #[test]
    fn test_small_payload_uses_every_nucleotide() {
        let (mut dna, mut arena, g) = built(DnaMode::Kernel);
        let mut scene = SceneBuilder::new(&mut arena, OverlayId::Dna, g);
        dna.apply_telemetry(&mut scene, &kernel_payload(12)).unwrap();
        assert_eq!(dna.strand_counts(&arena), (12, 12));
    }

    #[test]
    fn test_reapply_replaces_dynamic_nodes() {
        let (mut dna, mut arena, g) = built(DnaMode::Kernel);
        let payload = kernel_payload(20);
        dna.apply_telemetry(&mut SceneBuilder::new(&mut arena, OverlayId::Dna, g), &payload)
            .unwrap();
        let first = arena.live_in(g);
        dna.apply_telemetry(&mut SceneBuilder::new(&mut arena, OverlayId::Dna, g), &payload)
            .unwrap();
        assert_eq!(arena.live_in(g), first);
        // root + 2 backbones + 20 pairs * 3 + gene group + 20 markers + 1 mutation
        assert_eq!(first, 3 + 60 + 1 + GENE_MARKERS + 1);
    }

    #[test]
    fn test_malformed_payload_is_error() {
        let (mut dna, mut arena, g) = built(DnaMode::Kernel);
        let err = dna
            .apply_telemetry(
                &mut SceneBuilder::new(&mut arena, OverlayId::Dna, g),
                &json!({ "nucleotides": 7 }),
            )
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Malformed(_)));
    }

    #[test]
    fn test_rotation_follows_delta_time() {
        let (mut dna, mut arena, g) = built(DnaMode::Kernel);
        for _ in 0..10 {
            dna.update(
                &mut SceneBuilder::new(&mut arena, OverlayId::Dna, g),
                FrameStep { dt: 0.1, elapsed: 0.0 },
            );
        }
        assert!((dna.rotation() - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_process_mode_maps_events() {
        let (mut dna, mut arena, g) = built(DnaMode::Process);
        assert_eq!(dna.endpoint(None), None);
        let request = dna.endpoint(Some(42)).unwrap();
        assert_eq!(request.path, "/api/proc-timeline?pid=42");
        assert_eq!(request.dedup_key, Some(42));

        let payload = json!({ "timeline": [
            { "type": "exec", "timestamp": "2024-03-01T10:00:00Z" },
            { "type": "read", "bytes": 512 },
            { "type": "exit" }
        ]});
        dna.apply_telemetry(&mut SceneBuilder::new(&mut arena, OverlayId::DnaTimeline, g), &payload)
            .unwrap();
        assert_eq!(dna.strand_counts(&arena), (3, 3));
        assert_eq!(event_nucleotide("exit"), Nucleotide::C);
        assert_eq!(event_subsystem("read"), "fs");
        assert_eq!(dna.readout(), vec!["pid 42: 3 events | helix 4.0/30"]);
    }

    #[test]
    fn test_process_helix_growth_is_capped() {
        let (mut dna, mut arena, g) = built(DnaMode::Process);
        for _ in 0..2000 {
            dna.update(
                &mut SceneBuilder::new(&mut arena, OverlayId::DnaTimeline, g),
                FrameStep { dt: 0.04, elapsed: 0.0 },
            );
        }
        assert_eq!(dna.height(), GROWTH_MAX);
    }

    #[test]
    fn test_source_paths() {
        assert_eq!(source_path("read", "syscall"), "fs/read_write.c");
        assert_eq!(source_path("openat", "syscall"), "kernel/sys.c");
        assert_eq!(source_path("timer", "interrupt"), "kernel/irq/");
        assert_eq!(gene_color("net"), 0x4a9eff);
    }
}
