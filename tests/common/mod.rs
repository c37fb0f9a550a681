//! Shared fixtures for the runtime integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use overlay_runtime::{
    AppContext, Clock, ManualClock, OverlayId, PumpReport, RuntimeConfig, SurfaceProbe,
    SurfaceStatus,
    TelemetryError, TelemetryTransport, TokioSpawner,
};

/// Transport with scripted per-path replies, call counting and optional gates
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<HashMap<String, Result<Value, TelemetryError>>>,
    calls: Mutex<HashMap<String, usize>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    total: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let transport = Arc::new(Self::default());
        transport.reply(
            "/api/syscalls-realtime",
            json!({ "syscalls": [{ "name": "read", "count": "166 643218" }] }),
        );
        transport.reply("/api/active-connections", json!({ "connections": [] }));
        transport.reply("/api/isolation-context", json!({ "namespaces": [] }));
        transport
    }

    pub fn reply(&self, path: &str, body: Value) {
        self.replies
            .lock()
            .unwrap()
            .insert(path.to_string(), Ok(body));
    }

    pub fn fail(&self, path: &str, err: TelemetryError) {
        self.replies.lock().unwrap().insert(path.to_string(), Err(err));
    }

    /// Hold the next request for `path` until the returned sender fires
    pub fn gate(&self, path: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(path.to_string(), rx);
        tx
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetryTransport for FakeTransport {
    async fn get_json(&self, path: &str) -> Result<Value, TelemetryError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(path.to_string()).or_default() += 1;

        let gate = self.gates.lock().unwrap().remove(path);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        self.replies
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or(Err(TelemetryError::Status(404)))
    }
}

pub struct Harness {
    pub ctx: AppContext,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<FakeTransport>,
}

impl Harness {
    pub fn new(transport: Arc<FakeTransport>) -> Self {
        Self::with(transport, RuntimeConfig::default(), SurfaceStatus::Available)
    }

    pub fn with(
        transport: Arc<FakeTransport>,
        config: RuntimeConfig,
        surface: SurfaceStatus,
    ) -> Self {
        let clock = Arc::new(ManualClock::new());
        let ctx = AppContext::builder(config, transport.clone(), Arc::new(TokioSpawner::current()))
            .clock(clock.clone() as Arc<dyn Clock>)
            .surface(Arc::new(surface) as Arc<dyn SurfaceProbe>)
            .build();
        Self { ctx, clock, transport }
    }

    /// Wait for every fetch in flight, then pump once
    pub async fn settle(&mut self) -> PumpReport {
        self.ctx.services().telemetry.settle().await;
        self.ctx.pump()
    }

    /// Advance the clock in `frames` steps of `step_ms`, pumping after each
    pub fn run_frames(&mut self, frames: usize, step_ms: u64) {
        for _ in 0..frames {
            self.clock.advance(Duration::from_millis(step_ms));
            self.ctx.pump();
        }
    }

    pub fn live_nodes(&self) -> usize {
        self.ctx.services().arena.live_count()
    }

    pub fn live_tickets_for(&self, id: OverlayId) -> usize {
        self.ctx
            .services()
            .scheduler
            .live_for(overlay_runtime::scheduler::TicketOwner::Overlay(id))
    }
}

pub fn kernel_dna(nucleotides: usize) -> Value {
    let codes = ["A", "T", "G", "C"];
    let nucleotides: Vec<Value> = (0..nucleotides)
        .map(|i| json!({ "code": codes[i % 4], "name": format!("sys_{i}"), "count": i }))
        .collect();
    json!({
        "nucleotides": nucleotides,
        "genes": [{ "name": "sched", "start": 0.1, "end": 0.3 }],
        "mutations": []
    })
}

pub fn proc_matrix(rows: usize) -> Value {
    let matrix: Vec<Value> = (0..rows)
        .map(|i| {
            json!({
                "pid": 100 + i,
                "name": format!("proc{i}"),
                "cpu": i as f64 * 10.0,
                "mem": 0.5,
                "io": 0,
                "net": 0,
                "fd": 4
            })
        })
        .collect();
    json!({ "matrix": matrix })
}

pub fn devices() -> Value {
    json!({
        "devices": [
            {
                "name": "eth0",
                "type": "network",
                "load_norm": 1.0,
                "targets": ["net"],
                "throughput_bps": 1200
            },
            {
                "name": "nvme0",
                "type": "storage",
                "load_norm": 0.2,
                "targets": ["vfs"],
                "throughput_bps": 300
            }
        ],
        "meta": { "count": 2, "max_throughput_bps": 1200 }
    })
}

pub fn timeline(events: usize) -> Value {
    let kinds = ["exec", "read", "write", "exit"];
    let timeline: Vec<Value> = (0..events).map(|i| json!({ "type": kinds[i % 4] })).collect();
    json!({ "timeline": timeline, "name": "nginx" })
}
