//! Shared telemetry plumbing owned by the application context
//!
//! The hub keeps one snapshot cache per endpoint, the keyed dedup map for
//! process lookups, and the completion channel. Fetches run on the async
//! runtime; their only side effect is a [`Completion`] message which the UI
//! thread drains on its next pump.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use super::dedup::DedupFetcher;
use super::poller::{PollResult, SnapshotCache, TelemetryPoller};
use super::transport::TelemetryTransport;
use crate::clock::Clock;
use crate::dashboard::RefresherKind;
use crate::overlay::{OverlayId, RenderToken};
use crate::scene::Generation;

/// Runs fetch futures off the UI thread
pub trait Spawner: Send + Sync {
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// [`Spawner`] backed by a tokio runtime handle
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawner for the runtime the caller is running inside
    ///
    /// Panics outside a tokio runtime, like `tokio::spawn`.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Spawner for TokioSpawner {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }
}

/// Where a finished fetch should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionTarget {
    Overlay {
        id: OverlayId,
        generation: Generation,
        token: RenderToken,
    },
    Dashboard {
        kind: RefresherKind,
        token: RenderToken,
    },
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub target: CompletionTarget,
    pub result: PollResult,
}

/// What to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub path: String,
    pub ttl: Duration,
    /// Process id for keyed deduplication
    pub dedup_key: Option<u32>,
}

impl FetchRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ttl: Duration::ZERO,
            dedup_key: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn keyed(mut self, pid: u32) -> Self {
        self.dedup_key = Some(pid);
        self
    }
}

pub struct TelemetryHub {
    transport: Arc<dyn TelemetryTransport>,
    clock: Arc<dyn Clock>,
    spawner: Arc<dyn Spawner>,
    caches: HashMap<String, SnapshotCache>,
    process_lookups: DedupFetcher<u32>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    in_flight: Arc<AtomicUsize>,
}

impl TelemetryHub {
    pub fn new(
        transport: Arc<dyn TelemetryTransport>,
        clock: Arc<dyn Clock>,
        spawner: Arc<dyn Spawner>,
        negative_ttl: Duration,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            process_lookups: DedupFetcher::new(negative_ttl, clock.clone()),
            transport,
            clock,
            spawner,
            caches: HashMap::new(),
            tx,
            rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Poller for `path`; every poller for the same path shares one cache
    pub fn poller(&mut self, path: &str, ttl: Duration) -> TelemetryPoller {
        let cache = self.caches.entry(path.to_string()).or_default().clone();
        TelemetryPoller::with_cache(
            path,
            ttl,
            self.transport.clone(),
            self.clock.clone(),
            cache,
        )
    }

    /// Drop the cached snapshot for `path`
    pub fn forget(&mut self, path: &str) {
        if let Some(cache) = self.caches.remove(path) {
            *cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
            debug!(path, "snapshot cache dropped");
        }
    }

    /// Endpoints with a live snapshot cache
    pub fn cached_paths(&self) -> usize {
        self.caches.len()
    }

    /// Start a fetch; the result arrives later through [`TelemetryHub::drain`]
    pub fn request(&mut self, request: FetchRequest, target: CompletionTarget) {
        let poller = self.poller(&request.path, request.ttl);
        let fetch: BoxFuture<'static, PollResult> = match request.dedup_key {
            Some(pid) => self
                .process_lookups
                .fetch(pid, move || async move { poller.fetch_once().await })
                .boxed(),
            None => async move { poller.fetch_once().await }.boxed(),
        };

        debug!(path = %request.path, ?target, "fetch started");
        let tx = self.tx.clone();
        let in_flight = self.in_flight.clone();
        in_flight.fetch_add(1, Ordering::SeqCst);
        self.spawner.spawn(
            async move {
                let result = fetch.await;
                // Receiver lives as long as the hub; a send error only means shutdown
                let _ = tx.send(Completion { target, result });
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            .boxed(),
        );
    }

    /// Completions that have arrived since the last drain
    pub fn drain(&self) -> Vec<Completion> {
        self.rx.try_iter().collect()
    }

    /// Fetches spawned but not yet delivered
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every spawned fetch has delivered its completion
    pub async fn settle(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TelemetryError;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetryTransport for Echo {
        async fn get_json(&self, path: &str) -> Result<Value, TelemetryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "path": path }))
        }
    }

    fn hub() -> (TelemetryHub, Arc<Echo>) {
        let transport = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let hub = TelemetryHub::new(
            transport.clone(),
            Arc::new(ManualClock::new()),
            Arc::new(TokioSpawner::current()),
            Duration::from_secs(5),
        );
        (hub, transport)
    }

    #[tokio::test]
    async fn test_request_delivers_completion() {
        let (mut hub, _transport) = hub();
        let target = CompletionTarget::Dashboard {
            kind: RefresherKind::Syscalls,
            token: RenderToken::default(),
        };
        hub.request(FetchRequest::new("/api/syscalls-realtime"), target);
        hub.settle().await;

        let completions = hub.drain();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].target, target);
        let snapshot = completions[0].result.snapshot().unwrap();
        assert_eq!(snapshot.payload["path"], "/api/syscalls-realtime");
        assert!(hub.drain().is_empty());
    }

    #[tokio::test]
    async fn test_pollers_share_cache_per_path() {
        let (mut hub, transport) = hub();
        let ttl = Duration::from_secs(8);
        hub.poller("/api/isolation-context", ttl).fetch_once().await;
        hub.poller("/api/isolation-context", ttl).fetch_once().await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_poller_ignores_memoised_snapshot() {
        let (mut hub, transport) = hub();
        hub.poller("/x", Duration::from_millis(1000)).fetch_once().await;
        hub.poller("/x", Duration::ZERO).fetch_once().await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forget_drops_path_cache() {
        let (mut hub, transport) = hub();
        let ttl = Duration::from_secs(8);
        let held = hub.poller("/api/proc-timeline?pid=7", ttl);
        held.fetch_once().await;
        assert_eq!(hub.cached_paths(), 1);

        hub.forget("/api/proc-timeline?pid=7");
        assert_eq!(hub.cached_paths(), 0);
        assert!(held.cached().is_none());

        hub.poller("/api/proc-timeline?pid=7", ttl).fetch_once().await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }
}
