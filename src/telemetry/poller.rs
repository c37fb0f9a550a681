//! Telemetry poller with TTL memoisation
//!
//! A poller is cheap to clone; clones share the snapshot cache, so the
//! memoisation window holds across every consumer of the same endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::transport::{check_body, TelemetryTransport};
use crate::clock::Clock;
use crate::error::TelemetryError;
use crate::scheduler::{Scheduler, Ticket, TicketOwner};

/// One successful fetch
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    /// Monotonic time the request was issued
    pub fetched_at: Duration,
    pub payload: Value,
    pub ttl: Duration,
}

impl TelemetrySnapshot {
    /// Whether the snapshot is still inside a memoisation window of `ttl`
    pub fn is_fresh(&self, now: Duration, ttl: Duration) -> bool {
        !ttl.is_zero() && now.saturating_sub(self.fetched_at) < ttl
    }
}

/// Short human-readable description of a failed fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackIndicator {
    pub reason: String,
}

impl FallbackIndicator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<TelemetryError> for FallbackIndicator {
    fn from(err: TelemetryError) -> Self {
        Self::new(err.reason())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    Snapshot(Arc<TelemetrySnapshot>),
    Fallback(FallbackIndicator),
}

impl PollResult {
    pub fn snapshot(&self) -> Option<&Arc<TelemetrySnapshot>> {
        match self {
            PollResult::Snapshot(snapshot) => Some(snapshot),
            PollResult::Fallback(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, PollResult::Fallback(_))
    }
}

pub type SnapshotCache = Arc<Mutex<Option<Arc<TelemetrySnapshot>>>>;

#[derive(Clone)]
pub struct TelemetryPoller {
    path: Arc<str>,
    ttl: Duration,
    transport: Arc<dyn TelemetryTransport>,
    clock: Arc<dyn Clock>,
    cache: SnapshotCache,
}

impl std::fmt::Debug for TelemetryPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryPoller")
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TelemetryPoller {
    pub fn new(
        path: &str,
        ttl: Duration,
        transport: Arc<dyn TelemetryTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_cache(path, ttl, transport, clock, SnapshotCache::default())
    }

    pub(crate) fn with_cache(
        path: &str,
        ttl: Duration,
        transport: Arc<dyn TelemetryTransport>,
        clock: Arc<dyn Clock>,
        cache: SnapshotCache,
    ) -> Self {
        Self {
            path: Arc::from(path),
            ttl,
            transport,
            clock,
            cache,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Last successful snapshot, fresh or not
    pub fn cached(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // Judged against this poller's window, not the one the snapshot was stored under
    fn fresh(&self, now: Duration) -> Option<Arc<TelemetrySnapshot>> {
        self.cached().filter(|snapshot| snapshot.is_fresh(now, self.ttl))
    }

    /// Arm the repeating fetch for `owner`; cancel the ticket to stop it
    pub fn poll(
        &self,
        scheduler: &mut Scheduler,
        owner: TicketOwner,
        interval: Duration,
        now: Duration,
    ) -> Ticket {
        debug!(path = %self.path, ?interval, "polling armed");
        scheduler.schedule_periodic(owner, interval, now)
    }

    /// Fetch once, honouring the TTL cache. Never fails: errors become a
    /// [`FallbackIndicator`].
    pub async fn fetch_once(&self) -> PollResult {
        let now = self.clock.now();
        if let Some(snapshot) = self.fresh(now) {
            debug!(path = %self.path, "telemetry cache hit");
            return PollResult::Snapshot(snapshot);
        }

        let result = self
            .transport
            .get_json(&self.path)
            .await
            .and_then(check_body);

        match result {
            Ok(payload) => {
                let snapshot = Arc::new(TelemetrySnapshot {
                    fetched_at: now,
                    payload,
                    ttl: self.ttl,
                });
                *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
                PollResult::Snapshot(snapshot)
            }
            Err(err) => {
                warn!(path = %self.path, error = %err, "telemetry fallback");
                PollResult::Fallback(err.into())
            }
        }
    }
}
