//! Keyed request deduplication
//!
//! Concurrent lookups for the same key share one in-flight future. Failed
//! lookups are remembered for a short window so an unreachable key does not
//! hit the network on every poll.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use super::poller::{FallbackIndicator, PollResult};
use crate::clock::Clock;

pub type SharedFetch = Shared<BoxFuture<'static, PollResult>>;

struct DedupState<K> {
    in_flight: HashMap<K, SharedFetch>,
    negative: HashMap<K, (Duration, FallbackIndicator)>,
}

impl<K> Default for DedupState<K> {
    fn default() -> Self {
        Self {
            in_flight: HashMap::new(),
            negative: HashMap::new(),
        }
    }
}

pub struct DedupFetcher<K> {
    state: Arc<Mutex<DedupState<K>>>,
    negative_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K> Clone for DedupFetcher<K> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            negative_ttl: self.negative_ttl,
            clock: self.clock.clone(),
        }
    }
}

impl<K> DedupFetcher<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
{
    pub fn new(negative_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DedupState::default())),
            negative_ttl,
            clock,
        }
    }

    /// Join the in-flight request for `key`, or start one with `make`
    pub fn fetch<F, Fut>(&self, key: K, make: F) -> SharedFetch
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PollResult> + Send + 'static,
    {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        state.negative.retain(|_, (expires, _)| *expires > now);
        if let Some((_, fallback)) = state.negative.get(&key) {
            debug!(?key, "negative cache hit");
            let result = PollResult::Fallback(fallback.clone());
            return futures::future::ready(result).boxed().shared();
        }

        if let Some(existing) = state.in_flight.get(&key) {
            debug!(?key, "joining in-flight request");
            return existing.clone();
        }

        let inner = make();
        let shared_state = self.state.clone();
        let clock = self.clock.clone();
        let negative_ttl = self.negative_ttl;
        let owned_key = key.clone();

        let fetch = async move {
            let result = inner.await;
            let mut state = shared_state.lock().unwrap_or_else(|e| e.into_inner());
            state.in_flight.remove(&owned_key);
            if let PollResult::Fallback(fallback) = &result {
                let expires = clock.now() + negative_ttl;
                state.negative.insert(owned_key, (expires, fallback.clone()));
            }
            result
        }
        .boxed()
        .shared();

        state.in_flight.insert(key, fetch.clone());
        fetch
    }

    pub fn in_flight(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .in_flight
            .len()
    }

    /// Failures currently remembered, expired or not
    pub fn remembered_failures(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .negative
            .len()
    }

    /// Drop every remembered failure
    pub fn forget_failures(&self) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .negative
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::telemetry::poller::TelemetrySnapshot;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn ok() -> PollResult {
        PollResult::Snapshot(Arc::new(TelemetrySnapshot {
            fetched_at: Duration::ZERO,
            payload: json!({ "timeline": [] }),
            ttl: Duration::ZERO,
        }))
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_call() {
        let clock = Arc::new(ManualClock::new());
        let dedup: DedupFetcher<u32> = DedupFetcher::new(Duration::from_secs(5), clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();

        let calls_a = calls.clone();
        let a = dedup.fetch(42, move || async move {
            calls_a.fetch_add(1, Ordering::SeqCst);
            let _ = rx.await;
            ok()
        });
        let calls_b = calls.clone();
        let b = dedup.fetch(42, move || async move {
            calls_b.fetch_add(1, Ordering::SeqCst);
            ok()
        });
        assert_eq!(dedup.in_flight(), 1);

        tx.send(()).unwrap();
        let (ra, rb) = futures::join!(a, b);
        assert_eq!(ra, rb);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_remembered_until_expiry() {
        let clock = Arc::new(ManualClock::new());
        let dedup: DedupFetcher<u32> = DedupFetcher::new(Duration::from_secs(5), clock.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let fail = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                PollResult::Fallback(FallbackIndicator::new("no such pid"))
            }
        };

        let first = dedup.fetch(7, fail(calls.clone())).await;
        assert!(first.is_fallback());
        let second = dedup.fetch(7, fail(calls.clone())).await;
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(5));
        dedup.fetch(7, fail(calls.clone())).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_share() {
        let clock = Arc::new(ManualClock::new());
        let dedup: DedupFetcher<u32> = DedupFetcher::new(Duration::from_secs(5), clock);
        let calls = Arc::new(AtomicUsize::new(0));
        for pid in [1, 2] {
            let calls = calls.clone();
            dedup
                .fetch(pid, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ok()
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_failures_are_swept_for_every_key() {
        let clock = Arc::new(ManualClock::new());
        let dedup: DedupFetcher<u32> = DedupFetcher::new(Duration::from_secs(5), clock.clone());
        for pid in [1, 2, 3] {
            dedup
                .fetch(pid, || async { PollResult::Fallback(FallbackIndicator::new("gone")) })
                .await;
        }
        assert_eq!(dedup.remembered_failures(), 3);

        clock.advance(Duration::from_secs(5));
        dedup.fetch(9, || async { ok() }).await;
        assert_eq!(dedup.remembered_failures(), 0);
    }
}
