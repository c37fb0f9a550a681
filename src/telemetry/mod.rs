//! Telemetry acquisition
//!
//! - `transport`: HTTP GET + JSON parse
//! - `poller`: TTL-memoised fetch that never fails
//! - `dedup`: keyed in-flight sharing and negative caching
//! - `hub`: per-endpoint caches, spawning, completion channel
//! - `payload`: typed decoders for each endpoint's body

pub mod dedup;
pub mod hub;
pub mod payload;
pub mod poller;
pub mod transport;

pub use dedup::DedupFetcher;
pub use hub::{Completion, CompletionTarget, FetchRequest, Spawner, TelemetryHub, TokioSpawner};
pub use poller::{FallbackIndicator, PollResult, TelemetryPoller, TelemetrySnapshot};
pub use transport::{HttpTransport, TelemetryTransport};
