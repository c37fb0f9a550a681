//! Base dashboard
//!
//! The always-present view underneath the overlays: a syscall panel, an
//! active-connections panel and the namespace isolation ring. Each panel has
//! its own refresher (a periodic ticket plus a render token). The coordinator
//! stops the refreshers and dims the dashboard while an overlay is up.

use std::collections::BTreeMap;
use std::time::Duration;

use bitflags::bitflags;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::animation::SpringF32;
use crate::config::DashboardConfig;
use crate::overlay::RenderToken;
use crate::scheduler::{Scheduler, Ticket, TicketOwner};
use crate::telemetry::payload::{
    decode, display_scalar, ConnectionEntry, ConnectionsPayload, IsolationPayload, NamespaceInfo,
    SyscallsPayload,
};
use crate::telemetry::{CompletionTarget, FallbackIndicator, FetchRequest, PollResult, TelemetryHub};

pub const SYSCALL_ROWS: usize = 10;
pub const NAMESPACE_SLOTS: usize = 8;
pub const DIMMED_ALPHA: f32 = 0.35;

const NAMESPACE_ORDER: [&str; 6] = ["mnt", "pid", "net", "ipc", "uts", "user"];
const LOCAL_ADDRESSES: [&str; 2] = ["127.0.0.1", "0.0.0.0"];
const PLACEHOLDER_COUNT: &str = "000 000000";

const DEFAULT_SYSCALLS: [(&str, &str); SYSCALL_ROWS] = [
    ("read", "166 643218"),
    ("write", "964 016161"),
    ("open", "972 983879"),
    ("close", "989 612075"),
    ("mmap", "819 540732"),
    ("fork", "512 826219"),
    ("execve", "025 461491"),
    ("socket", "838 475394"),
    ("connect", "632 094939"),
    ("accept", "417 205788"),
];

/// One periodic dashboard fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefresherKind {
    Syscalls,
    Connections,
    Isolation,
}

impl RefresherKind {
    pub const ALL: [RefresherKind; 3] = [
        RefresherKind::Syscalls,
        RefresherKind::Connections,
        RefresherKind::Isolation,
    ];

    pub fn endpoint(&self) -> &'static str {
        match self {
            RefresherKind::Syscalls => "/api/syscalls-realtime",
            RefresherKind::Connections => "/api/active-connections",
            RefresherKind::Isolation => "/api/isolation-context",
        }
    }

    fn ttl(&self, config: &DashboardConfig) -> Duration {
        match self {
            RefresherKind::Isolation => config.isolation_ttl(),
            _ => Duration::ZERO,
        }
    }
}

bitflags! {
    /// Dashboard element groups that fade while an overlay is shown
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DashboardElements: u8 {
        const STATUS_PANELS = 1 << 0;
        const DECORATIVE_ICONS = 1 << 1;
        const SUBSYSTEM_INDICATORS = 1 << 2;
        const CONNECTION_BLOCKS = 1 << 3;
    }
}

/// Kernel subsystem a syscall belongs to, for the panel tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Network,
    FileSystem,
    Memory,
    Scheduler,
}

impl Subsystem {
    pub fn classify(syscall: &str) -> Self {
        let name = syscall.to_ascii_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| name.contains(n));
        if any(&["socket", "connect", "accept", "recv", "send", "poll", "select"]) {
            Subsystem::Network
        } else if any(&[
            "open", "close", "read", "write", "stat", "lseek", "fsync", "rename", "unlink", "mkdir",
            "rmdir", "getdents", "chmod", "chown", "mount",
        ]) {
            Subsystem::FileSystem
        } else if any(&["mmap", "munmap", "brk", "mprotect", "madvise", "mremap"]) {
            Subsystem::Memory
        } else {
            Subsystem::Scheduler
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Subsystem::Network => "NET",
            Subsystem::FileSystem => "FS",
            Subsystem::Memory => "MEM",
            Subsystem::Scheduler => "SCHED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallRow {
    pub name: String,
    pub count: String,
    pub subsystem: Subsystem,
}

impl SyscallRow {
    fn new(name: &str, count: &str) -> Self {
        Self {
            name: name.to_string(),
            count: count.to_string(),
            subsystem: Subsystem::classify(name),
        }
    }

    /// `READ 166 643218`
    pub fn display(&self) -> String {
        format!("{} {}", self.name.to_uppercase(), self.count)
    }
}

/// Dedupe by lowercase name and top up from history then defaults.
/// Returns the rows and whether fewer than a full panel came from the API.
pub fn normalize_syscalls(
    fresh: &[(String, String)],
    history: &[SyscallRow],
) -> (Vec<SyscallRow>, bool) {
    fn add(rows: &mut Vec<SyscallRow>, name: &str, count: &str) {
        let name = name.trim();
        if name.is_empty() || rows.iter().any(|r| r.name.eq_ignore_ascii_case(name)) {
            return;
        }
        let count = count.trim();
        rows.push(SyscallRow::new(name, if count.is_empty() { PLACEHOLDER_COUNT } else { count }));
    }

    let mut rows: Vec<SyscallRow> = Vec::with_capacity(SYSCALL_ROWS);
    for (name, count) in fresh {
        add(&mut rows, name, count);
    }
    let from_api = rows.len();
    for row in history {
        add(&mut rows, &row.name, &row.count);
    }
    for (name, count) in DEFAULT_SYSCALLS {
        add(&mut rows, name, count);
    }
    rows.truncate(SYSCALL_ROWS);
    (rows, from_api < SYSCALL_ROWS)
}

fn host(address: &str) -> &str {
    address.split(':').next().unwrap_or(address)
}

/// Connections with neither end on loopback or the wildcard address
pub fn external_connections(connections: Vec<ConnectionEntry>) -> Vec<ConnectionEntry> {
    connections
        .into_iter()
        .filter(|c| {
            !LOCAL_ADDRESSES.contains(&host(&c.local))
                && !LOCAL_ADDRESSES.contains(&host(&c.remote))
        })
        .collect()
}

/// Preferred namespaces first, then the rest, at most eight
pub fn order_namespaces(namespaces: Vec<NamespaceInfo>) -> Vec<NamespaceInfo> {
    let (mut preferred, rest): (Vec<_>, Vec<_>) = namespaces
        .into_iter()
        .partition(|ns| NAMESPACE_ORDER.contains(&ns.id.as_str()));
    preferred.sort_by_key(|ns| NAMESPACE_ORDER.iter().position(|id| *id == ns.id));
    preferred.dedup_by(|a, b| a.id == b.id);
    preferred.extend(rest);
    preferred.truncate(NAMESPACE_SLOTS);
    preferred
}

#[derive(Debug, Default)]
struct Refresher {
    ticket: Option<Ticket>,
    token: RenderToken,
}

#[derive(Debug)]
pub struct Dashboard {
    config: DashboardConfig,
    refreshers: BTreeMap<RefresherKind, Refresher>,
    dimmed: DashboardElements,
    alpha: SpringF32,
    syscalls: Vec<SyscallRow>,
    syscalls_warmup: bool,
    connections: Vec<ConnectionEntry>,
    namespaces: Vec<NamespaceInfo>,
    fallbacks: BTreeMap<RefresherKind, FallbackIndicator>,
}

impl Dashboard {
    pub fn new(config: DashboardConfig) -> Self {
        let (syscalls, syscalls_warmup) = normalize_syscalls(&[], &[]);
        Self {
            config,
            refreshers: RefresherKind::ALL
                .into_iter()
                .map(|kind| (kind, Refresher::default()))
                .collect(),
            dimmed: DashboardElements::empty(),
            alpha: SpringF32::new(1.0),
            syscalls,
            syscalls_warmup,
            connections: Vec::new(),
            namespaces: Vec::new(),
            fallbacks: BTreeMap::new(),
        }
    }

    /// Arm every stopped refresher and fetch once right away.
    /// Returns how many were started.
    pub fn start_refreshers(
        &mut self,
        scheduler: &mut Scheduler,
        telemetry: &mut TelemetryHub,
        now: Duration,
    ) -> usize {
        let mut started = 0;
        for kind in RefresherKind::ALL {
            if self.refreshers.get(&kind).is_some_and(|r| r.ticket.is_some()) {
                continue;
            }
            let ttl = kind.ttl(&self.config);
            let poller = telemetry.poller(kind.endpoint(), ttl);
            let owner = TicketOwner::Dashboard(kind);
            let ticket = poller.poll(scheduler, owner, self.config.refresh_interval(), now);
            self.refreshers.entry(kind).or_default().ticket = Some(ticket);
            self.request(kind, telemetry);
            started += 1;
        }
        if started > 0 {
            debug!(started, "dashboard refreshers started");
        }
        started
    }

    /// Cancel every refresher; completions still in flight are discarded
    pub fn stop_refreshers(&mut self, scheduler: &mut Scheduler) -> usize {
        let mut stopped = 0;
        for refresher in self.refreshers.values_mut() {
            if let Some(ticket) = refresher.ticket.take() {
                scheduler.cancel(ticket);
                refresher.token = refresher.token.next();
                stopped += 1;
            }
        }
        if stopped > 0 {
            debug!(stopped, "dashboard refreshers stopped");
        }
        stopped
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshers.values().any(|r| r.ticket.is_some())
    }

    pub fn refresher_ticket(&self, kind: RefresherKind) -> Option<Ticket> {
        self.refreshers.get(&kind).and_then(|r| r.ticket)
    }

    fn request(&mut self, kind: RefresherKind, telemetry: &mut TelemetryHub) {
        let ttl = kind.ttl(&self.config);
        let refresher = self.refreshers.entry(kind).or_default();
        refresher.token = refresher.token.next();
        telemetry.request(
            FetchRequest::new(kind.endpoint()).with_ttl(ttl),
            CompletionTarget::Dashboard {
                kind,
                token: refresher.token,
            },
        );
    }

    /// Periodic ticket fired
    pub fn on_tick(&mut self, kind: RefresherKind, ticket: Ticket, telemetry: &mut TelemetryHub) {
        if self.refresher_ticket(kind) == Some(ticket) {
            self.request(kind, telemetry);
        }
    }

    /// Apply a finished fetch if it is the latest for `kind` and the
    /// refresher is still running
    pub fn on_completion(
        &mut self,
        kind: RefresherKind,
        token: RenderToken,
        result: PollResult,
    ) -> bool {
        let current = self.refreshers.get(&kind);
        if current.map(|r| (r.ticket.is_some(), r.token)) != Some((true, token)) {
            debug!(?kind, ?token, "discarding stale dashboard telemetry");
            return false;
        }

        let outcome = match result {
            PollResult::Snapshot(snapshot) => self.apply(kind, &snapshot.payload),
            PollResult::Fallback(fallback) => Err(fallback),
        };
        match outcome {
            Ok(()) => {
                self.fallbacks.remove(&kind);
            }
            Err(fallback) => {
                warn!(?kind, reason = %fallback.reason, "dashboard panel fallback");
                if kind == RefresherKind::Syscalls {
                    let (rows, _) = normalize_syscalls(&[], &self.syscalls);
                    self.syscalls = rows;
                    self.syscalls_warmup = true;
                }
                self.fallbacks.insert(kind, fallback);
            }
        }
        true
    }

    fn apply(&mut self, kind: RefresherKind, payload: &Value) -> Result<(), FallbackIndicator> {
        match kind {
            RefresherKind::Syscalls => {
                let payload: SyscallsPayload = decode(payload)?;
                let fresh: Vec<(String, String)> = payload
                    .syscalls
                    .into_iter()
                    .map(|s| {
                        let count = if s.count.is_null() {
                            String::new()
                        } else {
                            display_scalar(&s.count)
                        };
                        (s.name, count)
                    })
                    .collect();
                let (rows, warmup) = normalize_syscalls(&fresh, &self.syscalls);
                self.syscalls = rows;
                self.syscalls_warmup = warmup;
            }
            RefresherKind::Connections => {
                let payload: ConnectionsPayload = decode(payload)?;
                self.connections = external_connections(payload.connections);
            }
            RefresherKind::Isolation => {
                let payload: IsolationPayload = decode(payload)?;
                self.namespaces = order_namespaces(payload.namespaces);
            }
        }
        Ok(())
    }

    /// Fade `elements` out
    pub fn dim(&mut self, elements: DashboardElements) {
        self.dimmed |= elements;
        self.alpha.set_target(DIMMED_ALPHA);
        info!(?elements, "dashboard dimmed");
    }

    /// Bring every dimmed element back
    pub fn restore(&mut self) {
        if self.dimmed.is_empty() {
            return;
        }
        self.dimmed = DashboardElements::empty();
        self.alpha.set_target(1.0);
        info!("dashboard restored");
    }

    pub fn dimmed(&self) -> DashboardElements {
        self.dimmed
    }

    /// Current opacity multiplier for dimmed elements
    pub fn alpha(&self) -> f32 {
        self.alpha.get()
    }

    pub fn alpha_for(&self, element: DashboardElements) -> f32 {
        if self.dimmed.contains(element) || self.alpha.is_animating() {
            self.alpha.get()
        } else {
            1.0
        }
    }

    /// Advance the dim fade
    pub fn tick(&mut self, dt: f32) {
        self.alpha.tick(dt);
    }

    pub fn syscalls(&self) -> &[SyscallRow] {
        &self.syscalls
    }

    pub fn syscalls_warmup(&self) -> bool {
        self.syscalls_warmup
    }

    pub fn connections(&self) -> &[ConnectionEntry] {
        &self.connections
    }

    pub fn namespaces(&self) -> &[NamespaceInfo] {
        &self.namespaces
    }

    pub fn fallback(&self, kind: RefresherKind) -> Option<&FallbackIndicator> {
        self.fallbacks.get(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetrySnapshot;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn running(kind: RefresherKind) -> (Dashboard, RenderToken) {
        let mut dashboard = Dashboard::new(DashboardConfig::default());
        let mut scheduler = Scheduler::new();
        let refresher = dashboard.refreshers.entry(kind).or_default();
        refresher.ticket = Some(scheduler.schedule_periodic(
            TicketOwner::Dashboard(kind),
            Duration::from_secs(3),
            Duration::ZERO,
        ));
        refresher.token = refresher.token.next();
        let token = refresher.token;
        (dashboard, token)
    }

    fn snapshot(payload: Value) -> PollResult {
        PollResult::Snapshot(Arc::new(TelemetrySnapshot {
            fetched_at: Duration::ZERO,
            payload,
            ttl: Duration::ZERO,
        }))
    }

    #[test]
    fn test_syscalls_dedupe_and_top_up() {
        let fresh = vec![
            ("Read".to_string(), "12".to_string()),
            ("read".to_string(), "99".to_string()),
            ("  ".to_string(), "1".to_string()),
            ("futex".to_string(), "".to_string()),
        ];
        let (rows, warmup) = normalize_syscalls(&fresh, &[]);
        assert!(warmup);
        assert_eq!(rows.len(), SYSCALL_ROWS);
        assert_eq!(rows[0].display(), "READ 12");
        assert_eq!(rows[1].display(), "FUTEX 000 000000");
        assert_eq!(rows[2].name, "write");
        assert_eq!(rows.iter().filter(|r| r.name.eq_ignore_ascii_case("read")).count(), 1);
    }

    #[test]
    fn test_subsystem_classification() {
        assert_eq!(Subsystem::classify("recvfrom").tag(), "NET");
        assert_eq!(Subsystem::classify("openat").tag(), "FS");
        assert_eq!(Subsystem::classify("munmap").tag(), "MEM");
        assert_eq!(Subsystem::classify("futex").tag(), "SCHED");
    }

    #[test]
    fn test_connections_drop_local_endpoints() {
        let entry = |local: &str, remote: &str| ConnectionEntry {
            local: local.to_string(),
            remote: remote.to_string(),
            state: "01".to_string(),
            kind: "TCP".to_string(),
        };
        let kept = external_connections(vec![
            entry("192.168.1.100:22", "10.0.0.50:54321"),
            entry("127.0.0.1:5432", "10.0.0.1:1"),
            entry("10.0.0.2:80", "0.0.0.0:0"),
        ]);
        assert_eq!(kept, vec![entry("192.168.1.100:22", "10.0.0.50:54321")]);
    }

    #[test]
    fn test_namespace_order() {
        let ns = |id: &str| NamespaceInfo {
            id: id.to_string(),
            ..Default::default()
        };
        let ordered =
            order_namespaces(vec![ns("cgroup"), ns("user"), ns("net"), ns("mnt"), ns("time")]);
        let ids: Vec<_> = ordered.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["mnt", "net", "user", "cgroup", "time"]);
    }

    #[test]
    fn test_completion_applies_with_current_token() {
        let (mut dashboard, token) = running(RefresherKind::Connections);
        let payload = json!({ "connections": [
            { "local": "10.1.1.1:443", "remote": "8.8.8.8:53", "state": "01", "type": "UDP" },
            { "local": "127.0.0.1:1", "remote": "8.8.8.8:53", "state": "01", "type": "UDP" }
        ]});
        assert!(!dashboard.on_completion(
            RefresherKind::Connections,
            token.next(),
            snapshot(payload.clone())
        ));
        assert!(dashboard.connections().is_empty());
        assert!(dashboard.on_completion(RefresherKind::Connections, token, snapshot(payload)));
        assert_eq!(dashboard.connections().len(), 1);
    }

    #[test]
    fn test_stopped_refresher_discards_completion() {
        let (mut dashboard, token) = running(RefresherKind::Isolation);
        let mut scheduler = Scheduler::new();
        dashboard.stop_refreshers(&mut scheduler);
        assert!(!dashboard.is_refreshing());
        let applied = dashboard.on_completion(
            RefresherKind::Isolation,
            token,
            snapshot(json!({ "namespaces": [{ "id": "pid" }] })),
        );
        assert!(!applied);
        assert!(dashboard.namespaces().is_empty());
    }

    #[test]
    fn test_fallback_keeps_syscall_panel_full() {
        let (mut dashboard, token) = running(RefresherKind::Syscalls);
        let applied = dashboard.on_completion(
            RefresherKind::Syscalls,
            token,
            PollResult::Fallback(FallbackIndicator::new("HTTP 503")),
        );
        assert!(applied);
        assert_eq!(dashboard.syscalls().len(), SYSCALL_ROWS);
        assert!(dashboard.syscalls_warmup());
        assert_eq!(dashboard.fallback(RefresherKind::Syscalls).unwrap().reason, "HTTP 503");
    }

    #[test]
    fn test_dim_and_restore() {
        let mut dashboard = Dashboard::new(DashboardConfig::default());
        dashboard.dim(DashboardElements::all());
        assert_eq!(dashboard.dimmed(), DashboardElements::all());
        for _ in 0..120 {
            dashboard.tick(1.0 / 60.0);
        }
        assert!((dashboard.alpha() - DIMMED_ALPHA).abs() < 0.01);

        dashboard.restore();
        assert!(dashboard.dimmed().is_empty());
        for _ in 0..120 {
            dashboard.tick(1.0 / 60.0);
        }
        assert!((dashboard.alpha_for(DashboardElements::STATUS_PANELS) - 1.0).abs() < 0.01);
    }
}
