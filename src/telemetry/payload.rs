//! Typed views over telemetry JSON bodies
//!
//! Snapshots keep the raw `serde_json::Value`; each consumer decodes the
//! shape it needs with [`decode`]. Every field is optional on the wire.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::TelemetryError;

pub fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, TelemetryError> {
    T::deserialize(value).map_err(|e| TelemetryError::Malformed(e.to_string()))
}

/// Render a loosely-typed scalar (number or string) for display
pub fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => "-".to_string(),
    }
}

// =============================================================================
// DEVICES
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DevicesPayload {
    pub devices: Vec<DeviceInfo>,
    pub meta: DevicesMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub name: String,
    #[serde(rename = "type", alias = "category")]
    pub kind: String,
    pub load_norm: f32,
    pub targets: Vec<String>,
    pub throughput_bps: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DevicesMeta {
    pub count: u32,
    pub max_throughput_bps: f64,
}

// =============================================================================
// NETWORK STACK
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkPayload {
    pub layer_metrics: LayerMetrics,
    pub signals: NetworkSignals,
    pub flow: Option<FlowInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LayerMetrics {
    pub userspace: UserspaceMetrics,
    pub socket_api: SocketMetrics,
    pub tcp_udp: TransportMetrics,
    pub ip: IpMetrics,
    pub netfilter: NetfilterMetrics,
    pub driver: DriverMetrics,
    pub nic: NicMetrics,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserspaceMetrics {
    pub active_processes: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SocketMetrics {
    pub active_sockets: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransportMetrics {
    pub established: u64,
    pub retrans_per_sec: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IpMetrics {
    pub in_packets_per_sec: f64,
    pub out_packets_per_sec: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetfilterMetrics {
    pub drop_per_sec: f64,
    pub drop_ratio: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DriverMetrics {
    pub iface: Option<String>,
    pub rx_mb_s: f64,
    pub tx_mb_s: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NicMetrics {
    pub rx_errors: u64,
    pub tx_errors: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkSignals {
    pub drop_probability: Option<f64>,
    pub retransmit_probability: Option<f64>,
    pub packet_speed: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlowInfo {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub state_name: Option<String>,
    pub remote: Option<String>,
}

// =============================================================================
// FILESYSTEM
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilesystemPayload {
    pub rows: u32,
    pub cols: u32,
    pub blocks: Vec<BlockInfo>,
    pub zones: Vec<ZoneInfo>,
    pub meta: FilesystemMeta,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockState {
    Free,
    Writing,
    #[default]
    #[serde(other)]
    Used,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BlockInfo {
    pub r: Option<u32>,
    pub c: Option<u32>,
    /// Linear index, used when row/column are absent
    pub i: Option<u32>,
    pub state: BlockState,
}

impl BlockInfo {
    /// Grid cell for this block given the map width
    pub fn cell(&self, cols: u32) -> (u32, u32) {
        let cols = cols.max(1);
        let linear = self.i.unwrap_or(0);
        (
            self.r.unwrap_or(linear / cols),
            self.c.unwrap_or(linear % cols),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ZoneInfo {
    pub name: String,
    pub row_start: u32,
    pub row_end: Option<u32>,
    pub used_percent: f64,
    pub activity: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilesystemMeta {
    pub used_gb: f64,
    pub total_gb: f64,
    pub used_percent: f64,
    pub free_gb: f64,
    pub write_bps: f64,
    pub writing_blocks: u64,
}

// =============================================================================
// PROCESS TIMELINE
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimelinePayload {
    pub timeline: Vec<TimelineEvent>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Epoch(f64),
    Text(String),
}

impl Timestamp {
    /// Milliseconds since the Unix epoch, if parseable
    pub fn as_millis(&self) -> Option<i64> {
        match self {
            Timestamp::Epoch(secs) => Some((*secs * 1000.0) as i64),
            Timestamp::Text(text) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                    return Some(dt.timestamp_millis());
                }
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
                    .ok()
                    .map(|dt| dt.and_utc().timestamp_millis())
            }
        }
    }

    /// `HH:MM:SS` for tooltips
    pub fn clock_time(&self) -> String {
        self.as_millis()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| match self {
                Timestamp::Text(text) => text.clone(),
                Timestamp::Epoch(secs) => format!("{secs:.0}"),
            })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimelineEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: Option<Timestamp>,
    pub count: Option<f64>,
    pub bytes: Option<f64>,
}

impl TimelineEvent {
    /// `count`, falling back to `bytes`
    pub fn magnitude(&self) -> f64 {
        self.count.or(self.bytes).unwrap_or(0.0)
    }
}

// =============================================================================
// KERNEL DNA
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KernelDnaPayload {
    pub nucleotides: Vec<NucleotideInfo>,
    pub genes: Vec<GeneInfo>,
    pub mutations: Vec<MutationInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NucleotideInfo {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: String,
    pub count: f64,
    pub subsystem: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeneInfo {
    pub name: String,
    pub start: f32,
    pub end: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MutationInfo {
    pub position: f32,
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<String>,
}

// =============================================================================
// PROCESS MATRIX
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProcMatrixPayload {
    pub matrix: Vec<ProcRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcRow {
    pub pid: u32,
    pub name: String,
    pub cpu: f64,
    pub mem: f64,
    pub io: f64,
    pub net: f64,
    pub fd: f64,
}

// =============================================================================
// DASHBOARD PANELS
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyscallsPayload {
    pub syscalls: Vec<SyscallEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyscallEntry {
    pub name: String,
    pub count: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionsPayload {
    pub connections: Vec<ConnectionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionEntry {
    pub local: String,
    pub remote: String,
    pub state: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IsolationPayload {
    pub namespaces: Vec<NamespaceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NamespaceInfo {
    pub id: String,
    pub label: Option<String>,
    pub activity: f64,
    pub unique_count: u64,
    pub dominant_count: u64,
    pub dominant_inode: Value,
}
