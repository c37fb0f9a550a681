//! Runtime configuration
//!
//! Defines the serde schema for `config/overlays.yaml`. Every field carries a
//! default so that an empty or partial file is valid.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::overlay::OverlayId;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub animation: AnimationConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Per-overlay overrides, keyed by overlay id (`dna`, `network`, ...)
    #[serde(default)]
    pub overlays: BTreeMap<OverlayId, OverlaySettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Prefix joined with every endpoint path
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How long a failed keyed lookup is remembered before retrying
    #[serde(default = "default_negative_cache_ms")]
    pub negative_cache_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            negative_cache_ms: default_negative_cache_ms(),
        }
    }
}

impl TelemetryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn negative_cache(&self) -> Duration {
        Duration::from_millis(self.negative_cache_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimationConfig {
    /// Upper bound on a single frame's delta time
    #[serde(default = "default_max_step_ms")]
    pub max_step_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            max_step_ms: default_max_step_ms(),
        }
    }
}

impl AnimationConfig {
    pub fn max_step(&self) -> Duration {
        Duration::from_millis(self.max_step_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_refresh_ms")]
    pub refresh_interval_ms: u64,

    #[serde(default = "default_isolation_ttl_ms")]
    pub isolation_ttl_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_dashboard_refresh_ms(),
            isolation_ttl_ms: default_isolation_ttl_ms(),
        }
    }
}

impl DashboardConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn isolation_ttl(&self) -> Duration {
        Duration::from_millis(self.isolation_ttl_ms)
    }
}

/// Polling behaviour for one overlay
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverlaySettings {
    pub interval_ms: u64,

    /// Snapshot memoisation window; zero disables the cache
    #[serde(default)]
    pub ttl_ms: u64,
}

impl OverlaySettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Built-in cadence for each overlay's telemetry endpoint
    pub fn default_for(id: OverlayId) -> Self {
        let interval_ms = match id {
            OverlayId::Devices | OverlayId::Network => 1500,
            OverlayId::Filesystem => 1200,
            OverlayId::Dna | OverlayId::DnaTimeline => 2000,
            OverlayId::Matrix | OverlayId::Timeline => 2000,
        };
        Self {
            interval_ms,
            ttl_ms: 0,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5001".to_string()
}

fn default_request_timeout_ms() -> u64 {
    4000
}

fn default_negative_cache_ms() -> u64 {
    5000
}

fn default_max_step_ms() -> u64 {
    40
}

fn default_dashboard_refresh_ms() -> u64 {
    3000
}

fn default_isolation_ttl_ms() -> u64 {
    8000
}

impl RuntimeConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Effective settings for an overlay, falling back to the built-in cadence
    pub fn overlay(&self, id: OverlayId) -> OverlaySettings {
        self.overlays
            .get(&id)
            .copied()
            .unwrap_or_else(|| OverlaySettings::default_for(id))
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = RuntimeConfig::from_yaml("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.animation.max_step(), Duration::from_millis(40));
        assert_eq!(config.dashboard.isolation_ttl(), Duration::from_millis(8000));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
telemetry:
  base_url: "http://kernel-host:9000"
overlays:
  network:
    interval_ms: 500
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.telemetry.base_url, "http://kernel-host:9000");
        assert_eq!(config.telemetry.request_timeout_ms, 4000);
        assert_eq!(config.overlay(OverlayId::Network).interval_ms, 500);
        assert_eq!(config.overlay(OverlayId::Network).ttl_ms, 0);
        assert_eq!(config.overlay(OverlayId::Filesystem).interval_ms, 1200);
    }

    #[test]
    fn test_default_cadence_per_overlay() {
        assert_eq!(OverlaySettings::default_for(OverlayId::Devices).interval_ms, 1500);
        assert_eq!(OverlaySettings::default_for(OverlayId::Dna).interval_ms, 2000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "animation:\n  max_step_ms: 25").unwrap();
        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.animation.max_step_ms, 25);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/overlays.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_unknown_overlay_key_is_parse_error() {
        let err = RuntimeConfig::from_yaml("overlays:\n  teapot:\n    interval_ms: 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/overlays.yaml");
        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.telemetry, TelemetryConfig::default());
        assert_eq!(config.dashboard, DashboardConfig::default());
        assert_eq!(config.overlay(OverlayId::Timeline).ttl_ms, 1000);
        assert_eq!(
            config.overlay(OverlayId::Devices),
            OverlaySettings::default_for(OverlayId::Devices)
        );
    }
}
