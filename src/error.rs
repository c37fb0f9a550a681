//! Error types for the overlay runtime
//!
//! Telemetry failures never escape the fetch boundary: they are converted
//! into a [`FallbackIndicator`](crate::telemetry::FallbackIndicator) and shown
//! in the overlay's readout. Activation errors are returned to the caller of
//! the coordinator and logged.

use std::path::PathBuf;

use thiserror::Error;

use crate::overlay::OverlayId;

/// Failure while fetching or decoding a telemetry payload
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The endpoint answered but reported its own failure in an `error` field
    #[error("{0}")]
    Upstream(String),
}

impl TelemetryError {
    /// Short text suitable for an on-screen fallback readout
    pub fn reason(&self) -> String {
        match self {
            TelemetryError::Network(msg) => truncate(msg, 72),
            other => truncate(&other.to_string(), 72),
        }
    }
}

/// Failure to bring an overlay on screen
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivationError {
    #[error("overlay {0} is not registered")]
    NotRegistered(OverlayId),

    #[error("rendering surface unavailable for {overlay}: {reason}")]
    SurfaceUnavailable { overlay: OverlayId, reason: String },
}

/// Failure loading runtime configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
