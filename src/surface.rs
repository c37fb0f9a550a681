//! Rendering surface availability
//!
//! Probed once per overlay before its scene is built. A failed probe aborts
//! that overlay's initialization and leaves the dashboard usable.

use crate::overlay::OverlayId;

pub trait SurfaceProbe: Send + Sync {
    /// `Err` carries a short reason for the blocking notice
    fn probe(&self, overlay: OverlayId) -> Result<(), String>;
}

/// Surface state decided once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceStatus {
    Available,
    Unavailable(String),
}

impl SurfaceStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, SurfaceStatus::Available)
    }
}

impl SurfaceProbe for SurfaceStatus {
    fn probe(&self, _overlay: OverlayId) -> Result<(), String> {
        match self {
            SurfaceStatus::Available => Ok(()),
            SurfaceStatus::Unavailable(reason) => Err(reason.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_reports_reason() {
        let status = SurfaceStatus::Unavailable("no hardware acceleration".into());
        assert_eq!(
            status.probe(OverlayId::Dna),
            Err("no hardware acceleration".to_string())
        );
        assert!(SurfaceStatus::Available.probe(OverlayId::Dna).is_ok());
    }
}
