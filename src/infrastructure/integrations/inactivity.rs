//! Threshold-based inactivity classification

use crate::application::ports::InactivityClassifier;
use crate::domain::{ChargingStation, InactivityStatus};

/// Classifies total inactivity against fixed thresholds. The thresholds are
/// site/station configuration in production; these defaults match the usual
/// operator expectations (warn after 30 min idle, error after 60).
pub struct ThresholdInactivityClassifier {
    pub warning_secs: i64,
    pub error_secs: i64,
}

impl Default for ThresholdInactivityClassifier {
    fn default() -> Self {
        Self {
            warning_secs: 1800,
            error_secs: 3600,
        }
    }
}

impl InactivityClassifier for ThresholdInactivityClassifier {
    fn classify(
        &self,
        _station: &ChargingStation,
        _connector_id: u32,
        total_inactivity_secs: i64,
    ) -> InactivityStatus {
        if total_inactivity_secs >= self.error_secs {
            InactivityStatus::Error
        } else if total_inactivity_secs >= self.warning_secs {
            InactivityStatus::Warning
        } else {
            InactivityStatus::Info
        }
    }
}
