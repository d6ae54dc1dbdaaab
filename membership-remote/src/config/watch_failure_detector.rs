use serde::{Deserialize, Serialize};

use membership_core::config::duration::ConfigDuration;

use crate::config::failure_detector::FailureDetectorSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchFailureDetector {
    pub detector: FailureDetectorSettings,
    pub unreachable_nodes_reaper_interval: ConfigDuration,
    pub expected_response_after: ConfigDuration,
}
