use serde::{Deserialize, Serialize};

use membership_core::config::Config;

use crate::config::failure_detector::FailureDetectorSettings;
use crate::config::quarantine::QuarantineSettings;
use crate::config::watch_failure_detector::WatchFailureDetector;
use crate::REMOTE_CONFIG;

pub mod failure_detector;
pub mod quarantine;
pub mod watch_failure_detector;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub watch_failure_detector: WatchFailureDetector,
    pub quarantine: QuarantineSettings,
}

impl RemoteConfig {
    pub fn detector(&self) -> &FailureDetectorSettings {
        &self.watch_failure_detector.detector
    }
}

impl Config for RemoteConfig {
    fn reference() -> &'static str {
        REMOTE_CONFIG
    }
}
