use serde::{Deserialize, Serialize};

use membership_core::config::duration::ConfigDuration;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureDetectorImpl {
    PhiAccrual,
    Deadline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetectorSettings {
    pub implementation: FailureDetectorImpl,
    pub heartbeat_interval: ConfigDuration,
    pub threshold: f64,
    pub max_sample_size: usize,
    pub min_std_deviation: ConfigDuration,
    pub acceptable_heartbeat_pause: ConfigDuration,
}
