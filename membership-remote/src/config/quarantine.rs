use std::time::Duration;

use serde::{Deserialize, Serialize};

use membership_core::config::duration::ConfigDuration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineSettings {
    /// Absent means infinite.
    #[serde(default)]
    pub duration: Option<ConfigDuration>,
    pub sweep_interval: ConfigDuration,
}

impl QuarantineSettings {
    pub fn duration(&self) -> Option<Duration> {
        self.duration.map(|d| d.to_std_duration())
    }
}
