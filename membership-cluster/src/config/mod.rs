use serde::{Deserialize, Serialize};

use membership_core::config::Config;
use membership_remote::config::failure_detector::FailureDetectorSettings;

use crate::config::downing::DowningSettings;
use crate::config::heartbeat::HeartbeatSettings;
use crate::CLUSTER_CONFIG;

pub mod downing;
pub mod heartbeat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub failure_detector: FailureDetectorSettings,
    pub heartbeat: HeartbeatSettings,
    pub downing: DowningSettings,
    pub gossip_inbox_capacity: usize,
}

impl Config for ClusterConfig {
    fn reference() -> &'static str {
        CLUSTER_CONFIG
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use membership_core::config::Config;

    use crate::config::ClusterConfig;

    #[test]
    fn load_reference() -> anyhow::Result<()> {
        let config = ClusterConfig::load()?;
        assert!(!config.downing.auto_down_enabled);
        assert_eq!(config.downing.auto_down_timeout.to_std_duration(), Duration::from_secs(30));
        let pause = config.failure_detector.acceptable_heartbeat_pause.to_std_duration();
        assert_eq!(pause, Duration::from_secs(3));
        let first_response = config.heartbeat.expected_response_after.to_std_duration();
        assert_eq!(first_response, Duration::from_secs(1));
        Ok(())
    }

    #[test]
    fn override_downing() -> anyhow::Result<()> {
        let config = ClusterConfig::builder()
            .add_toml("[downing]\nauto_down_enabled = true\nauto_down_timeout = { seconds = 5 }")
            .build()?;
        assert!(config.downing.auto_down_enabled);
        assert_eq!(config.downing.auto_down_timeout.to_std_duration(), Duration::from_secs(5));
        assert_eq!(config.failure_detector.threshold, 10.0);
        Ok(())
    }
}
