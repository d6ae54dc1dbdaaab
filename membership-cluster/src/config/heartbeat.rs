use serde::{Deserialize, Serialize};

use membership_core::config::duration::ConfigDuration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    /// Grace period before a member that never answered starts being monitored.
    pub expected_response_after: ConfigDuration,
    pub reachability_check_interval: ConfigDuration,
}
