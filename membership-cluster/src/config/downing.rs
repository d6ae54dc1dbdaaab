use serde::{Deserialize, Serialize};

use membership_core::config::duration::ConfigDuration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DowningSettings {
    pub auto_down_enabled: bool,
    pub auto_down_timeout: ConfigDuration,
}
