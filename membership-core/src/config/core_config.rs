use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::CORE_CONFIG;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Per-subscriber queue length of the event stream.
    pub event_bus_capacity: usize,
    /// How many dead letters are logged before logging is suppressed. They are still counted.
    pub log_dead_letters: u64,
}

impl Config for CoreConfig {
    fn reference() -> &'static str {
        CORE_CONFIG
    }
}

#[cfg(test)]
mod tests {
    use config::Environment;

    use crate::config::core_config::CoreConfig;
    use crate::config::Config;

    #[test]
    fn load_reference() -> anyhow::Result<()> {
        let config = CoreConfig::load()?;
        assert_eq!(config.event_bus_capacity, 1024);
        assert_eq!(config.log_dead_letters, 10);
        Ok(())
    }

    #[test]
    fn user_source_overrides_reference() -> anyhow::Result<()> {
        let config = CoreConfig::builder()
            .add_toml("event_bus_capacity = 16")
            .add_source(Environment::with_prefix("MEMBERSHIP_CORE_TEST_UNSET"))
            .build()?;
        assert_eq!(config.event_bus_capacity, 16);
        assert_eq!(config.log_dead_letters, 10);
        Ok(())
    }
}
