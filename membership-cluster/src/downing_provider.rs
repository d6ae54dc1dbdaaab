use std::fmt::Debug;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use membership_core::event::event_stream::EventStream;

use crate::auto_down::{AutoDown, AutoDownDaemon};
use crate::cluster_event::ClusterEvent;
use crate::config::downing::DowningSettings;
use crate::membership::Membership;

/// Below this, a slow node is easily mistaken for a dead one.
pub const SAFE_AUTO_DOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Decides who turns unreachable members into `Down`.
pub trait DowningProvider: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Spawns the downing daemon, if this provider needs one.
    fn spawn_downing(
        &self,
        membership: Membership,
        event_stream: &EventStream,
        token: CancellationToken,
    ) -> Option<JoinHandle<()>>;
}

/// Downing is left to an operator or an external leader.
#[derive(Debug, Copy, Clone, Default)]
pub struct NoDowning;

impl DowningProvider for NoDowning {
    fn name(&self) -> &'static str {
        "no-downing"
    }

    fn spawn_downing(
        &self,
        _: Membership,
        _: &EventStream,
        _: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        None
    }
}

#[derive(Debug, Copy, Clone)]
pub struct AutoDowning {
    pub timeout: Duration,
}

impl AutoDowning {
    pub fn new(timeout: Duration) -> Self {
        warn!(
            "Auto-down is enabled with a timeout of {:?}. Members unreachable that long are \
            downed and quarantined, a network partition will split the cluster in two.",
            timeout
        );
        if timeout < SAFE_AUTO_DOWN_TIMEOUT {
            warn!(
                "Auto-down timeout {:?} is below {:?}, a long GC pause or a congested link \
                will down healthy members.",
                timeout, SAFE_AUTO_DOWN_TIMEOUT
            );
        }
        Self { timeout }
    }
}

impl DowningProvider for AutoDowning {
    fn name(&self) -> &'static str {
        "auto-downing"
    }

    fn spawn_downing(
        &self,
        membership: Membership,
        event_stream: &EventStream,
        token: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let events = event_stream.subscribe::<ClusterEvent>();
        let handle = AutoDownDaemon::spawn(AutoDown::new(self.timeout), membership, events, token);
        Some(handle)
    }
}

pub fn downing_provider(settings: &DowningSettings) -> Box<dyn DowningProvider> {
    if settings.auto_down_enabled {
        Box::new(AutoDowning::new(settings.auto_down_timeout.to_std_duration()))
    } else {
        Box::new(NoDowning)
    }
}

#[cfg(test)]
mod tests {
    use membership_core::config::duration::ConfigDuration;

    use crate::config::downing::DowningSettings;
    use crate::downing_provider::downing_provider;

    #[test]
    fn provider_from_settings() {
        let disabled = DowningSettings {
            auto_down_enabled: false,
            auto_down_timeout: ConfigDuration::from_secs(30),
        };
        assert_eq!(downing_provider(&disabled).name(), "no-downing");
        let enabled = DowningSettings {
            auto_down_enabled: true,
            auto_down_timeout: ConfigDuration::from_secs(5),
        };
        assert_eq!(downing_provider(&enabled).name(), "auto-downing");
    }
}
