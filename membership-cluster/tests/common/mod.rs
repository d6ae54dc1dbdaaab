#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use membership_cluster::cluster::{Cluster, ClusterSetup};
use membership_cluster::cluster_event::ClusterEvent;
use membership_cluster::config::ClusterConfig;
use membership_core::address::UniqueAddress;
use membership_core::config::core_config::CoreConfig;
use membership_core::config::Config;
use membership_core::event::event_stream::Subscription;
use membership_core::ext::init_logger_with_filter;
use membership_remote::config::RemoteConfig;
use membership_remote::failure_detector::Clock;
use membership_remote::transport::HeartbeatSender;

#[ctor::ctor]
fn init() {
    init_logger_with_filter("membership_core=info,membership_remote=debug,membership_cluster=debug")
}

/// Milliseconds of tokio time, so paused tests drive the detectors too.
#[derive(Debug)]
pub struct TokioClock {
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        Instant::now().duration_since(self.start).as_millis() as i64
    }
}

#[derive(Debug, Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<UniqueAddress>>,
}

impl HeartbeatSender for RecordingSender {
    fn send_heartbeat(&self, to: &UniqueAddress) {
        self.sent.lock().push(to.clone());
    }
}

pub fn node(addr: &str, uid: i64) -> UniqueAddress {
    UniqueAddress::new(addr.parse().unwrap(), uid)
}

pub type Started = (Cluster, Arc<RecordingSender>);

pub fn start_cluster(configure: impl FnOnce(&mut ClusterConfig)) -> anyhow::Result<Started> {
    let mut cluster_config = ClusterConfig::load()?;
    configure(&mut cluster_config);
    let sender = Arc::new(RecordingSender::default());
    let setup = ClusterSetup::builder()
        .address("10.0.0.100:2552".parse()?)
        .uid(1)
        .core(CoreConfig::load()?)
        .remote(RemoteConfig::load()?)
        .cluster(cluster_config)
        .heartbeat_sender(sender.clone())
        .clock(Arc::new(TokioClock::new()))
        .build();
    let cluster = Cluster::start(setup)?;
    Ok((cluster, sender))
}

pub fn join_up(cluster: &Cluster, member: &UniqueAddress) -> anyhow::Result<()> {
    cluster.membership().join(member.clone(), BTreeSet::new())?;
    cluster.membership().up(member)?;
    Ok(())
}

/// Waits for the first event matching `predicate`, skipping the rest.
pub async fn expect_event<F>(
    events: &mut Subscription<ClusterEvent>,
    within: Duration,
    predicate: F,
) -> Option<ClusterEvent>
where
    F: Fn(&ClusterEvent) -> bool,
{
    tokio::time::timeout(within, async {
        while let Some(event) = events.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
