use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use membership_core::address::{Address, UniqueAddress};
use membership_core::config::core_config::CoreConfig;
use membership_core::dead_letter::DeadLetters;
use membership_core::error::Error;
use membership_core::event::event_stream::{EventStream, Subscription};
use membership_core::event::Event;
use membership_core::scheduler::Scheduler;
use membership_remote::config::RemoteConfig;
use membership_remote::failure_detector::default_failure_detector_registry::DefaultFailureDetectorRegistry;
use membership_remote::failure_detector::{detector_factory, Clock, SystemClock};
use membership_remote::quarantine::{QuarantineReason, QuarantineTable};
use membership_remote::remote_watcher::daemon::{RemoteWatcherDaemon, RemoteWatcherRef};
use membership_remote::remote_watcher::{RemoteWatcher, WatcherId, WatcherStats};
use membership_remote::transport::{
    GatedHeartbeatSender, HeartbeatSender, QuarantineGate, Transport,
};

use crate::cluster_event::CurrentClusterState;
use crate::cluster_heartbeat::ClusterHeartbeat;
use crate::config::ClusterConfig;
use crate::downing_provider::{downing_provider, DowningProvider};
use crate::member::Member;
use crate::membership::{Membership, MembershipEvent};

#[derive(Debug, TypedBuilder)]
pub struct ClusterSetup {
    pub address: Address,
    #[builder(default = rand::random())]
    pub uid: i64,
    #[builder(default)]
    pub roles: BTreeSet<String>,
    pub core: CoreConfig,
    pub remote: RemoteConfig,
    pub cluster: ClusterConfig,
    pub heartbeat_sender: Arc<dyn HeartbeatSender>,
    #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)]
    pub clock: Arc<dyn Clock>,
}

/// Handle to the local node's view of the cluster and the daemons keeping it current.
#[derive(Debug, Clone)]
pub struct Cluster {
    inner: Arc<Inner>,
}

#[derive(Debug)]
pub struct Inner {
    self_address: UniqueAddress,
    event_stream: EventStream,
    quarantine: QuarantineTable,
    dead_letters: DeadLetters,
    membership: Membership,
    remote_watcher: RemoteWatcherRef,
    heartbeat: Arc<Mutex<ClusterHeartbeat>>,
    gossip: mpsc::Sender<MembershipEvent>,
    downing: Box<dyn DowningProvider>,
    scheduler: Scheduler,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Deref for Cluster {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Cluster {
    /// Assembles the node and spawns its daemons. Must be called within a tokio runtime.
    pub fn start(setup: ClusterSetup) -> anyhow::Result<Self> {
        let ClusterSetup {
            address,
            uid,
            roles,
            core,
            remote,
            cluster,
            heartbeat_sender,
            clock,
        } = setup;
        let self_address = UniqueAddress::new(address, uid);
        let event_stream = EventStream::new(core.event_bus_capacity);
        let quarantine = QuarantineTable::new(event_stream.clone(), remote.quarantine.duration());
        let dead_letters = DeadLetters::new(event_stream.clone(), core.log_dead_letters);
        let membership = Membership::new(quarantine.clone(), event_stream.clone());
        membership.join(self_address.clone(), roles)?;
        let token = CancellationToken::new();
        let scheduler = Scheduler::new(token.child_token());
        let mut handles = vec![];
        let heartbeat_sender: Arc<dyn HeartbeatSender> = Arc::new(GatedHeartbeatSender::new(
            heartbeat_sender,
            quarantine.clone(),
            dead_letters.clone(),
        ));

        let watch_registry = DefaultFailureDetectorRegistry::<Address>::new(
            clock.clone(),
            detector_factory(remote.detector()).context("remote watch failure detector")?,
        );
        let watcher =
            RemoteWatcher::new(Box::new(watch_registry), quarantine.clone(), event_stream.clone());
        let (remote_watcher, handle) = RemoteWatcherDaemon::spawn(
            watcher,
            &remote.watch_failure_detector,
            heartbeat_sender.clone(),
            token.child_token(),
        );
        handles.push(handle);

        let cluster_registry = DefaultFailureDetectorRegistry::<UniqueAddress>::new(
            clock.clone(),
            detector_factory(&cluster.failure_detector).context("cluster failure detector")?,
        );
        let heartbeat = Arc::new(Mutex::new(ClusterHeartbeat::new(
            self_address.clone(),
            membership.clone(),
            quarantine.clone(),
            dead_letters.clone(),
            cluster_registry,
            clock,
            cluster.heartbeat.expected_response_after.to_std_duration(),
        )));
        {
            let heartbeat = heartbeat.clone();
            scheduler.schedule_with_fixed_delay(
                "cluster-heartbeat",
                None,
                cluster.failure_detector.heartbeat_interval.to_std_duration(),
                move || {
                    for node in heartbeat.lock().heartbeat_targets() {
                        heartbeat_sender.send_heartbeat(&node);
                    }
                },
            );
        }
        {
            let heartbeat = heartbeat.clone();
            scheduler.schedule_with_fixed_delay(
                "cluster-reachability",
                None,
                cluster.heartbeat.reachability_check_interval.to_std_duration(),
                move || heartbeat.lock().check_reachability(),
            );
        }
        {
            let quarantine = quarantine.clone();
            scheduler.schedule_with_fixed_delay(
                "quarantine-sweep",
                None,
                remote.quarantine.sweep_interval.to_std_duration(),
                move || {
                    quarantine.sweep_expired();
                },
            );
        }

        let downing = downing_provider(&cluster.downing);
        let downing_handle =
            downing.spawn_downing(membership.clone(), &event_stream, token.child_token());
        handles.extend(downing_handle);

        let (gossip, gossip_rx) = mpsc::channel(cluster.gossip_inbox_capacity);
        handles.push(tokio::spawn(Self::gossip_loop(
            membership.clone(),
            gossip_rx,
            token.child_token(),
        )));

        info!("Cluster node [{}] started with {}", self_address, downing.name());
        let inner = Inner {
            self_address,
            event_stream,
            quarantine,
            dead_letters,
            membership,
            remote_watcher,
            heartbeat,
            gossip,
            downing,
            scheduler,
            token,
            handles: Mutex::new(handles),
        };
        Ok(Self { inner: inner.into() })
    }

    async fn gossip_loop(
        membership: Membership,
        mut rx: mpsc::Receiver<MembershipEvent>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    if let Err(error) = membership.apply(event) {
                        warn!("Dropping gossip: {}", error);
                    }
                }
            }
        }
        debug!("gossip inbox stopped");
    }

    pub fn self_address(&self) -> &UniqueAddress {
        &self.self_address
    }

    pub fn self_member(&self) -> Option<Member> {
        self.membership.member(&self.self_address)
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn quarantine(&self) -> &QuarantineTable {
        &self.quarantine
    }

    pub fn dead_letters(&self) -> &DeadLetters {
        &self.dead_letters
    }

    pub fn event_stream(&self) -> &EventStream {
        &self.event_stream
    }

    pub fn subscribe<E>(&self) -> Subscription<E>
    where
        E: Event,
    {
        self.event_stream.subscribe::<E>()
    }

    pub fn current_state(&self) -> CurrentClusterState {
        self.membership.current_state()
    }

    /// Applies a leader decision synchronously.
    pub fn apply(&self, event: MembershipEvent) -> Result<bool, Error> {
        self.membership.apply(event)
    }

    /// Queues a gossiped change; changes are applied in the order they were queued.
    pub async fn gossip(&self, event: MembershipEvent) -> anyhow::Result<()> {
        self.gossip
            .send(event)
            .await
            .map_err(|e| anyhow::anyhow!("gossip inbox closed, drop {}", e.0))
    }

    pub fn down(&self, node: &UniqueAddress) -> Result<bool, Error> {
        self.membership.down(node)
    }

    pub fn leave(&self, node: &UniqueAddress) -> Result<bool, Error> {
        self.membership.leave(node)
    }

    /// Operator quarantine of a single incarnation. It cannot be lifted.
    pub fn quarantine_node(&self, node: &UniqueAddress, reason: impl Into<String>) -> bool {
        self.quarantine.quarantine(node, None, QuarantineReason::Manual(reason.into()))
    }

    pub fn watch(&self, watcher: impl Into<WatcherId>, node: UniqueAddress) {
        self.remote_watcher.watch(watcher, node);
    }

    pub fn unwatch(&self, watcher: impl Into<WatcherId>, address: Address) {
        self.remote_watcher.unwatch(watcher, address);
    }

    pub fn watchee_terminated(&self, address: Address) {
        self.remote_watcher.watchee_terminated(address);
    }

    pub async fn watcher_stats(&self) -> Option<WatcherStats> {
        self.remote_watcher.stats().await
    }

    /// Feeds a heartbeat response to both the remote watcher and the member reachability monitor.
    /// Responses from a quarantined incarnation are dead lettered.
    pub fn heartbeat_rsp(&self, from: &UniqueAddress) {
        self.remote_watcher.heartbeat_rsp(from.clone());
        self.heartbeat.lock().heartbeat_rsp(from);
    }

    pub fn gate<T>(&self, transport: T) -> QuarantineGate<T>
    where
        T: Transport,
    {
        QuarantineGate::new(transport, self.quarantine.clone(), self.dead_letters.clone())
    }

    pub fn downing(&self) -> &dyn DowningProvider {
        self.downing.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn shutdown(&self) {
        info!("Cluster node [{}] shutting down", self.self_address);
        self.scheduler.cancel_all();
        self.token.cancel();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(error) = handle.await {
                warn!("daemon task failed: {}", error);
            }
        }
    }
}
