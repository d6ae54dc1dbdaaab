use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::ops::Not;

use tracing::{debug, info, warn};

use membership_core::address::{Address, UniqueAddress};
use membership_core::event::address_terminated::AddressTerminated;
use membership_core::event::event_stream::EventStream;

use crate::failure_detector::failure_detector_registry::FailureDetectorRegistry;
use crate::quarantine::{QuarantineReason, QuarantineTable};

pub mod daemon;

/// Identity of a local entity watching remote nodes.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WatcherId(String);

impl From<&str> for WatcherId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WatcherId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for WatcherId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct HeartbeatTargets {
    pub heartbeat: Vec<UniqueAddress>,
    /// Watched nodes that never answered yet.
    pub expect_first: Vec<Address>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct WatcherStats {
    pub watching: usize,
    pub watching_nodes: BTreeSet<UniqueAddress>,
    pub unreachable: BTreeSet<Address>,
}

/// Remote death watch: which local watchers care about which remote nodes, and the
/// reaping of nodes whose failure detector gave up on them.
///
/// Only nodes with at least one watcher are ever reaped. A reaped node is quarantined
/// before [`AddressTerminated`] is published for it.
#[derive(Debug)]
pub struct RemoteWatcher {
    failure_detector: Box<dyn FailureDetectorRegistry<A = Address>>,
    quarantine: QuarantineTable,
    event_stream: EventStream,
    watchers_by_node: HashMap<Address, HashSet<WatcherId>>,
    address_uids: HashMap<Address, i64>,
    unreachable: HashSet<Address>,
}

impl RemoteWatcher {
    pub fn new(
        failure_detector: Box<dyn FailureDetectorRegistry<A = Address>>,
        quarantine: QuarantineTable,
        event_stream: EventStream,
    ) -> Self {
        Self {
            failure_detector,
            quarantine,
            event_stream,
            watchers_by_node: Default::default(),
            address_uids: Default::default(),
            unreachable: Default::default(),
        }
    }

    pub fn watch(&mut self, watcher: WatcherId, node: &UniqueAddress) -> bool {
        let address = node.address;
        match self.address_uids.get(&address) {
            Some(uid) if *uid != node.uid => {
                info!(
                    "Watching new incarnation {} of [{}], previous uid {}",
                    node.uid, address, uid
                );
                self.unreachable.remove(&address);
                self.failure_detector.remove(&address);
                self.address_uids.insert(address, node.uid);
            }
            Some(_) => {}
            None => {
                self.address_uids.insert(address, node.uid);
            }
        }
        debug!("Watching: [{} -> {}]", watcher, node);
        match self.watchers_by_node.entry(address) {
            Entry::Occupied(mut o) => o.get_mut().insert(watcher),
            Entry::Vacant(v) => {
                let mut watchers = HashSet::new();
                watchers.insert(watcher);
                v.insert(watchers);
                true
            }
        }
    }

    pub fn unwatch(&mut self, watcher: &WatcherId, address: &Address) -> bool {
        let Some(watchers) = self.watchers_by_node.get_mut(address) else {
            return false;
        };
        let removed = watchers.remove(watcher);
        if removed {
            debug!("Unwatching: [{} -> {}]", watcher, address);
        }
        if watchers.is_empty() {
            debug!("Unwatched last watcher of node: [{}]", address);
            self.unwatch_node(address);
        }
        removed
    }

    /// The remote side told us it is gone; every watch on it is dropped.
    pub fn watchee_terminated(&mut self, address: &Address) {
        if self.watchers_by_node.contains_key(address) {
            debug!("Watchee terminated: [{}]", address);
            self.unwatch_node(address);
        }
    }

    fn unwatch_node(&mut self, address: &Address) {
        self.watchers_by_node.remove(address);
        self.address_uids.remove(address);
        self.unreachable.remove(address);
        self.failure_detector.remove(address);
    }

    fn unique_address(&self, address: &Address) -> Option<UniqueAddress> {
        self.address_uids
            .get(address)
            .map(|uid| UniqueAddress::new(*address, *uid))
    }

    pub fn heartbeat_tick(&self) -> HeartbeatTargets {
        let mut targets = HeartbeatTargets::default();
        for address in self.watchers_by_node.keys() {
            if self.unreachable.contains(address) {
                continue;
            }
            let Some(node) = self.unique_address(address) else {
                continue;
            };
            if self.quarantine.is_quarantined(&node) {
                debug!("Not sending Heartbeat to quarantined [{}]", node);
                continue;
            }
            if self.failure_detector.is_monitoring(address) {
                debug!("Sending Heartbeat to [{}]", address);
            } else {
                debug!("Sending first Heartbeat to [{}]", address);
                targets.expect_first.push(*address);
            }
            targets.heartbeat.push(node);
        }
        targets
    }

    /// Starts the detector clock for a watched node that never answered, so that a node
    /// which is dead from the start still becomes unreachable.
    pub fn expected_first_heartbeat(&mut self, address: &Address) {
        if self.watchers_by_node.contains_key(address)
            && self.failure_detector.is_monitoring(address).not()
        {
            debug!("Trigger extra expected heartbeat from [{}]", address);
            self.failure_detector.heartbeat(*address);
        }
    }

    pub fn receive_heartbeat_rsp(&mut self, from: &UniqueAddress) {
        if self.quarantine.is_quarantined(from) {
            debug!("Ignoring heartbeat rsp from quarantined [{}]", from);
            return;
        }
        let address = from.address;
        if self.failure_detector.is_monitoring(&address) {
            debug!("Received heartbeat rsp from [{}]", from);
        } else {
            debug!("Received first heartbeat rsp from [{}]", from);
        }
        if self.watchers_by_node.contains_key(&address)
            && self.unreachable.contains(&address).not()
        {
            if self.address_uids.get(&address) != Some(&from.uid) {
                info!("Re-watch [{}], incarnation changed to {}", address, from.uid);
                self.address_uids.insert(address, from.uid);
                self.failure_detector.remove(&address);
            }
            self.failure_detector.heartbeat(address);
        }
    }

    /// Quarantines and terminates every watched node the failure detector considers unavailable.
    pub fn reap_unreachable(&mut self) -> Vec<UniqueAddress> {
        let candidates = self
            .watchers_by_node
            .keys()
            .filter(|address| {
                self.unreachable.contains(*address).not()
                    && self.failure_detector.is_available(*address).not()
            })
            .copied()
            .collect::<Vec<_>>();
        let mut reaped = Vec::with_capacity(candidates.len());
        for address in candidates {
            let Some(node) = self.unique_address(&address) else {
                continue;
            };
            warn!("Detected unreachable: [{}]", node);
            self.quarantine.quarantine(&node, None, QuarantineReason::WatchUnreachable);
            self.event_stream.publish(AddressTerminated { address: node.clone() });
            self.unreachable.insert(address);
            reaped.push(node);
        }
        reaped
    }

    pub fn stats(&self) -> WatcherStats {
        WatcherStats {
            watching: self.watchers_by_node.values().map(|w| w.len()).sum(),
            watching_nodes: self
                .watchers_by_node
                .keys()
                .filter_map(|address| self.unique_address(address))
                .collect(),
            unreachable: self.unreachable.iter().copied().collect(),
        }
    }
}
