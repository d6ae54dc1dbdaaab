use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use membership_core::address::UniqueAddress;
use membership_core::event::event_stream::{Received, Subscription};

use crate::cluster_event::ClusterEvent;
use crate::member::MemberStatus;
use crate::membership::Membership;

/// Downs members that stayed unreachable for longer than `timeout`.
///
/// Pure bookkeeping, time is passed in; [`AutoDownDaemon`] feeds it from the event bus.
#[derive(Debug)]
pub struct AutoDown {
    timeout: Duration,
    pending: HashMap<UniqueAddress, Instant>,
}

impl AutoDown {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: Default::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts the countdown for `node`. A countdown already running is kept.
    pub fn on_unreachable(&mut self, node: UniqueAddress, now: Instant) {
        let deadline = now + self.timeout;
        self.pending.entry(node).or_insert_with_key(|node| {
            debug!("Auto-down of [{}] scheduled in {:?}", node, self.timeout);
            deadline
        });
    }

    pub fn on_reachable(&mut self, node: &UniqueAddress) {
        if self.pending.remove(node).is_some() {
            debug!("Auto-down of [{}] cancelled, reachable again", node);
        }
    }

    pub fn on_member_removed(&mut self, node: &UniqueAddress) {
        self.pending.remove(node);
    }

    /// Members whose countdown elapsed at `now`; they are no longer tracked afterwards.
    pub fn poll_due(&mut self, now: Instant) -> Vec<UniqueAddress> {
        let due = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(node, _)| node.clone())
            .collect::<Vec<_>>();
        for node in &due {
            self.pending.remove(node);
        }
        due
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Aligns the countdowns with a snapshot of the unreachable members. Countdowns of members
    /// missing from it are dropped, members without one start theirs at `now`.
    pub fn resync<'a, I>(&mut self, unreachable: I, now: Instant)
    where
        I: IntoIterator<Item = &'a UniqueAddress>,
    {
        let unreachable = unreachable.into_iter().collect::<HashSet<_>>();
        self.pending.retain(|node, _| unreachable.contains(node));
        for node in unreachable {
            self.on_unreachable(node.clone(), now);
        }
    }

    pub fn is_pending(&self, node: &UniqueAddress) -> bool {
        self.pending.contains_key(node)
    }
}

pub struct AutoDownDaemon;

impl AutoDownDaemon {
    pub fn spawn(
        policy: AutoDown,
        membership: Membership,
        events: Subscription<ClusterEvent>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(Self::run(policy, membership, events, token))
    }

    async fn run(
        mut policy: AutoDown,
        membership: Membership,
        mut events: Subscription<ClusterEvent>,
        token: CancellationToken,
    ) {
        Self::resync(&mut policy, &membership);
        loop {
            let next_deadline = policy.next_deadline();
            let due = async {
                match next_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("auto-down stopped");
                    break;
                }
                received = events.recv_or_lagged() => {
                    match received {
                        Some(Received::Event(event)) => Self::on_event(&mut policy, event),
                        Some(Received::Lagged(_)) => Self::resync(&mut policy, &membership),
                        None => break,
                    }
                }
                _ = due => {
                    for node in policy.poll_due(Instant::now()) {
                        Self::down(&membership, &node);
                    }
                }
            }
        }
    }

    /// Rebuilds the countdowns from the membership, e.g. when reachability events were lost.
    fn resync(policy: &mut AutoDown, membership: &Membership) {
        let state = membership.current_state();
        let unreachable = state.unreachable.iter().filter(|node| {
            state
                .member(node)
                .is_some_and(|m| m.status.can_transition_to(MemberStatus::Down))
        });
        policy.resync(unreachable, Instant::now());
    }

    fn on_event(policy: &mut AutoDown, event: ClusterEvent) {
        match event {
            ClusterEvent::UnreachableMember(member) => {
                policy.on_unreachable(member.unique_address, Instant::now());
            }
            ClusterEvent::ReachableMember(member) => {
                policy.on_reachable(&member.unique_address);
            }
            ClusterEvent::MemberDowned(member) | ClusterEvent::MemberRemoved { member, .. } => {
                policy.on_member_removed(&member.unique_address);
            }
            _ => {}
        }
    }

    /// Downs `node` only if it is still unreachable right now.
    fn down(membership: &Membership, node: &UniqueAddress) {
        let state = membership.current_state();
        let Some(member) = state.member(node) else {
            return;
        };
        if !state.is_unreachable(node) {
            debug!("Skip auto-down of [{}], reachable again", node);
        } else if !member.status.can_transition_to(MemberStatus::Down) {
            debug!("Skip auto-down of [{}] in status {}", node, member.status);
        } else {
            info!("Auto-downing unreachable member [{}]", node);
            if let Err(error) = membership.down(node) {
                warn!("Auto-down of [{}] failed: {}", node, error);
            }
        }
    }
}
