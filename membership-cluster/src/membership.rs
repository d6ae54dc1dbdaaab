use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use membership_core::address::UniqueAddress;
use membership_core::error::Error;
use membership_core::event::event_stream::EventStream;
use membership_remote::quarantine::{QuarantineReason, QuarantineTable};

use crate::cluster_event::{ClusterEvent, CurrentClusterState};
use crate::member::{Member, MemberStatus};

/// Membership changes as decided by the leader and delivered by gossip.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MembershipEvent {
    MemberJoined { node: UniqueAddress, roles: BTreeSet<String> },
    MemberUp(UniqueAddress),
    MemberLeaving(UniqueAddress),
    MemberExiting(UniqueAddress),
    MemberDown(UniqueAddress),
    MemberRemoved { node: UniqueAddress, previous_status: MemberStatus },
}

impl Display for MembershipEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipEvent::MemberJoined { node, .. } => write!(f, "MemberJoined({})", node),
            MembershipEvent::MemberUp(node) => write!(f, "MemberUp({})", node),
            MembershipEvent::MemberLeaving(node) => write!(f, "MemberLeaving({})", node),
            MembershipEvent::MemberExiting(node) => write!(f, "MemberExiting({})", node),
            MembershipEvent::MemberDown(node) => write!(f, "MemberDown({})", node),
            MembershipEvent::MemberRemoved { node, previous_status } => {
                write!(f, "MemberRemoved({}, previous_status={})", node, previous_status)
            }
        }
    }
}

/// The only writer of member state.
///
/// Every applied transition publishes its [`ClusterEvent`] while the state lock is still
/// held, so subscribers observe transitions of a member in the order they happened.
/// `Down -> Removed` quarantines the member's incarnation before `MemberRemoved` is published.
#[derive(Debug, Clone)]
pub struct Membership {
    inner: Arc<Inner>,
}

#[derive(Debug)]
pub struct Inner {
    state: RwLock<State>,
    quarantine: QuarantineTable,
    event_stream: EventStream,
}

#[derive(Debug, Default)]
struct State {
    members: BTreeMap<UniqueAddress, Member>,
    unreachable: BTreeSet<UniqueAddress>,
    removed: BTreeSet<UniqueAddress>,
}

impl Deref for Membership {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Membership {
    pub fn new(quarantine: QuarantineTable, event_stream: EventStream) -> Self {
        let inner = Inner {
            state: RwLock::new(State::default()),
            quarantine,
            event_stream,
        };
        Self { inner: inner.into() }
    }

    pub fn apply(&self, event: MembershipEvent) -> Result<bool, Error> {
        debug!("apply {}", event);
        match event {
            MembershipEvent::MemberJoined { node, roles } => self.join(node, roles),
            MembershipEvent::MemberUp(node) => self.up(&node),
            MembershipEvent::MemberLeaving(node) => self.leave(&node),
            MembershipEvent::MemberExiting(node) => self.exiting(&node),
            MembershipEvent::MemberDown(node) => self.down(&node),
            MembershipEvent::MemberRemoved { node, previous_status } => {
                self.removed(&node, previous_status)
            }
        }
    }

    /// Adds `node` as `Joining`. An older incarnation at the same address is downed.
    ///
    /// A removed or quarantined incarnation can never join again, it has to restart with a new uid.
    pub fn join(&self, node: UniqueAddress, roles: BTreeSet<String>) -> Result<bool, Error> {
        let mut state = self.state.write();
        if state.members.contains_key(&node) {
            return Ok(false);
        }
        if state.removed.contains(&node) || self.quarantine.is_quarantined(&node) {
            warn!("Rejecting join of removed incarnation [{}]", node);
            return Err(Error::IllegalTransition {
                member: node.to_string(),
                from: MemberStatus::Removed.to_string(),
                to: MemberStatus::Joining.to_string(),
            });
        }
        let previous = state
            .members
            .values()
            .filter(|m| m.unique_address.address == node.address)
            .map(|m| m.unique_address.clone())
            .collect::<Vec<_>>();
        for old in previous {
            info!("New incarnation {} joining, downing previous incarnation {}", node, old);
            if let Err(error) = self.transition(&mut state, &old, MemberStatus::Down) {
                warn!("{}", error);
            }
        }
        let member = Member::new(node.clone(), MemberStatus::Joining, roles);
        info!("Member [{}] is Joining", node);
        state.members.insert(node, member.clone());
        self.event_stream.publish(ClusterEvent::MemberJoined(member));
        Ok(true)
    }

    pub fn up(&self, node: &UniqueAddress) -> Result<bool, Error> {
        self.transition(&mut self.state.write(), node, MemberStatus::Up)
    }

    pub fn leave(&self, node: &UniqueAddress) -> Result<bool, Error> {
        self.transition(&mut self.state.write(), node, MemberStatus::Leaving)
    }

    pub fn exiting(&self, node: &UniqueAddress) -> Result<bool, Error> {
        self.transition(&mut self.state.write(), node, MemberStatus::Exiting)
    }

    pub fn down(&self, node: &UniqueAddress) -> Result<bool, Error> {
        self.transition(&mut self.state.write(), node, MemberStatus::Down)
    }

    pub fn remove(&self, node: &UniqueAddress) -> Result<bool, Error> {
        self.transition(&mut self.state.write(), node, MemberStatus::Removed)
    }

    /// Gossip may report a removal before the `Down` or `Exiting` step reached this node.
    /// The missing step is applied first so a removal is only quarantined when it went
    /// through `Down`.
    fn removed(&self, node: &UniqueAddress, previous_status: MemberStatus) -> Result<bool, Error> {
        let mut state = self.state.write();
        let Some(current) = state.members.get(node).map(|m| m.status) else {
            debug!("Member [{}] already removed", node);
            return Ok(false);
        };
        let catch_up = matches!(previous_status, MemberStatus::Down | MemberStatus::Exiting);
        if current != previous_status && catch_up {
            self.transition(&mut state, node, previous_status)?;
        }
        self.transition(&mut state, node, MemberStatus::Removed)
    }

    fn transition(
        &self,
        state: &mut State,
        node: &UniqueAddress,
        to: MemberStatus,
    ) -> Result<bool, Error> {
        let member = state
            .members
            .get(node)
            .ok_or_else(|| Error::UnknownMember(node.to_string()))?;
        let from = member.status;
        if from == to {
            return Ok(false);
        }
        if !from.can_transition_to(to) {
            warn!("Ignoring illegal transition of [{}] from {} to {}", node, from, to);
            return Err(Error::IllegalTransition {
                member: node.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let member = member.copy(to);
        match to {
            MemberStatus::Removed => {
                if from == MemberStatus::Down {
                    self.quarantine.quarantine(node, None, QuarantineReason::RemovedFromDown);
                }
                state.members.remove(node);
                state.unreachable.remove(node);
                state.removed.insert(node.clone());
                info!("Member [{}] removed, previous status {}", node, from);
            }
            MemberStatus::Down => {
                warn!("Marking member [{}] as Down", node);
                state.members.insert(node.clone(), member.clone());
            }
            _ => {
                info!("Member [{}] is {}", node, to);
                state.members.insert(node.clone(), member.clone());
            }
        }
        self.event_stream.publish(ClusterEvent::for_status(member, from));
        Ok(true)
    }

    /// Publishes `UnreachableMember` the first time `node` is reported. Status is left alone.
    pub fn mark_unreachable(&self, node: &UniqueAddress) -> bool {
        let mut state = self.state.write();
        let Some(member) = state.members.get(node).cloned() else {
            return false;
        };
        if state.unreachable.insert(node.clone()) {
            warn!("Member [{}] is unreachable", node);
            self.event_stream.publish(ClusterEvent::UnreachableMember(member));
            true
        } else {
            false
        }
    }

    pub fn mark_reachable(&self, node: &UniqueAddress) -> bool {
        let mut state = self.state.write();
        if !state.unreachable.remove(node) {
            return false;
        }
        match state.members.get(node) {
            Some(member) => {
                info!("Member [{}] is reachable again", node);
                self.event_stream.publish(ClusterEvent::ReachableMember(member.clone()));
                true
            }
            None => false,
        }
    }

    pub fn member(&self, node: &UniqueAddress) -> Option<Member> {
        self.state.read().members.get(node).cloned()
    }

    pub fn members(&self) -> Vec<Member> {
        self.state.read().members.values().cloned().collect()
    }

    pub fn current_state(&self) -> CurrentClusterState {
        let state = self.state.read();
        CurrentClusterState {
            members: state.members.clone(),
            unreachable: state.unreachable.clone(),
        }
    }
}
