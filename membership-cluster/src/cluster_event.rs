use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use membership_core::address::UniqueAddress;
use membership_core::impl_event;

use crate::member::{Member, MemberStatus};

/// Member lifecycle and reachability changes, in the order they were applied.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ClusterEvent {
    MemberJoined(Member),
    MemberUp(Member),
    MemberLeft(Member),
    MemberExited(Member),
    MemberDowned(Member),
    MemberRemoved { member: Member, previous_status: MemberStatus },
    UnreachableMember(Member),
    ReachableMember(Member),
}

impl_event!(ClusterEvent);

impl ClusterEvent {
    pub fn member(&self) -> &Member {
        match self {
            ClusterEvent::MemberJoined(m)
            | ClusterEvent::MemberUp(m)
            | ClusterEvent::MemberLeft(m)
            | ClusterEvent::MemberExited(m)
            | ClusterEvent::MemberDowned(m)
            | ClusterEvent::UnreachableMember(m)
            | ClusterEvent::ReachableMember(m) => m,
            ClusterEvent::MemberRemoved { member, .. } => member,
        }
    }

    /// The lifecycle event announcing `member` in its current status.
    pub(crate) fn for_status(member: Member, previous_status: MemberStatus) -> Self {
        match member.status {
            MemberStatus::Joining => ClusterEvent::MemberJoined(member),
            MemberStatus::Up => ClusterEvent::MemberUp(member),
            MemberStatus::Leaving => ClusterEvent::MemberLeft(member),
            MemberStatus::Exiting => ClusterEvent::MemberExited(member),
            MemberStatus::Down => ClusterEvent::MemberDowned(member),
            MemberStatus::Removed => ClusterEvent::MemberRemoved { member, previous_status },
        }
    }
}

impl Display for ClusterEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterEvent::MemberJoined(m) => write!(f, "MemberJoined({})", m),
            ClusterEvent::MemberUp(m) => write!(f, "MemberUp({})", m),
            ClusterEvent::MemberLeft(m) => write!(f, "MemberLeft({})", m),
            ClusterEvent::MemberExited(m) => write!(f, "MemberExited({})", m),
            ClusterEvent::MemberDowned(m) => write!(f, "MemberDowned({})", m),
            ClusterEvent::MemberRemoved { member, previous_status } => {
                write!(f, "MemberRemoved({}, previous_status={})", member, previous_status)
            }
            ClusterEvent::UnreachableMember(m) => write!(f, "UnreachableMember({})", m),
            ClusterEvent::ReachableMember(m) => write!(f, "ReachableMember({})", m),
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CurrentClusterState {
    pub members: BTreeMap<UniqueAddress, Member>,
    pub unreachable: BTreeSet<UniqueAddress>,
}

impl CurrentClusterState {
    pub fn member(&self, node: &UniqueAddress) -> Option<&Member> {
        self.members.get(node)
    }

    pub fn is_unreachable(&self, node: &UniqueAddress) -> bool {
        self.unreachable.contains(node)
    }
}

impl Display for CurrentClusterState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CurrentClusterState {{ members: [{}], unreachable: [{}] }}",
            self.members.values().join(", "),
            self.unreachable.iter().join(", "),
        )
    }
}
