use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use membership_core::address::UniqueAddress;

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub unique_address: UniqueAddress,
    pub status: MemberStatus,
    pub roles: BTreeSet<String>,
}

impl Member {
    pub fn new(
        unique_address: UniqueAddress,
        status: MemberStatus,
        roles: BTreeSet<String>,
    ) -> Self {
        Self {
            unique_address,
            status,
            roles,
        }
    }

    pub(crate) fn copy(&self, status: MemberStatus) -> Self {
        let mut member = self.clone();
        member.status = status;
        member
    }
}

impl Display for Member {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Member({}, {}, roles=[{}])",
            self.unique_address,
            self.status,
            self.roles.iter().join(", ")
        )
    }
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    Joining,
    Up,
    Leaving,
    Exiting,
    Down,
    Removed,
}

impl MemberStatus {
    /// Edges of the member lifecycle. Staying in the same status is not a transition.
    pub fn can_transition_to(&self, to: MemberStatus) -> bool {
        use MemberStatus::*;
        matches!(
            (self, to),
            (Joining, Up)
                | (Joining, Down)
                | (Up, Leaving)
                | (Up, Down)
                | (Leaving, Exiting)
                | (Leaving, Down)
                | (Exiting, Removed)
                | (Down, Removed)
        )
    }
}

impl Display for MemberStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MemberStatus::Joining => "Joining",
            MemberStatus::Up => "Up",
            MemberStatus::Leaving => "Leaving",
            MemberStatus::Exiting => "Exiting",
            MemberStatus::Down => "Down",
            MemberStatus::Removed => "Removed",
        };
        write!(f, "{}", name)
    }
}
