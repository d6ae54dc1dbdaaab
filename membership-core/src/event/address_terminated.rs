use std::fmt::{Display, Formatter};

use crate::address::UniqueAddress;
use crate::impl_event;

/// Published once a watched remote node is considered gone for good.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct AddressTerminated {
    pub address: UniqueAddress,
}

impl Display for AddressTerminated {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AddressTerminated({})", self.address)
    }
}

impl_event!(AddressTerminated);
