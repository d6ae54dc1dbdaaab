use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Stable network-level identity of a node (`host:port`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Address {
    pub addr: SocketAddr,
}

impl Address {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr = s.parse::<SocketAddr>().map_err(|source| Error::InvalidAddress {
            addr: s.to_string(),
            source,
        })?;
        Ok(Self { addr })
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// An [`Address`] together with the incarnation id of the process living there.
///
/// A process restarted on the same address gets a new `uid` and is a different peer:
/// anything keyed on a `UniqueAddress`, quarantine in particular, does not carry over.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct UniqueAddress {
    pub address: Address,
    pub uid: i64,
}

impl UniqueAddress {
    pub fn new(address: Address, uid: i64) -> Self {
        Self { address, uid }
    }

    /// A fresh incarnation at `address`.
    pub fn random(address: Address) -> Self {
        Self {
            address,
            uid: rand::random(),
        }
    }

    pub fn socket_addr(&self) -> &SocketAddr {
        &self.address.addr
    }
}

impl Display for UniqueAddress {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "UniqueAddress({},{})", self.address, self.uid)
    }
}

#[cfg(test)]
mod tests {
    use crate::address::{Address, UniqueAddress};
    use crate::error::Error;

    #[test]
    fn parse_host_port() -> anyhow::Result<()> {
        let address: Address = "10.0.0.1:2552".parse()?;
        assert_eq!(address.addr.port(), 2552);
        assert_eq!(address.to_string(), "10.0.0.1:2552");
        Ok(())
    }

    #[test]
    fn reject_address_without_port() {
        let err = "10.0.0.1".parse::<Address>().unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
    }

    #[test]
    fn incarnations_at_same_address_differ() -> anyhow::Result<()> {
        let address: Address = "127.0.0.1:2552".parse()?;
        let a = UniqueAddress::new(address, 1);
        let b = UniqueAddress::new(address, 2);
        assert_ne!(a, b);
        assert_eq!(a.address, b.address);
        assert_eq!(a.to_string(), "UniqueAddress(127.0.0.1:2552,1)");
        Ok(())
    }
}
