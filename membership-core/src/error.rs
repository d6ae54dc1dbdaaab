use std::net::AddrParseError;

use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("address {addr} is invalid, expected host:port")]
    InvalidAddress {
        addr: String,
        #[source]
        source: AddrParseError,
    },
    #[error("member {member} cannot move from {from} to {to}")]
    IllegalTransition {
        member: String,
        from: String,
        to: String,
    },
    #[error("member {0} not found")]
    UnknownMember(String),
    #[error("invalid failure detector setting: {0}")]
    InvalidFailureDetector(String),
    #[error("transport failed to deliver to {to}: {reason}")]
    Transport {
        to: String,
        reason: String,
    },
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
