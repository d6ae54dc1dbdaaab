use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use membership_core::address::UniqueAddress;
use membership_core::event::event_stream::EventStream;
use membership_core::impl_event;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum QuarantineReason {
    /// The transport gave up on the association.
    HopelessAssociation,
    /// A watched node stopped answering heartbeats.
    WatchUnreachable,
    /// The member was removed after being downed.
    RemovedFromDown,
    Manual(String),
}

impl Display for QuarantineReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QuarantineReason::HopelessAssociation => write!(f, "hopeless association"),
            QuarantineReason::WatchUnreachable => write!(f, "watched node unreachable"),
            QuarantineReason::RemovedFromDown => write!(f, "removed from down"),
            QuarantineReason::Manual(why) => write!(f, "manual: {}", why),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuarantineEntry {
    pub unique_address: UniqueAddress,
    pub reason: QuarantineReason,
    pub banned_at: Instant,
    pub expires_at: Option<Instant>,
}

/// Published once per newly created quarantine entry.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct QuarantinedEvent {
    pub unique_address: UniqueAddress,
    pub reason: QuarantineReason,
}

impl Display for QuarantinedEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Quarantined({}, {})", self.unique_address, self.reason)
    }
}

impl_event!(QuarantinedEvent);

/// The set of banned incarnations. An entry, once inserted, only goes away through
/// [`QuarantineTable::sweep_expired`] after its ttl, or with the local process.
#[derive(Debug, Clone)]
pub struct QuarantineTable {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    entries: DashMap<UniqueAddress, QuarantineEntry, ahash::RandomState>,
    default_ttl: Option<Duration>,
    event_stream: EventStream,
}

impl QuarantineTable {
    /// `default_ttl` of `None` quarantines forever.
    pub fn new(event_stream: EventStream, default_ttl: Option<Duration>) -> Self {
        let inner = Inner {
            entries: DashMap::default(),
            default_ttl,
            event_stream,
        };
        Self { inner: Arc::new(inner) }
    }

    /// Bans `unique_address`. Returns `false` if it was already banned, in which case the
    /// existing entry, its expiry included, is left untouched.
    pub fn quarantine(
        &self,
        unique_address: &UniqueAddress,
        ttl: Option<Duration>,
        reason: QuarantineReason,
    ) -> bool {
        let created = match self.inner.entries.entry(unique_address.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                let banned_at = Instant::now();
                let expires_at = ttl.or(self.inner.default_ttl).map(|ttl| banned_at + ttl);
                v.insert(QuarantineEntry {
                    unique_address: unique_address.clone(),
                    reason: reason.clone(),
                    banned_at,
                    expires_at,
                });
                true
            }
        };
        if created {
            warn!(
                "quarantined {} ({}), all traffic to and from it is dropped",
                unique_address, reason
            );
            let event = QuarantinedEvent {
                unique_address: unique_address.clone(),
                reason,
            };
            self.inner.event_stream.publish(event);
        } else {
            debug!("{} is already quarantined", unique_address);
        }
        created
    }

    pub fn is_quarantined(&self, unique_address: &UniqueAddress) -> bool {
        self.inner.entries.contains_key(unique_address)
    }

    pub fn get(&self, unique_address: &UniqueAddress) -> Option<QuarantineEntry> {
        self.inner.entries.get(unique_address).map(|e| e.value().clone())
    }

    pub fn entries(&self) -> Vec<QuarantineEntry> {
        self.inner.entries.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn sweep_expired(&self) -> Vec<UniqueAddress> {
        self.sweep_expired_at(Instant::now())
    }

    /// Drops entries whose expiry is at or before `now`, returning them.
    pub fn sweep_expired_at(&self, now: Instant) -> Vec<UniqueAddress> {
        let mut expired = vec![];
        self.inner.entries.retain(|unique_address, entry| match entry.expires_at {
            Some(expires_at) if expires_at <= now => {
                expired.push(unique_address.clone());
                false
            }
            _ => true,
        });
        for unique_address in &expired {
            info!("quarantine of {} expired", unique_address);
        }
        expired
    }
}
