use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::address::UniqueAddress;
use crate::event::event_stream::EventStream;
use crate::impl_event;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// A message that could not be delivered, e.g. because the peer is quarantined.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeadLetter {
    pub peer: UniqueAddress,
    pub direction: Direction,
    pub message: String,
}

impl Display for DeadLetter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.direction {
            Direction::Outbound => write!(f, "DeadLetter({} to {})", self.message, self.peer),
            Direction::Inbound => write!(f, "DeadLetter({} from {})", self.message, self.peer),
        }
    }
}

impl_event!(DeadLetter);

/// Counts undeliverable messages and republishes them on the event stream.
#[derive(Debug, Clone)]
pub struct DeadLetters {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    count: AtomicU64,
    log_limit: u64,
    event_stream: EventStream,
}

impl DeadLetters {
    pub fn new(event_stream: EventStream, log_limit: u64) -> Self {
        let inner = Inner {
            count: AtomicU64::new(0),
            log_limit,
            event_stream,
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn publish(&self, letter: DeadLetter) {
        let count = self.inner.count.fetch_add(1, Ordering::Relaxed) + 1;
        if count <= self.inner.log_limit {
            info!("{}, {} dead letters so far", letter, count);
            if count == self.inner.log_limit {
                info!(
                    "dead letter logging limit {} reached, further dead letters are only counted",
                    count
                );
            }
        }
        self.inner.event_stream.publish(letter);
    }

    pub fn count(&self) -> u64 {
        self.inner.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use crate::address::UniqueAddress;
    use crate::dead_letter::{DeadLetter, DeadLetters, Direction};
    use crate::event::event_stream::EventStream;

    #[test]
    fn count_beyond_log_limit() -> anyhow::Result<()> {
        let stream = EventStream::new(8);
        let mut letters = stream.subscribe::<DeadLetter>();
        let dead_letters = DeadLetters::new(stream, 1);
        let peer = UniqueAddress::new("127.0.0.1:2552".parse()?, 7);
        for _ in 0..3 {
            dead_letters.publish(DeadLetter {
                peer: peer.clone(),
                direction: Direction::Outbound,
                message: "Ping".to_string(),
            });
        }
        assert_eq!(dead_letters.count(), 3);
        assert_eq!(letters.drain().len(), 3);
        Ok(())
    }
}
