use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use membership_core::address::UniqueAddress;
use membership_core::dead_letter::{DeadLetter, DeadLetters, Direction};
use membership_core::error::Error;

use crate::quarantine::QuarantineTable;

/// The wire, as far as this crate is concerned.
#[async_trait]
pub trait Transport: Send + Sync {
    type Message: Debug + Send + 'static;

    async fn send(&self, to: &UniqueAddress, message: Self::Message) -> anyhow::Result<()>;
}

/// Sends liveness probes. Responses come back through whoever owns the detector.
pub trait HeartbeatSender: Debug + Send + Sync {
    fn send_heartbeat(&self, to: &UniqueAddress);
}

/// [`HeartbeatSender`] that dead letters heartbeats addressed to a quarantined incarnation.
#[derive(Debug)]
pub struct GatedHeartbeatSender {
    sender: Arc<dyn HeartbeatSender>,
    quarantine: QuarantineTable,
    dead_letters: DeadLetters,
}

impl GatedHeartbeatSender {
    pub fn new(
        sender: Arc<dyn HeartbeatSender>,
        quarantine: QuarantineTable,
        dead_letters: DeadLetters,
    ) -> Self {
        Self {
            sender,
            quarantine,
            dead_letters,
        }
    }
}

impl HeartbeatSender for GatedHeartbeatSender {
    fn send_heartbeat(&self, to: &UniqueAddress) {
        if self.quarantine.is_quarantined(to) {
            let letter = DeadLetter {
                peer: to.clone(),
                direction: Direction::Outbound,
                message: "Heartbeat".to_string(),
            };
            self.dead_letters.publish(letter);
        } else {
            self.sender.send_heartbeat(to);
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Delivery {
    Sent,
    DeadLettered,
}

/// Wraps a [`Transport`] so that nothing reaches or leaves a quarantined incarnation.
///
/// Dropped traffic goes to [`DeadLetters`]; it is not an error for the caller.
#[derive(Debug)]
pub struct QuarantineGate<T> {
    transport: T,
    quarantine: QuarantineTable,
    dead_letters: DeadLetters,
}

impl<T> QuarantineGate<T>
where
    T: Transport,
{
    pub fn new(transport: T, quarantine: QuarantineTable, dead_letters: DeadLetters) -> Self {
        Self {
            transport,
            quarantine,
            dead_letters,
        }
    }

    pub async fn send(&self, to: &UniqueAddress, message: T::Message) -> Result<Delivery, Error> {
        if self.quarantine.is_quarantined(to) {
            self.dead_letter(to, Direction::Outbound, &message);
            return Ok(Delivery::DeadLettered);
        }
        self.transport.send(to, message).await.map_err(|e| Error::Transport {
            to: to.to_string(),
            reason: format!("{:#}", e),
        })?;
        trace!("sent message to {}", to);
        Ok(Delivery::Sent)
    }

    /// Inbound side of the gate, `None` if the message must not be processed.
    pub fn receive(&self, from: &UniqueAddress, message: T::Message) -> Option<T::Message> {
        if self.quarantine.is_quarantined(from) {
            self.dead_letter(from, Direction::Inbound, &message);
            None
        } else {
            Some(message)
        }
    }

    fn dead_letter(&self, peer: &UniqueAddress, direction: Direction, message: &T::Message) {
        let letter = DeadLetter {
            peer: peer.clone(),
            direction,
            message: format!("{:?}", message),
        };
        self.dead_letters.publish(letter);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use membership_core::address::UniqueAddress;
    use membership_core::dead_letter::{DeadLetter, DeadLetters, Direction};
    use membership_core::error::Error;
    use membership_core::event::event_stream::EventStream;

    use crate::quarantine::{QuarantineReason, QuarantineTable};
    use crate::transport::{
        Delivery, GatedHeartbeatSender, HeartbeatSender, QuarantineGate, Transport,
    };

    #[derive(Debug, Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(UniqueAddress, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        type Message = String;

        async fn send(&self, to: &UniqueAddress, message: Self::Message) -> anyhow::Result<()> {
            if self.fail {
                return Err(anyhow!("connection reset"));
            }
            self.sent.lock().push((to.clone(), message));
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct RecordingSender {
        sent: Mutex<Vec<UniqueAddress>>,
    }

    impl HeartbeatSender for RecordingSender {
        fn send_heartbeat(&self, to: &UniqueAddress) {
            self.sent.lock().push(to.clone());
        }
    }

    type Gate = QuarantineGate<RecordingTransport>;

    fn gate(transport: RecordingTransport) -> (Gate, QuarantineTable, DeadLetters, EventStream) {
        let stream = EventStream::new(16);
        let quarantine = QuarantineTable::new(stream.clone(), None);
        let dead_letters = DeadLetters::new(stream.clone(), 10);
        let gate = QuarantineGate::new(transport, quarantine.clone(), dead_letters.clone());
        (gate, quarantine, dead_letters, stream)
    }

    fn peer(uid: i64) -> UniqueAddress {
        UniqueAddress::new("10.0.0.2:2552".parse().unwrap(), uid)
    }

    #[tokio::test]
    async fn send_to_quarantined_peer_is_dead_lettered() -> anyhow::Result<()> {
        let (gate, quarantine, dead_letters, stream) = gate(RecordingTransport::default());
        let mut letters = stream.subscribe::<DeadLetter>();
        assert_eq!(gate.send(&peer(1), "before".to_string()).await?, Delivery::Sent);
        quarantine.quarantine(&peer(1), None, QuarantineReason::HopelessAssociation);
        assert_eq!(gate.send(&peer(1), "after".to_string()).await?, Delivery::DeadLettered);
        assert_eq!(gate.send(&peer(2), "new incarnation".to_string()).await?, Delivery::Sent);
        let sent = gate.transport().sent.lock().clone();
        let expected = vec![
            (peer(1), "before".to_string()),
            (peer(2), "new incarnation".to_string()),
        ];
        assert_eq!(sent, expected);
        assert_eq!(dead_letters.count(), 1);
        let letter = letters.try_recv().unwrap();
        assert_eq!(letter.direction, Direction::Outbound);
        assert_eq!(letter.peer, peer(1));
        Ok(())
    }

    #[test]
    fn inbound_from_quarantined_peer_is_dropped() {
        let (gate, quarantine, dead_letters, _stream) = gate(RecordingTransport::default());
        quarantine.quarantine(&peer(1), None, QuarantineReason::WatchUnreachable);
        assert_eq!(gate.receive(&peer(1), "hello".to_string()), None);
        assert_eq!(gate.receive(&peer(2), "hello".to_string()), Some("hello".to_string()));
        assert_eq!(dead_letters.count(), 1);
    }

    #[tokio::test]
    async fn transport_failure_surfaces() {
        let transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };
        let (gate, _, dead_letters, _) = gate(transport);
        let result = gate.send(&peer(1), "ping".to_string()).await;
        assert!(matches!(result, Err(Error::Transport { .. })));
        assert_eq!(dead_letters.count(), 0);
    }

    #[test]
    fn heartbeat_to_quarantined_peer_is_dead_lettered() {
        let stream = EventStream::new(16);
        let quarantine = QuarantineTable::new(stream.clone(), None);
        let dead_letters = DeadLetters::new(stream.clone(), 10);
        let recording = Arc::new(RecordingSender::default());
        let sender =
            GatedHeartbeatSender::new(recording.clone(), quarantine.clone(), dead_letters.clone());
        let mut letters = stream.subscribe::<DeadLetter>();
        sender.send_heartbeat(&peer(1));
        quarantine.quarantine(&peer(1), None, QuarantineReason::WatchUnreachable);
        sender.send_heartbeat(&peer(1));
        sender.send_heartbeat(&peer(2));
        assert_eq!(*recording.sent.lock(), vec![peer(1), peer(2)]);
        assert_eq!(dead_letters.count(), 1);
        let letter = letters.try_recv().unwrap();
        assert_eq!(letter.peer, peer(1));
        assert_eq!(letter.direction, Direction::Outbound);
    }
}
