use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use membership_core::address::UniqueAddress;
use membership_core::dead_letter::{DeadLetter, DeadLetters, Direction};
use membership_remote::failure_detector::default_failure_detector_registry::DefaultFailureDetectorRegistry;
use membership_remote::failure_detector::failure_detector_registry::FailureDetectorRegistry;
use membership_remote::failure_detector::Clock;
use membership_remote::quarantine::QuarantineTable;

use crate::member::MemberStatus;
use crate::membership::Membership;

/// Heartbeats every other member and reports reachability changes to [`Membership`].
///
/// Unreachability is only an observation: it never changes a member's status.
/// Quarantined incarnations are neither heartbeated nor listened to, so they end up unreachable.
#[derive(Debug)]
pub struct ClusterHeartbeat {
    self_address: UniqueAddress,
    membership: Membership,
    quarantine: QuarantineTable,
    dead_letters: DeadLetters,
    failure_detector: DefaultFailureDetectorRegistry<UniqueAddress>,
    clock: Arc<dyn Clock>,
    expected_response_after: i64,
    first_seen: HashMap<UniqueAddress, i64>,
    monitored: HashSet<UniqueAddress>,
}

impl ClusterHeartbeat {
    pub fn new(
        self_address: UniqueAddress,
        membership: Membership,
        quarantine: QuarantineTable,
        dead_letters: DeadLetters,
        failure_detector: DefaultFailureDetectorRegistry<UniqueAddress>,
        clock: Arc<dyn Clock>,
        expected_response_after: std::time::Duration,
    ) -> Self {
        Self {
            self_address,
            membership,
            quarantine,
            dead_letters,
            failure_detector,
            clock,
            expected_response_after: expected_response_after.as_millis() as i64,
            first_seen: Default::default(),
            monitored: Default::default(),
        }
    }

    fn is_receiver(&self, status: MemberStatus) -> bool {
        !matches!(status, MemberStatus::Removed)
    }

    /// Members to send a heartbeat to on this tick.
    pub fn heartbeat_targets(&self) -> Vec<UniqueAddress> {
        self.membership
            .members()
            .into_iter()
            .filter(|m| m.unique_address != self.self_address && self.is_receiver(m.status))
            .map(|m| m.unique_address)
            .filter(|node| !self.quarantine.is_quarantined(node))
            .collect()
    }

    pub fn heartbeat_rsp(&mut self, from: &UniqueAddress) {
        if self.quarantine.is_quarantined(from) {
            let letter = DeadLetter {
                peer: from.clone(),
                direction: Direction::Inbound,
                message: "HeartbeatRsp".to_string(),
            };
            self.dead_letters.publish(letter);
            return;
        }
        if from == &self.self_address || self.membership.member(from).is_none() {
            trace!("Ignoring heartbeat rsp from non member [{}]", from);
            return;
        }
        self.first_seen.remove(from);
        self.monitored.insert(from.clone());
        self.failure_detector.heartbeat(from.clone());
    }

    /// Re-evaluates every member against its detector, publishing reachability changes.
    pub fn check_reachability(&mut self) {
        let now = self.clock.now_millis();
        let members = self.membership.current_state();
        let stale = self
            .first_seen
            .keys()
            .chain(self.monitored.iter())
            .filter(|node| !members.members.contains_key(*node))
            .cloned()
            .collect::<Vec<_>>();
        for node in stale {
            self.remove(&node);
        }
        for member in members.members.values() {
            let node = &member.unique_address;
            if node == &self.self_address {
                continue;
            }
            if !self.failure_detector.is_monitoring(node) {
                let first_seen = *self.first_seen.entry(node.clone()).or_insert(now);
                if now - first_seen >= self.expected_response_after {
                    debug!("No first heartbeat from [{}], start monitoring", node);
                    self.first_seen.remove(node);
                    self.monitored.insert(node.clone());
                    self.failure_detector.heartbeat_at(node.clone(), now);
                }
                continue;
            }
            let available = self.failure_detector.is_available_at(node, now);
            let unreachable = members.is_unreachable(node);
            if !available && !unreachable {
                self.membership.mark_unreachable(node);
            } else if available && unreachable {
                self.membership.mark_reachable(node);
            }
        }
    }

    /// Forgets a member's detector history, e.g. after it was removed.
    pub fn remove(&mut self, node: &UniqueAddress) {
        self.first_seen.remove(node);
        self.monitored.remove(node);
        self.failure_detector.remove(node);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use membership_core::address::UniqueAddress;
    use membership_core::config::duration::ConfigDuration;
    use membership_core::dead_letter::{DeadLetter, DeadLetters, Direction};
    use membership_core::event::event_stream::EventStream;
    use membership_remote::config::failure_detector::{
        FailureDetectorImpl, FailureDetectorSettings,
    };
    use membership_remote::failure_detector::default_failure_detector_registry::DefaultFailureDetectorRegistry;
    use membership_remote::failure_detector::{detector_factory, ManualClock};
    use membership_remote::quarantine::{QuarantineReason, QuarantineTable};

    use crate::cluster_event::ClusterEvent;
    use crate::cluster_heartbeat::ClusterHeartbeat;
    use crate::member::MemberStatus;
    use crate::membership::Membership;

    struct Setup {
        heartbeat: ClusterHeartbeat,
        membership: Membership,
        quarantine: QuarantineTable,
        dead_letters: DeadLetters,
        clock: ManualClock,
        stream: EventStream,
        other: UniqueAddress,
    }

    fn setup() -> anyhow::Result<Setup> {
        let settings = FailureDetectorSettings {
            implementation: FailureDetectorImpl::PhiAccrual,
            heartbeat_interval: ConfigDuration::from_secs(1),
            threshold: 10.0,
            max_sample_size: 200,
            min_std_deviation: ConfigDuration::from_millis(100),
            acceptable_heartbeat_pause: ConfigDuration::from_secs(3),
        };
        let clock = ManualClock::new(0);
        let stream = EventStream::new(64);
        let quarantine = QuarantineTable::new(stream.clone(), None);
        let dead_letters = DeadLetters::new(stream.clone(), 10);
        let membership = Membership::new(quarantine.clone(), stream.clone());
        let me = UniqueAddress::new("10.0.0.1:2552".parse()?, 1);
        let other = UniqueAddress::new("10.0.0.3:2552".parse()?, 7);
        membership.join(me.clone(), Default::default())?;
        membership.join(other.clone(), Default::default())?;
        membership.up(&other)?;
        let factory = detector_factory(&settings)?;
        let registry = DefaultFailureDetectorRegistry::new(Arc::new(clock.clone()), factory);
        let heartbeat = ClusterHeartbeat::new(
            me,
            membership.clone(),
            quarantine.clone(),
            dead_letters.clone(),
            registry,
            Arc::new(clock.clone()),
            Duration::from_secs(1),
        );
        Ok(Setup {
            heartbeat,
            membership,
            quarantine,
            dead_letters,
            clock,
            stream,
            other,
        })
    }

    #[test]
    fn unreachable_then_reachable_keeps_status() -> anyhow::Result<()> {
        let Setup {
            mut heartbeat,
            membership,
            clock,
            stream,
            other,
            ..
        } = setup()?;
        let mut events = stream.subscribe::<ClusterEvent>();
        assert_eq!(heartbeat.heartbeat_targets(), vec![other.clone()]);
        for _ in 0..5 {
            heartbeat.heartbeat_rsp(&other);
            heartbeat.check_reachability();
            clock.advance(Duration::from_secs(1));
        }
        assert!(events.drain().is_empty());
        clock.advance(Duration::from_secs(30));
        heartbeat.check_reachability();
        assert!(membership.current_state().is_unreachable(&other));
        assert_eq!(membership.member(&other).unwrap().status, MemberStatus::Up);
        heartbeat.heartbeat_rsp(&other);
        heartbeat.check_reachability();
        assert!(!membership.current_state().is_unreachable(&other));
        let events = events.drain();
        assert!(matches!(
            &events[0],
            ClusterEvent::UnreachableMember(m) if m.unique_address == other
        ));
        assert!(matches!(
            &events[1],
            ClusterEvent::ReachableMember(m) if m.unique_address == other
        ));
        Ok(())
    }

    #[test]
    fn silent_member_becomes_unreachable() -> anyhow::Result<()> {
        let Setup {
            mut heartbeat,
            membership,
            clock,
            other,
            ..
        } = setup()?;
        heartbeat.check_reachability();
        clock.advance(Duration::from_secs(1));
        heartbeat.check_reachability();
        assert!(!membership.current_state().is_unreachable(&other));
        clock.advance(Duration::from_secs(30));
        heartbeat.check_reachability();
        assert!(membership.current_state().is_unreachable(&other));
        Ok(())
    }

    #[test]
    fn quarantined_member_is_not_heartbeated_and_turns_unreachable() -> anyhow::Result<()> {
        let Setup {
            mut heartbeat,
            membership,
            quarantine,
            dead_letters,
            clock,
            stream,
            other,
        } = setup()?;
        let mut letters = stream.subscribe::<DeadLetter>();
        quarantine.quarantine(&other, None, QuarantineReason::Manual("operator".into()));
        assert!(heartbeat.heartbeat_targets().is_empty());
        for _ in 0..5 {
            heartbeat.heartbeat_rsp(&other);
            heartbeat.check_reachability();
            clock.advance(Duration::from_secs(1));
        }
        clock.advance(Duration::from_secs(30));
        heartbeat.check_reachability();
        assert!(membership.current_state().is_unreachable(&other));
        assert_eq!(dead_letters.count(), 5);
        let letter = letters.try_recv().unwrap();
        assert_eq!(letter.peer, other);
        assert_eq!(letter.direction, Direction::Inbound);
        Ok(())
    }
}
