use std::time::Duration;

use membership_core::error::Error;

use crate::failure_detector::FailureDetector;

/// Considers the resource unavailable when no heartbeat arrived within
/// `heartbeat_interval + acceptable_heartbeat_pause`.
#[derive(Debug, Clone)]
pub struct DeadlineFailureDetector {
    deadline_millis: i64,
    heartbeat_timestamp: Option<i64>,
}

impl DeadlineFailureDetector {
    pub fn new(
        acceptable_heartbeat_pause: Duration,
        heartbeat_interval: Duration,
    ) -> Result<Self, Error> {
        if heartbeat_interval.is_zero() {
            return Err(Error::InvalidFailureDetector("heartbeat interval must be > 0".to_string()));
        }
        let deadline = acceptable_heartbeat_pause + heartbeat_interval;
        Ok(Self {
            deadline_millis: deadline.as_millis() as i64,
            heartbeat_timestamp: None,
        })
    }
}

impl FailureDetector for DeadlineFailureDetector {
    fn is_available(&self, now: i64) -> bool {
        match self.heartbeat_timestamp {
            None => true,
            Some(timestamp) => timestamp + self.deadline_millis > now,
        }
    }

    fn is_monitoring(&self) -> bool {
        self.heartbeat_timestamp.is_some()
    }

    fn heartbeat(&mut self, now: i64) {
        self.heartbeat_timestamp = Some(now);
    }
}
