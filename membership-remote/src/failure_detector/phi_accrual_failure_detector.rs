use std::collections::VecDeque;
use std::time::Duration;

use tracing::warn;

use membership_core::error::Error;

use crate::failure_detector::FailureDetector;

/// Implementation of 'The Phi Accrual Failure Detector' by Hayashibara et al. as defined in
/// their paper: [https://oneofus.la/have-emacs-will-hack/files/HDY04.pdf]
///
/// The suspicion level of failure is given by a value called φ (phi).
/// The basic idea of the φ failure detector is to express the value of φ on a scale that
/// is dynamically adjusted to reflect current network conditions. A configurable
/// threshold is used to decide if φ is considered to be a failure.
///
/// The value of φ is calculated as:
///
/// ```text
/// φ = -log10(1 - F(timeSinceLastHeartbeat))
/// ```
/// where F is the cumulative distribution function of a normal distribution with mean
/// and standard deviation estimated from historical heartbeat inter-arrival times.
///
/// [threshold] A low threshold is prone to generate many wrong suspicions but ensures a quick
///  detection in the event of a real crash. Conversely, a high threshold generates fewer mistakes
///  but needs more time to detect actual crashes
/// [max_sample_size] Number of samples to use for calculation of mean and standard deviation of
///  inter-arrival times.
/// [min_std_deviation] Minimum standard deviation to use for the normal distribution used when
///  calculating phi. Too low standard deviation might result in too much sensitivity for sudden,
///  but normal, deviations in heartbeat inter arrival times.
/// [acceptable_heartbeat_pause] Duration corresponding to number of potentially lost/delayed
///  heartbeats that will be accepted before considering it to be an anomaly.
/// [first_heartbeat_estimate] Bootstrap the stats with heartbeats that corresponds to
///  this duration, with a rather high standard deviation (since environment is unknown
///  in the beginning)
#[derive(Debug, Clone)]
pub struct PhiAccrualFailureDetector {
    threshold: f64,
    min_std_deviation: Duration,
    acceptable_heartbeat_pause: Duration,
    state: State,
    first_heartbeat: HeartbeatHistory,
}

impl PhiAccrualFailureDetector {
    pub fn new(
        threshold: f64,
        max_sample_size: usize,
        min_std_deviation: Duration,
        acceptable_heartbeat_pause: Duration,
        first_heartbeat_estimate: Duration,
    ) -> Result<Self, Error> {
        if !(threshold > 0.0) {
            return Err(Error::InvalidFailureDetector(format!(
                "threshold must be > 0, got {}",
                threshold
            )));
        }
        if max_sample_size == 0 {
            return Err(Error::InvalidFailureDetector("max_sample_size must be > 0".to_string()));
        }
        if min_std_deviation.is_zero() {
            return Err(Error::InvalidFailureDetector("min_std_deviation must be > 0".to_string()));
        }
        if first_heartbeat_estimate.is_zero() {
            return Err(Error::InvalidFailureDetector("heartbeat interval must be > 0".to_string()));
        }
        let first_heartbeat = Self::first_heartbeat(first_heartbeat_estimate, max_sample_size);
        let detector = Self {
            threshold,
            min_std_deviation,
            acceptable_heartbeat_pause,
            state: State {
                history: first_heartbeat.clone(),
                timestamp: None,
            },
            first_heartbeat,
        };
        Ok(detector)
    }

    fn first_heartbeat(
        first_heartbeat_estimate: Duration,
        max_sample_size: usize,
    ) -> HeartbeatHistory {
        let mean = first_heartbeat_estimate.as_millis() as i64;
        let std_deviation = mean / 4;
        let mut history = HeartbeatHistory::new(max_sample_size);
        history.add_interval(mean - std_deviation);
        history.add_interval(mean + std_deviation);
        history
    }

    /// Suspicion level at `timestamp`, 0.0 until the first heartbeat.
    pub fn phi(&self, timestamp: i64) -> f64 {
        match self.state.timestamp {
            None => 0.0,
            Some(old_timestamp) => {
                let time_diff = timestamp - old_timestamp;
                let history = &self.state.history;
                let mean = history.mean();
                let std_deviation = self.ensure_valid_std_deviation(history.std_deviation());
                Self::calc_phi(
                    time_diff as f64,
                    mean + self.acceptable_heartbeat_pause_millis() as f64,
                    std_deviation,
                )
            }
        }
    }

    /// Calculation of phi, derived from the Cumulative distribution function for
    /// N(mean, std_deviation) normal distribution, given by
    /// 1.0 / (1.0 + math.exp(-y * (1.5976 + 0.070566 * y * y)))
    /// where y = (x - mean) / standard_deviation
    /// This is an approximation defined in β Mathematics Handbook (Logistic approximation).
    /// Error is 0.00014 at +- 3.16
    /// The calculated value is equivalent to -log10(1 - CDF(y))
    fn calc_phi(time_diff: f64, mean: f64, std_deviation: f64) -> f64 {
        let y = (time_diff - mean) / std_deviation;
        let e = f64::exp(-y * (1.5976 + 0.070566 * y * y));
        if time_diff > mean {
            -f64::log10(e / (1.0 + e))
        } else {
            -f64::log10(1.0 - 1.0 / (1.0 + e))
        }
    }

    fn ensure_valid_std_deviation(&self, std_deviation: f64) -> f64 {
        std_deviation.max(self.min_std_deviation.as_millis() as f64)
    }

    fn acceptable_heartbeat_pause_millis(&self) -> i64 {
        self.acceptable_heartbeat_pause.as_millis() as i64
    }
}

impl FailureDetector for PhiAccrualFailureDetector {
    fn is_available(&self, now: i64) -> bool {
        self.phi(now) < self.threshold
    }

    fn is_monitoring(&self) -> bool {
        self.state.timestamp.is_some()
    }

    fn heartbeat(&mut self, now: i64) {
        match self.state.timestamp {
            None => {
                self.state.history = self.first_heartbeat.clone();
                self.state.timestamp = Some(now);
            }
            Some(latest_timestamp) => {
                let interval = now - latest_timestamp;
                // a heartbeat arriving after the peer was already suspected is not a sample
                if self.is_available(now) {
                    if interval >= self.acceptable_heartbeat_pause_millis() / 3 * 2 {
                        warn!("heartbeat interval is growing too large: {} millis", interval);
                    }
                    self.state.history.add_interval(interval);
                }
                self.state.timestamp = Some(now);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct HeartbeatHistory {
    max_sample_size: usize,
    intervals: VecDeque<i64>,
    interval_sum: i64,
    squared_interval_sum: i64,
}

impl HeartbeatHistory {
    fn new(max_sample_size: usize) -> Self {
        Self {
            max_sample_size,
            intervals: VecDeque::with_capacity(max_sample_size),
            interval_sum: 0,
            squared_interval_sum: 0,
        }
    }

    fn mean(&self) -> f64 {
        self.interval_sum as f64 / self.intervals.len() as f64
    }

    fn variance(&self) -> f64 {
        self.squared_interval_sum as f64 / self.intervals.len() as f64 - (self.mean() * self.mean())
    }

    fn std_deviation(&self) -> f64 {
        self.variance().max(0.0).sqrt()
    }

    fn add_interval(&mut self, interval: i64) {
        if self.intervals.len() >= self.max_sample_size {
            self.drop_oldest();
        }
        self.intervals.push_back(interval);
        self.interval_sum += interval;
        self.squared_interval_sum += interval.pow(2);
    }

    fn drop_oldest(&mut self) {
        if let Some(interval) = self.intervals.pop_front() {
            self.interval_sum -= interval;
            self.squared_interval_sum -= interval.pow(2);
        }
    }
}

#[derive(Debug, Clone)]
struct State {
    history: HeartbeatHistory,
    timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::failure_detector::phi_accrual_failure_detector::{
        HeartbeatHistory, PhiAccrualFailureDetector,
    };
    use crate::failure_detector::FailureDetector;

    fn detector(threshold: f64, acceptable_pause: Duration) -> PhiAccrualFailureDetector {
        PhiAccrualFailureDetector::new(
            threshold,
            1000,
            Duration::from_millis(10),
            acceptable_pause,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn phi_of_mean_is_about_point_three() {
        let phi = PhiAccrualFailureDetector::calc_phi(1000.0, 1000.0, 100.0);
        assert!((phi - 0.3).abs() < 0.01, "phi was {}", phi);
    }

    #[test]
    fn phi_grows_with_elapsed_time() {
        let phis = [1000.0, 1100.0, 1200.0, 1300.0]
            .iter()
            .map(|t| PhiAccrualFailureDetector::calc_phi(*t, 1000.0, 100.0))
            .collect::<Vec<_>>();
        assert!(phis.windows(2).all(|w| w[0] < w[1]), "{:?}", phis);
    }

    #[test]
    fn available_before_first_heartbeat() {
        let detector = detector(8.0, Duration::ZERO);
        assert!(!detector.is_monitoring());
        assert!(detector.is_available(i64::MAX / 2));
        assert_eq!(detector.phi(10_000), 0.0);
    }

    #[test]
    fn available_with_regular_heartbeats() {
        let mut detector = detector(8.0, Duration::ZERO);
        for t in (0..=10_000).step_by(1000) {
            detector.heartbeat(t);
        }
        assert!(detector.is_monitoring());
        assert!(detector.is_available(10_500));
    }

    #[test]
    fn unavailable_after_heartbeats_stop() {
        let mut detector = detector(8.0, Duration::from_secs(3));
        for t in (0..=10_000).step_by(1000) {
            detector.heartbeat(t);
        }
        assert!(detector.is_available(12_000));
        assert!(!detector.is_available(30_000));
    }

    #[test]
    fn acceptable_pause_delays_detection() {
        let mut strict = detector(8.0, Duration::ZERO);
        let mut lenient = detector(8.0, Duration::from_secs(10));
        for t in (0..=10_000).step_by(1000) {
            strict.heartbeat(t);
            lenient.heartbeat(t);
        }
        assert!(!strict.is_available(16_000));
        assert!(lenient.is_available(16_000));
    }

    #[test]
    fn reject_invalid_settings() {
        let std_deviation = Duration::from_millis(10);
        let interval = Duration::from_secs(1);
        let create = |threshold, samples, std_deviation| {
            let pause = Duration::ZERO;
            PhiAccrualFailureDetector::new(threshold, samples, std_deviation, pause, interval)
        };
        assert!(create(0.0, 10, std_deviation).is_err());
        assert!(create(8.0, 0, std_deviation).is_err());
        assert!(create(8.0, 10, Duration::ZERO).is_err());
        assert!(create(8.0, 10, std_deviation).is_ok());
    }

    #[test]
    fn history_is_bounded() {
        let mut history = HeartbeatHistory::new(3);
        for interval in [100, 200, 300, 400, 500] {
            history.add_interval(interval);
        }
        assert_eq!(history.intervals.len(), 3);
        assert_eq!(history.mean(), 400.0);
        assert_eq!(history.interval_sum, 1200);
    }
}
