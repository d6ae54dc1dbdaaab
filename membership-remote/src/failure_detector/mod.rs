use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use membership_core::error::Error;

use crate::config::failure_detector::{FailureDetectorImpl, FailureDetectorSettings};
use crate::failure_detector::deadline_failure_detector::DeadlineFailureDetector;
use crate::failure_detector::phi_accrual_failure_detector::PhiAccrualFailureDetector;

pub mod deadline_failure_detector;
pub mod default_failure_detector_registry;
pub mod failure_detector_registry;
pub mod phi_accrual_failure_detector;

/// Liveness estimate for a single monitored resource.
/// Timestamps are milliseconds taken from a [`Clock`].
pub trait FailureDetector: Debug + Send + Sync {
    fn is_available(&self, now: i64) -> bool;

    fn is_monitoring(&self) -> bool;

    fn heartbeat(&mut self, now: i64);
}

pub trait Clock: Debug + Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.millis.fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

pub type DetectorFactory = Box<dyn Fn() -> Box<dyn FailureDetector> + Send + Sync>;

/// Validates `settings` once and returns a factory producing fresh detectors from them.
pub fn detector_factory(settings: &FailureDetectorSettings) -> Result<DetectorFactory, Error> {
    let factory: DetectorFactory = match settings.implementation {
        FailureDetectorImpl::PhiAccrual => {
            let prototype = PhiAccrualFailureDetector::new(
                settings.threshold,
                settings.max_sample_size,
                settings.min_std_deviation.to_std_duration(),
                settings.acceptable_heartbeat_pause.to_std_duration(),
                settings.heartbeat_interval.to_std_duration(),
            )?;
            Box::new(move || Box::new(prototype.clone()))
        }
        FailureDetectorImpl::Deadline => {
            let prototype = DeadlineFailureDetector::new(
                settings.acceptable_heartbeat_pause.to_std_duration(),
                settings.heartbeat_interval.to_std_duration(),
            )?;
            Box::new(move || Box::new(prototype.clone()))
        }
    };
    Ok(factory)
}
