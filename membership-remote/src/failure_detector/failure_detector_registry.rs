use std::fmt::Debug;
use std::hash::Hash;

/// Failure detectors keyed by the resource they watch.
///
/// A resource that never sent a heartbeat is reported available and not monitored.
pub trait FailureDetectorRegistry: Debug + Send + Sync {
    type A: Hash + Eq;

    fn is_available(&self, resource: &Self::A) -> bool;

    fn is_available_at(&self, resource: &Self::A, now: i64) -> bool;

    fn is_monitoring(&self, resource: &Self::A) -> bool;

    fn heartbeat(&mut self, resource: Self::A);

    fn heartbeat_at(&mut self, resource: Self::A, now: i64);

    fn remove(&mut self, resource: &Self::A);

    fn reset(&mut self);
}
