use std::any::type_name;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::hash::Hash;
use std::sync::Arc;

use crate::failure_detector::failure_detector_registry::FailureDetectorRegistry;
use crate::failure_detector::{Clock, DetectorFactory, FailureDetector};

pub struct DefaultFailureDetectorRegistry<A> {
    clock: Arc<dyn Clock>,
    detector_factory: DetectorFactory,
    resource_to_failure_detector: HashMap<A, Box<dyn FailureDetector>>,
}

impl<A> DefaultFailureDetectorRegistry<A> {
    pub fn new(clock: Arc<dyn Clock>, detector_factory: DetectorFactory) -> Self {
        Self {
            clock,
            detector_factory,
            resource_to_failure_detector: Default::default(),
        }
    }
}

impl<A> Debug for DefaultFailureDetectorRegistry<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let struct_name = format!("DefaultFailureDetectorRegistry<{}>", type_name::<A>());
        f.debug_struct(&struct_name)
            .field("clock", &self.clock)
            .field("resources", &self.resource_to_failure_detector.len())
            .finish_non_exhaustive()
    }
}

impl<A> FailureDetectorRegistry for DefaultFailureDetectorRegistry<A>
where
    A: Send + Sync + Hash + Eq,
{
    type A = A;

    fn is_available(&self, resource: &Self::A) -> bool {
        self.is_available_at(resource, self.clock.now_millis())
    }

    fn is_available_at(&self, resource: &Self::A, now: i64) -> bool {
        match self.resource_to_failure_detector.get(resource) {
            None => true,
            Some(r) => r.is_available(now),
        }
    }

    fn is_monitoring(&self, resource: &Self::A) -> bool {
        match self.resource_to_failure_detector.get(resource) {
            None => false,
            Some(r) => r.is_monitoring(),
        }
    }

    fn heartbeat(&mut self, resource: Self::A) {
        let now = self.clock.now_millis();
        self.heartbeat_at(resource, now);
    }

    fn heartbeat_at(&mut self, resource: Self::A, now: i64) {
        match self.resource_to_failure_detector.entry(resource) {
            Entry::Occupied(mut o) => {
                o.get_mut().heartbeat(now);
            }
            Entry::Vacant(v) => {
                let mut r = (self.detector_factory)();
                r.heartbeat(now);
                v.insert(r);
            }
        }
    }

    fn remove(&mut self, resource: &Self::A) {
        self.resource_to_failure_detector.remove(resource);
    }

    fn reset(&mut self) {
        self.resource_to_failure_detector.clear();
    }
}
