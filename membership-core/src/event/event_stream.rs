use std::any::{type_name, Any, TypeId};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{trace, warn};

use crate::event::Event;

/// Process wide publish/subscribe, one bounded broadcast channel per event type.
///
/// Every subscriber owns a queue of `capacity` events. A subscriber that falls behind loses
/// the oldest events instead of slowing down the publisher; [`Subscription::recv`] logs how
/// many were skipped.
#[derive(Clone)]
pub struct EventStream {
    inner: Arc<Inner>,
}

pub struct Inner {
    capacity: usize,
    channels: DashMap<TypeId, Box<dyn Any + Send + Sync>, ahash::RandomState>,
}

impl Deref for EventStream {
    type Target = Arc<Inner>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Debug for EventStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("capacity", &self.capacity)
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        let inner = Inner {
            capacity: capacity.max(1),
            channels: DashMap::default(),
        };
        Self { inner: Arc::new(inner) }
    }

    fn sender<E>(&self) -> broadcast::Sender<E>
    where
        E: Event,
    {
        let channel = self
            .channels
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(broadcast::channel::<E>(self.capacity).0));
        match channel.value().downcast_ref::<broadcast::Sender<E>>() {
            Some(sender) => sender.clone(),
            None => unreachable!("channel of {} registered with a foreign type", type_name::<E>()),
        }
    }

    pub fn subscribe<E>(&self) -> Subscription<E>
    where
        E: Event,
    {
        trace!("subscribe to {}", type_name::<E>());
        Subscription {
            receiver: self.sender::<E>().subscribe(),
        }
    }

    /// Returns the number of subscribers the event was queued for.
    pub fn publish<E>(&self, event: E) -> usize
    where
        E: Event,
    {
        match self.sender::<E>().send(event) {
            Ok(receivers) => {
                trace!("publish {} to {} subscribers", type_name::<E>(), receivers);
                receivers
            }
            Err(_) => {
                trace!("publish {} without subscribers", type_name::<E>());
                0
            }
        }
    }

    pub fn subscriber_count<E>(&self) -> usize
    where
        E: Event,
    {
        self.sender::<E>().receiver_count()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Received<E> {
    Event(E),
    /// This many events were dropped before the subscriber got to them.
    Lagged(u64),
}

/// Receiving half of an [`EventStream`] subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<E> {
    receiver: broadcast::Receiver<E>,
}

impl<E> Subscription<E>
where
    E: Event,
{
    /// Waits for the next event, `None` once the stream is gone.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.recv_or_lagged().await? {
                Received::Event(event) => return Some(event),
                Received::Lagged(_) => continue,
            }
        }
    }

    /// Like [`Subscription::recv`], but reports a gap instead of skipping over it, for
    /// subscribers that must resynchronize from a snapshot after losing events.
    pub async fn recv_or_lagged(&mut self) -> Option<Received<E>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Received::Event(event)),
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    "subscriber of {} lagged behind, {} events skipped",
                    type_name::<E>(),
                    skipped
                );
                Some(Received::Lagged(skipped))
            }
            Err(RecvError::Closed) => None,
        }
    }

    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(
                        "subscriber of {} lagged behind, {} events skipped",
                        type_name::<E>(),
                        skipped
                    );
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
