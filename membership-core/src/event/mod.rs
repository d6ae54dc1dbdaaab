use std::fmt::Debug;

pub mod address_terminated;
pub mod event_stream;

/// Anything published on the [`event_stream::EventStream`].
pub trait Event: Debug + Clone + Send + Sync + 'static {}

#[macro_export]
macro_rules! impl_event {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::event::Event for $t {}
        )*
    };
}
