use std::time::Duration;

use tokio::select;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Runs blocks on the tokio runtime at fixed delays. Every task is tied to the scheduler's
/// cancellation token, so [`Scheduler::cancel_all`] stops everything it ever started.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    token: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct ScheduleKey {
    name: &'static str,
    token: CancellationToken,
}

impl ScheduleKey {
    pub fn cancel(&self) {
        trace!("cancel schedule {}", self.name);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Scheduler {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn schedule_with_fixed_delay<F>(
        &self,
        name: &'static str,
        initial_delay: Option<Duration>,
        interval: Duration,
        mut block: F,
    ) -> ScheduleKey
    where
        F: FnMut() + Send + 'static,
    {
        let token = self.token.child_token();
        let key = ScheduleKey {
            name,
            token: token.clone(),
        };
        let start = Instant::now() + initial_delay.unwrap_or(interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                select! {
                    _ = token.cancelled() => {
                        trace!("schedule {} stopped", name);
                        break;
                    }
                    _ = ticker.tick() => {
                        block();
                    }
                }
            }
        });
        key
    }

    pub fn cancel_all(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::scheduler::Scheduler;

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_ticks_until_cancelled() {
        let scheduler = Scheduler::new(CancellationToken::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let interval = Duration::from_millis(100);
        let key = scheduler.schedule_with_fixed_delay("count", None, interval, move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 3);
        key.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_every_schedule() {
        let scheduler = Scheduler::new(CancellationToken::new());
        let counter = Arc::new(AtomicUsize::new(0));
        for name in ["first", "second"] {
            let c = counter.clone();
            scheduler.schedule_with_fixed_delay(name, None, Duration::from_secs(1), move || {
                c.fetch_add(1, Ordering::Relaxed);
            });
        }
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 2);
        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }
}
