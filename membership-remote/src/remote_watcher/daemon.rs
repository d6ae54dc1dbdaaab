use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, trace};

use membership_core::address::{Address, UniqueAddress};

use crate::config::watch_failure_detector::WatchFailureDetector;
use crate::remote_watcher::{RemoteWatcher, WatcherId, WatcherStats};
use crate::transport::HeartbeatSender;

#[derive(Debug)]
pub enum RemoteWatcherMessage {
    WatchRemote { watcher: WatcherId, watchee: UniqueAddress },
    UnwatchRemote { watcher: WatcherId, watchee: Address },
    WatcheeTerminated(Address),
    HeartbeatRsp(UniqueAddress),
    Stats(oneshot::Sender<WatcherStats>),
}

/// Handle to a running [`RemoteWatcherDaemon`]. Sends after shutdown are silently dropped.
#[derive(Debug, Clone)]
pub struct RemoteWatcherRef {
    tx: mpsc::UnboundedSender<RemoteWatcherMessage>,
}

impl RemoteWatcherRef {
    fn tell(&self, message: RemoteWatcherMessage) {
        if let Err(e) = self.tx.send(message) {
            trace!("remote watcher stopped, drop {:?}", e.0);
        }
    }

    pub fn watch(&self, watcher: impl Into<WatcherId>, watchee: UniqueAddress) {
        self.tell(RemoteWatcherMessage::WatchRemote {
            watcher: watcher.into(),
            watchee,
        });
    }

    pub fn unwatch(&self, watcher: impl Into<WatcherId>, watchee: Address) {
        self.tell(RemoteWatcherMessage::UnwatchRemote {
            watcher: watcher.into(),
            watchee,
        });
    }

    pub fn watchee_terminated(&self, address: Address) {
        self.tell(RemoteWatcherMessage::WatcheeTerminated(address));
    }

    pub fn heartbeat_rsp(&self, from: UniqueAddress) {
        self.tell(RemoteWatcherMessage::HeartbeatRsp(from));
    }

    pub async fn stats(&self) -> Option<WatcherStats> {
        let (tx, rx) = oneshot::channel();
        self.tell(RemoteWatcherMessage::Stats(tx));
        rx.await.ok()
    }
}

/// Drives a [`RemoteWatcher`] on its heartbeat and reaper ticks, and runs the grace period
/// for first responses.
pub struct RemoteWatcherDaemon {
    watcher: RemoteWatcher,
    settings: WatchFailureDetector,
    heartbeat_sender: Arc<dyn HeartbeatSender>,
    rx: mpsc::UnboundedReceiver<RemoteWatcherMessage>,
    token: CancellationToken,
}

impl RemoteWatcherDaemon {
    pub fn spawn(
        watcher: RemoteWatcher,
        settings: &WatchFailureDetector,
        heartbeat_sender: Arc<dyn HeartbeatSender>,
        token: CancellationToken,
    ) -> (RemoteWatcherRef, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let daemon = Self {
            watcher,
            settings: settings.clone(),
            heartbeat_sender,
            rx,
            token,
        };
        let handle = tokio::spawn(daemon.run());
        (RemoteWatcherRef { tx }, handle)
    }

    async fn run(self) {
        let Self {
            mut watcher,
            settings,
            heartbeat_sender,
            mut rx,
            token,
        } = self;
        let heartbeat_interval = settings.detector.heartbeat_interval.to_std_duration();
        let reaper_interval = settings.unreachable_nodes_reaper_interval.to_std_duration();
        let expected_response_after = settings.expected_response_after.to_std_duration();
        let start = tokio::time::Instant::now();
        let mut heartbeat_tick =
            tokio::time::interval_at(start + heartbeat_interval, heartbeat_interval);
        heartbeat_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reaper_tick = tokio::time::interval_at(start + reaper_interval, reaper_interval);
        reaper_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut expected = DelayQueue::<Address>::new();
        let mut pending = HashSet::<Address>::new();
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("remote watcher stopped");
                    break;
                }
                message = rx.recv() => {
                    match message {
                        Some(message) => Self::handle(&mut watcher, message),
                        None => break,
                    }
                }
                _ = heartbeat_tick.tick() => {
                    let targets = watcher.heartbeat_tick();
                    for node in &targets.heartbeat {
                        heartbeat_sender.send_heartbeat(node);
                    }
                    for address in targets.expect_first {
                        if pending.insert(address) {
                            expected.insert(address, expected_response_after);
                        }
                    }
                }
                _ = reaper_tick.tick() => {
                    watcher.reap_unreachable();
                }
                Some(expired) = expected.next() => {
                    let address = expired.into_inner();
                    pending.remove(&address);
                    watcher.expected_first_heartbeat(&address);
                }
            }
        }
    }

    fn handle(watcher: &mut RemoteWatcher, message: RemoteWatcherMessage) {
        match message {
            RemoteWatcherMessage::WatchRemote { watcher: id, watchee } => {
                watcher.watch(id, &watchee);
            }
            RemoteWatcherMessage::UnwatchRemote { watcher: id, watchee } => {
                watcher.unwatch(&id, &watchee);
            }
            RemoteWatcherMessage::WatcheeTerminated(address) => {
                watcher.watchee_terminated(&address);
            }
            RemoteWatcherMessage::HeartbeatRsp(from) => {
                watcher.receive_heartbeat_rsp(&from);
            }
            RemoteWatcherMessage::Stats(reply) => {
                let _ = reply.send(watcher.stats());
            }
        }
    }
}
