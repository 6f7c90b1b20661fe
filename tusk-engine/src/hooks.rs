//! Hook events and the channels delivering them
//!
//! Each notification kind enabled in the [`Config`](crate::Config) gets its
//! own bounded channel. What happens when a channel is full is decided by
//! the [`DeliveryPolicy`]: `Block` makes the producing request wait for the
//! consumer, `DropWhenFull` discards the event and logs a warning.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use tusk_core::FileInfo;

use crate::body::BodyStats;
use crate::request::RequestHead;
use crate::Config;

/// Kind of state change a hook event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    PostCreate,
    PostReceive,
    PostFinish,
    PostTerminate,
}

/// What to do with an event when its channel is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    #[default]
    Block,
    DropWhenFull,
}

/// Snapshot of an upload and the request that changed it
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub upload: FileInfo,
    pub request: RequestHead,
    stop: Option<StopHandle>,
}

impl HookEvent {
    pub fn new(upload: FileInfo, request: RequestHead) -> Self {
        HookEvent {
            upload,
            request,
            stop: None,
        }
    }

    pub(crate) fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Abort the chunk write this event was emitted for. Only progress
    /// events can stop an upload; returns whether a stop was requested.
    pub fn stop_upload(&self) -> bool {
        match &self.stop {
            Some(stop) => {
                stop.stop();
                true
            }
            None => false,
        }
    }
}

/// Cancels one running chunk write
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiving side of a [`StopHandle`]
pub(crate) struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Resolves once the upload has been stopped, never otherwise
    pub(crate) async fn stopped(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub(crate) fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

/// Producer side of one hook channel
#[derive(Clone)]
pub(crate) struct HookSender {
    kind: HookType,
    tx: mpsc::Sender<HookEvent>,
    policy: DeliveryPolicy,
}

impl HookSender {
    pub(crate) async fn send(&self, event: HookEvent) {
        match self.policy {
            DeliveryPolicy::Block => {
                if self.tx.send(event).await.is_err() {
                    debug!(hook = ?self.kind, "hook receiver dropped, event discarded");
                }
            }
            DeliveryPolicy::DropWhenFull => match self.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    warn!(hook = ?self.kind, id = %event.upload.id, "hook channel full, event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(hook = ?self.kind, "hook receiver dropped, event discarded");
                }
            },
        }
    }
}

#[derive(Default)]
pub(crate) struct HookSenders {
    pub(crate) created: Option<HookSender>,
    pub(crate) progress: Option<HookSender>,
    pub(crate) complete: Option<HookSender>,
    pub(crate) terminated: Option<HookSender>,
}

/// Consumer side of the enabled hook channels. Disabled kinds are `None`.
///
/// With [`DeliveryPolicy::Block`] every enabled receiver must be drained,
/// otherwise requests stall once its channel is full.
#[derive(Debug, Default)]
pub struct HookReceivers {
    pub created: Option<mpsc::Receiver<HookEvent>>,
    pub progress: Option<mpsc::Receiver<HookEvent>>,
    pub complete: Option<mpsc::Receiver<HookEvent>>,
    pub terminated: Option<mpsc::Receiver<HookEvent>>,
}

pub(crate) fn hook_channels(config: &Config) -> (HookSenders, HookReceivers) {
    let mut senders = HookSenders::default();
    let mut receivers = HookReceivers::default();

    let channel = |kind| {
        let (tx, rx) = mpsc::channel(config.hook_channel_capacity);
        let sender = HookSender {
            kind,
            tx,
            policy: config.hook_delivery,
        };
        (Some(sender), Some(rx))
    };

    if config.notify_created_uploads {
        (senders.created, receivers.created) = channel(HookType::PostCreate);
    }
    if config.notify_upload_progress {
        (senders.progress, receivers.progress) = channel(HookType::PostReceive);
    }
    if config.notify_complete_uploads {
        (senders.complete, receivers.complete) = channel(HookType::PostFinish);
    }
    if config.notify_terminated_uploads {
        (senders.terminated, receivers.terminated) = channel(HookType::PostTerminate);
    }

    (senders, receivers)
}

/// Periodically reports how many bytes a running chunk write has read.
///
/// A reading is only sent when the offset moved since the previous one.
/// Stopping the emitter delivers one last reading before it exits.
pub(crate) struct ProgressEmitter {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ProgressEmitter {
    pub(crate) fn start(
        sender: HookSender,
        mut event: HookEvent,
        stats: Arc<BodyStats>,
        period: Duration,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let start_offset = event.upload.offset;

        let task = tokio::spawn(async move {
            let mut previous = 0;
            let mut ticker = tokio::time::interval(period);
            loop {
                let last = tokio::select! {
                    _ = &mut stopped => true,
                    _ = ticker.tick() => false,
                };

                let offset = start_offset + stats.bytes_read();
                if offset != previous {
                    event.upload.offset = offset;
                    sender.send(event.clone()).await;
                    previous = offset;
                }

                if last {
                    break;
                }
            }
        });

        ProgressEmitter { stop, task }
    }

    /// Stop emitting and wait for the final reading to be delivered
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "progress emitter failed");
        }
    }
}
