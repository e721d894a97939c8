// Asynchronous notifications into a session
//
// Backends and the host platform never touch session state directly. They post
// a `Notification` into the session's channel; a pump thread drains it and
// applies each one under the session lock, in arrival order.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::time::Duration;

/// Events a session reacts to outside of caller operations
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The handle played to the end of its resource
    Finished,
    /// The remote stream started or stopped refilling its buffer
    Buffering(bool),
    /// The handle hit an unrecoverable error
    Failed(String),
    /// Periodic position report
    Position { position_ms: u64, duration_ms: Option<u64> },
    /// The platform took the audio output away (call, alarm, other app)
    InterruptionBegan,
    /// The platform handed the audio output back
    InterruptionEnded,
}

pub(crate) enum Envelope {
    Notify {
        /// `None` for platform notifications that are not tied to a handle
        generation: Option<u64>,
        notification: Notification,
    },
    /// Acknowledged once every earlier envelope has been applied
    Barrier(SyncSender<()>),
    Shutdown,
}

pub(crate) fn channel() -> (Sender<Envelope>, Receiver<Envelope>) {
    mpsc::channel()
}

/// Sender for platform-level notifications (interruptions)
#[derive(Clone)]
pub struct SessionNotifier {
    tx: Sender<Envelope>,
}

impl SessionNotifier {
    pub(crate) fn new(tx: Sender<Envelope>) -> Self {
        Self { tx }
    }

    pub fn post(&self, notification: Notification) {
        send(&self.tx, None, notification);
    }

    pub fn interruption_began(&self) {
        self.post(Notification::InterruptionBegan);
    }

    pub fn interruption_ended(&self) {
        self.post(Notification::InterruptionEnded);
    }

    /// Block until every notification posted before this call has been applied.
    ///
    /// Returns false if the session is gone or the pump did not answer in time.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if self.tx.send(Envelope::Barrier(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }
}

/// Sender handed to a backend handle; every post carries the handle's generation
#[derive(Clone)]
pub struct HandleNotifier {
    generation: u64,
    tx: Sender<Envelope>,
}

impl HandleNotifier {
    pub(crate) fn new(generation: u64, tx: Sender<Envelope>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn post(&self, notification: Notification) {
        send(&self.tx, Some(self.generation), notification);
    }

    pub fn finished(&self) {
        self.post(Notification::Finished);
    }

    pub fn buffering(&self, buffering: bool) {
        self.post(Notification::Buffering(buffering));
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.post(Notification::Failed(message.into()));
    }

    pub fn position(&self, position_ms: u64, duration_ms: Option<u64>) {
        self.post(Notification::Position {
            position_ms,
            duration_ms,
        });
    }
}

/// Receiving end of a notifier created without a session
#[cfg(any(test, feature = "mock"))]
pub struct NotificationCapture {
    rx: Receiver<Envelope>,
}

#[cfg(any(test, feature = "mock"))]
impl NotificationCapture {
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(Envelope::Notify { notification, .. }) => return Some(notification),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(any(test, feature = "mock"))]
impl HandleNotifier {
    /// A notifier whose posts are collected instead of applied to a session
    pub fn capture(generation: u64) -> (Self, NotificationCapture) {
        let (tx, rx) = channel();
        (Self::new(generation, tx), NotificationCapture { rx })
    }
}

impl std::fmt::Debug for HandleNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleNotifier")
            .field("generation", &self.generation)
            .finish()
    }
}

fn send(tx: &Sender<Envelope>, generation: Option<u64>, notification: Notification) {
    if tx
        .send(Envelope::Notify {
            generation,
            notification,
        })
        .is_err()
    {
        // Session already dropped
        log::trace!("Dropping notification for closed session");
    }
}
