// Playback backend seams
//
// The session owns at most one handle at a time and drives it through
// `PlaybackHandle`. Backends create handles; they report asynchronous events
// through the `HandleNotifier` they are given and must never call back into
// the session.

use crate::focus::{AudioFocus, FocusArbiter};
use crate::notify::HandleNotifier;
use audiowave_core::{CancelToken, Result};
use std::path::Path;
use std::sync::Arc;

/// A loaded, playable audio resource
pub trait PlaybackHandle: Send {
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn seek(&mut self, position_ms: u64) -> Result<()>;

    fn set_volume(&mut self, volume: f32) -> Result<()>;

    fn position_ms(&self) -> u64;

    /// `None` while the length is unknown
    fn duration_ms(&self) -> Option<u64>;

    /// Stop output and free every backend resource.
    ///
    /// Called exactly once, before the handle is dropped.
    fn release(&mut self);
}

/// Opens files on device storage
pub trait LocalPlayback: Send + Sync {
    fn open(&self, path: &Path, notifier: HandleNotifier) -> Result<Box<dyn PlaybackHandle>>;
}

/// Opens HTTP(S) streams.
///
/// `open` runs on a worker thread without the session lock and may block on
/// the network; it should return `Cancelled` promptly once `cancel` trips.
pub trait RemotePlayback: Send + Sync {
    fn open(&self, url: &str, notifier: HandleNotifier, cancel: &CancelToken) -> Result<Box<dyn PlaybackHandle>>;
}

/// The collaborators a session is built from
#[derive(Clone)]
pub struct Backends {
    pub local: Arc<dyn LocalPlayback>,
    pub remote: Arc<dyn RemotePlayback>,
    pub focus: Arc<dyn AudioFocus>,
}

impl Backends {
    /// Backends sharing the process-wide focus arbiter
    pub fn new(local: Arc<dyn LocalPlayback>, remote: Arc<dyn RemotePlayback>) -> Self {
        Self {
            local,
            remote,
            focus: Arc::new(FocusArbiter::global()),
        }
    }

    pub fn with_focus(mut self, focus: Arc<dyn AudioFocus>) -> Self {
        self.focus = focus;
        self
    }
}
