// Host-facing session events
// Position updates are throttled so the bridge is not flooded from the decode thread

use crate::state::{PlaybackMode, PlayerState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Session event types
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    /// Session state changed
    StateChanged {
        old_state: PlayerState,
        new_state: PlayerState,
    },

    /// A new resource became current
    ResourceChanged { uri: String, mode: PlaybackMode },

    /// Playback position updated
    PositionChanged {
        position_ms: u64,
        duration_ms: Option<u64>,
    },

    /// The loaded resource played to its end
    PlaybackCompleted,

    /// Asynchronous playback failure; the handle has been released
    Error { message: String },

    /// Remote stream buffering state changed
    BufferingChanged { buffering: bool },

    /// Volume changed
    VolumeChanged { volume: f32 },

    /// External interruption started; playback was paused
    Interrupted,

    /// External interruption ended; `play()` may resume
    InterruptionEnded,
}

/// Receiver of session events on the host side.
///
/// Called on whichever thread applied the change, never with the session
/// lock held. Keep it short.
pub trait PlayerCallback: Send + Sync {
    fn on_event(&self, event: CallbackEvent);
}

struct Subscriber {
    callback: Arc<dyn PlayerCallback>,
    /// Minimum spacing between two delivered `PositionChanged`
    position_gap: Duration,
    last_position_at: Mutex<Option<Instant>>,
}

impl Subscriber {
    fn deliver(&self, event: CallbackEvent) {
        if matches!(event, CallbackEvent::PositionChanged { .. }) {
            let now = Instant::now();
            let mut last = self.last_position_at.lock();
            if matches!(*last, Some(at) if now.duration_since(at) < self.position_gap) {
                return;
            }
            *last = Some(now);
        }
        self.callback.on_event(event);
    }
}

/// Hands session events to the current host callback, thinning position updates
#[derive(Default)]
pub struct EventDispatcher {
    subscriber: Mutex<Option<Arc<Subscriber>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the callback; `None` silences the dispatcher
    pub fn set_callback(&self, callback: Option<Arc<dyn PlayerCallback>>, position_gap_ms: u64) {
        *self.subscriber.lock() = callback.map(|callback| {
            Arc::new(Subscriber {
                callback,
                position_gap: Duration::from_millis(position_gap_ms),
                last_position_at: Mutex::new(None),
            })
        });
    }

    pub fn dispatch_all(&self, events: Vec<CallbackEvent>) {
        if events.is_empty() {
            return;
        }
        // Cloned out so the callback may replace itself
        let Some(subscriber) = self.subscriber.lock().clone() else {
            return;
        };
        for event in events {
            subscriber.deliver(event);
        }
    }
}

/// Callback that records every event, for tests
#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<CallbackEvent>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl PlayerCallback for RecordingCallback {
    fn on_event(&self, event: CallbackEvent) {
        self.events.lock().push(event);
    }
}
