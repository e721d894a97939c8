// Playback session: one claim on the audio output, at most one loaded resource

pub mod backend;
pub mod focus;
mod handle;
pub mod notify;
pub mod session;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backend::{Backends, LocalPlayback, PlaybackHandle, RemotePlayback};
pub use focus::{AudioFocus, FocusArbiter, FocusGrant};
pub use notify::{HandleNotifier, Notification, SessionNotifier};
#[cfg(any(test, feature = "mock"))]
pub use notify::NotificationCapture;
pub use session::AudioPlaybackSession;
