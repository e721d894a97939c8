// Host bridge for Audiowave
// Provides a player registry plus C ABI and JNI entrypoints over the playback session.

pub mod bridge;
pub mod capi;
pub mod logging;
pub mod registry;

#[cfg(feature = "android")]
mod jni_bridge;

pub use capi::{AudiowaveEventFn, AUDIOWAVE_DURATION_UNKNOWN};
pub use logging::init_logging;
pub use registry::{register_session, remove_session, with_session};
