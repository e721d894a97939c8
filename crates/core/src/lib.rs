// Core types shared by the Audiowave session, backends and host bridge

pub mod callback;
pub mod cancel;
pub mod config;
pub mod error;
pub mod state;
pub mod uri;

// Re-export commonly used types
pub use callback::{CallbackEvent, EventDispatcher, PlayerCallback, RecordingCallback};
pub use cancel::CancelToken;
pub use config::{HttpConfig, SessionConfig, SessionPolicy};
pub use error::{AudioError, Result};
pub use state::{PlaybackMode, PlaybackStatus, PlayerState};
pub use uri::ResolvedResource;
