// Error handling for the playback session and its backends

use std::fmt;

/// Audio session error types
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// The resource identifier does not resolve to playable audio
    ResourceUnavailable(String),

    /// The audio output could not be claimed for this session
    SessionAcquisitionFailed(String),

    /// The operation needs a loaded resource
    NoResourceLoaded,

    /// An external interruption (phone call, alarm) holds the output
    PlaybackInterrupted,

    /// A pending load was superseded before it completed
    Cancelled,

    /// Invalid state transition or argument
    InvalidState(String),

    /// Audio format not supported
    UnsupportedFormat(String),

    /// Decoding error
    DecodingError(String),

    /// Output device error
    DeviceError(String),

    /// Output stream error
    PlaybackError(String),

    /// Network error (probe/streaming)
    NetworkError(String),

    /// IO error
    IoError(String),
}

impl AudioError {
    /// Collapse transport and codec failures into `ResourceUnavailable`.
    ///
    /// Used at load time, where the caller only needs to know that the
    /// identifier could not be turned into a playable handle.
    pub fn into_unavailable(self) -> AudioError {
        match self {
            AudioError::NetworkError(msg)
            | AudioError::IoError(msg)
            | AudioError::DecodingError(msg)
            | AudioError::UnsupportedFormat(msg) => AudioError::ResourceUnavailable(msg),
            other => other,
        }
    }

    /// Stable numeric code for bridge callers
    pub fn code(&self) -> i32 {
        match self {
            AudioError::InvalidState(_) => -1,
            AudioError::ResourceUnavailable(_) => -2,
            AudioError::SessionAcquisitionFailed(_) => -3,
            AudioError::NoResourceLoaded => -4,
            AudioError::PlaybackInterrupted => -5,
            AudioError::Cancelled => -6,
            AudioError::UnsupportedFormat(_) | AudioError::DecodingError(_) => -7,
            AudioError::DeviceError(_) | AudioError::PlaybackError(_) => -8,
            AudioError::NetworkError(_) | AudioError::IoError(_) => -9,
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AudioError::ResourceUnavailable(msg) => write!(f, "Resource unavailable: {}", msg),
            AudioError::SessionAcquisitionFailed(msg) => {
                write!(f, "Audio session acquisition failed: {}", msg)
            }
            AudioError::NoResourceLoaded => write!(f, "No resource loaded"),
            AudioError::PlaybackInterrupted => write!(f, "Playback interrupted"),
            AudioError::Cancelled => write!(f, "Load cancelled"),
            AudioError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            AudioError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            AudioError::DecodingError(msg) => write!(f, "Decoding error: {}", msg),
            AudioError::DeviceError(msg) => write!(f, "Device error: {}", msg),
            AudioError::PlaybackError(msg) => write!(f, "Playback error: {}", msg),
            AudioError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AudioError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// Result type alias for audio operations
pub type Result<T> = std::result::Result<T, AudioError>;

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::IoError(err.to_string())
    }
}
