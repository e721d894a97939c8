// Playback session state and status snapshot

use crate::error::{AudioError, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No resource loaded, no audio output claimed
    Idle,
    /// A remote resource is being opened
    Loading,
    /// A resource is loaded and ready to play
    Loaded,
    /// Audio is currently playing
    Playing,
    /// Playback is suspended, handle kept
    Paused,
}

impl PlayerState {
    /// Whether a handle is installed in this state
    pub fn has_handle(self) -> bool {
        matches!(self, PlayerState::Loaded | PlayerState::Playing | PlayerState::Paused)
    }

    /// Numeric code exposed over the host bridge
    pub fn code(self) -> i32 {
        match self {
            PlayerState::Idle => 0,
            PlayerState::Loading => 1,
            PlayerState::Loaded => 2,
            PlayerState::Playing => 3,
            PlayerState::Paused => 4,
        }
    }

    /// Check a transition against the session state machine.
    ///
    /// Self-transitions are accepted so idempotent operations never fail here.
    pub fn validate_transition(self, to: PlayerState) -> Result<()> {
        if self == to {
            return Ok(());
        }

        match (self, to) {
            // From Idle
            (PlayerState::Idle, PlayerState::Loading) => Ok(()),

            // From Loading
            (PlayerState::Loading, PlayerState::Loaded) => Ok(()),
            (PlayerState::Loading, PlayerState::Idle) => Ok(()),

            // From Loaded
            (PlayerState::Loaded, PlayerState::Playing) => Ok(()),
            (PlayerState::Loaded, PlayerState::Loading) => Ok(()),
            (PlayerState::Loaded, PlayerState::Idle) => Ok(()),

            // From Playing
            (PlayerState::Playing, PlayerState::Paused) => Ok(()),
            (PlayerState::Playing, PlayerState::Loaded) => Ok(()), // stream finished
            (PlayerState::Playing, PlayerState::Loading) => Ok(()),
            (PlayerState::Playing, PlayerState::Idle) => Ok(()),

            // From Paused
            (PlayerState::Paused, PlayerState::Playing) => Ok(()),
            (PlayerState::Paused, PlayerState::Loading) => Ok(()),
            (PlayerState::Paused, PlayerState::Idle) => Ok(()),

            _ => Err(AudioError::InvalidState(format!(
                "Invalid state transition from {:?} to {:?}",
                self, to
            ))),
        }
    }
}

/// Which backend owns the audio output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackMode {
    /// File on device storage or bundled asset
    Local,
    /// HTTP(S) stream
    Remote,
}

impl PlaybackMode {
    /// Pick the mode a bare URI most likely wants
    pub fn infer(uri: &str) -> Self {
        if crate::uri::is_remote(uri) {
            PlaybackMode::Remote
        } else {
            PlaybackMode::Local
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(PlaybackMode::Local),
            1 => Ok(PlaybackMode::Remote),
            other => Err(AudioError::InvalidState(format!("Unknown playback mode {}", other))),
        }
    }
}

/// Playback status snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub state: PlayerState,
    pub mode: Option<PlaybackMode>,
    pub uri: Option<String>,
    /// Current playback position in milliseconds
    pub position_ms: u64,
    /// Total duration in milliseconds, if known
    pub duration_ms: Option<u64>,
    /// Current volume (0.0 - 1.0)
    pub volume: f32,
    /// Whether the remote stream is refilling its buffer
    pub buffering: bool,
    /// Whether an external interruption is active
    pub interrupted: bool,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            state: PlayerState::Idle,
            mode: None,
            uri: None,
            position_ms: 0,
            duration_ms: None,
            volume: 1.0,
            buffering: false,
            interrupted: false,
        }
    }
}
