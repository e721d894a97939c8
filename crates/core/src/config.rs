// Session and transport configuration

use std::path::PathBuf;
use std::time::Duration;

/// How the session shares the audio output with other sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Sole owner of the output; other claims are refused while held
    Exclusive,
    /// Mixes with other mixable sessions
    Mix,
}

/// Playback session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub policy: SessionPolicy,
    /// Upper bound on how long `load` waits for a remote stream to open
    pub load_timeout: Duration,
    /// Minimum spacing of position events delivered to host callbacks
    pub position_update_interval_ms: u64,
    /// Directory bundled assets (`asset://`, relative paths) live under
    pub asset_root: Option<PathBuf>,
    /// Initial output volume
    pub initial_volume: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: SessionPolicy::Exclusive,
            load_timeout: Duration::from_secs(15),
            position_update_interval_ms: 200,
            asset_root: None,
            initial_volume: 1.0,
        }
    }
}

impl SessionConfig {
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn with_position_update_interval_ms(mut self, interval_ms: u64) -> Self {
        self.position_update_interval_ms = interval_ms;
        self
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(root.into());
        self
    }

    /// Volume applied to every new handle, clamped into `[0.0, 1.0]`; NaN falls back to 1.0
    pub fn with_initial_volume(mut self, volume: f32) -> Self {
        self.initial_volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
        self
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub user_agent: String,
    pub redirects: u32,
    /// Extra attempts for the initial probe request
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (compatible; Audiowave/0.1)".to_string(),
            redirects: 10,
            max_retries: 2,
        }
    }
}

impl HttpConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}
