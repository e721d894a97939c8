// In-memory playback backends
//
// Handles track play state, position and volume without producing sound.
// Position only moves when the owner calls `MockBackend::advance`.

use crate::backend::{Backends, LocalPlayback, PlaybackHandle, RemotePlayback};
use crate::focus::AudioFocus;
use crate::notify::HandleNotifier;
use audiowave_core::{AudioError, CancelToken, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct MockPlayerState {
    playing: bool,
    position_ms: u64,
    volume: f32,
    released: bool,
}

#[derive(Default)]
struct MockState {
    log: Vec<String>,
    missing: HashSet<PathBuf>,
    unreachable: HashSet<String>,
    remote_delay: Duration,
    release_delay: Duration,
    duration_ms: Option<u64>,
    players: Vec<Arc<Mutex<MockPlayerState>>>,
    notifiers: Vec<HandleNotifier>,
}

/// Local and remote backend in one, sharing an operation log
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.state.lock().duration_ms = Some(60_000);
        backend
    }

    pub fn with_duration(self, duration_ms: Option<u64>) -> Self {
        self.state.lock().duration_ms = duration_ms;
        self
    }

    /// Make remote opens take this long
    pub fn with_remote_delay(self, delay: Duration) -> Self {
        self.state.lock().remote_delay = delay;
        self
    }

    /// Make releasing a handle block this long, like joining a stalled decode thread
    pub fn with_release_delay(self, delay: Duration) -> Self {
        self.state.lock().release_delay = delay;
        self
    }

    pub fn mark_missing(&self, path: impl Into<PathBuf>) {
        self.state.lock().missing.insert(path.into());
    }

    pub fn mark_unreachable(&self, url: impl Into<String>) {
        self.state.lock().unreachable.insert(url.into());
    }

    pub fn backends(&self, focus: Arc<dyn AudioFocus>) -> Backends {
        Backends::new(Arc::new(self.clone()), Arc::new(self.clone())).with_focus(focus)
    }

    /// Operation log, e.g. `open local /a.mp3`, `release remote https://x/y.mp3`
    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Number of opened handles not yet released
    pub fn live_handles(&self) -> usize {
        self.state
            .lock()
            .players
            .iter()
            .filter(|p| !p.lock().released)
            .count()
    }

    /// Move every playing handle forward by `ms`
    pub fn advance(&self, ms: u64) {
        let state = self.state.lock();
        let duration = state.duration_ms;
        for player in state.players.iter() {
            let mut player = player.lock();
            if player.playing && !player.released {
                player.position_ms += ms;
                if let Some(d) = duration {
                    player.position_ms = player.position_ms.min(d);
                }
            }
        }
    }

    /// Notifier of the most recently opened handle
    pub fn last_notifier(&self) -> Option<HandleNotifier> {
        self.state.lock().notifiers.last().cloned()
    }

    pub fn last_volume(&self) -> Option<f32> {
        self.state.lock().players.last().map(|p| p.lock().volume)
    }

    fn create(&self, kind: &'static str, name: String, notifier: HandleNotifier) -> Box<dyn PlaybackHandle> {
        let player = Arc::new(Mutex::new(MockPlayerState {
            volume: 1.0,
            ..Default::default()
        }));
        let mut state = self.state.lock();
        state.log.push(format!("open {} {}", kind, name));
        state.players.push(player.clone());
        state.notifiers.push(notifier);
        Box::new(MockPlayer {
            kind,
            name,
            duration_ms: state.duration_ms,
            player,
            backend: self.clone(),
        })
    }
}

impl LocalPlayback for MockBackend {
    fn open(&self, path: &Path, notifier: HandleNotifier) -> Result<Box<dyn PlaybackHandle>> {
        if self.state.lock().missing.contains(path) {
            return Err(AudioError::ResourceUnavailable(format!(
                "File not found: {}",
                path.display()
            )));
        }
        Ok(self.create("local", path.display().to_string(), notifier))
    }
}

impl RemotePlayback for MockBackend {
    fn open(&self, url: &str, notifier: HandleNotifier, cancel: &CancelToken) -> Result<Box<dyn PlaybackHandle>> {
        let (unreachable, delay) = {
            let state = self.state.lock();
            (state.unreachable.contains(url), state.remote_delay)
        };

        let started = Instant::now();
        while started.elapsed() < delay {
            cancel.check()?;
            thread::sleep(Duration::from_millis(5));
        }
        cancel.check()?;

        if unreachable {
            return Err(AudioError::NetworkError(format!("Host unreachable: {}", url)));
        }
        Ok(self.create("remote", url.to_string(), notifier))
    }
}

struct MockPlayer {
    kind: &'static str,
    name: String,
    duration_ms: Option<u64>,
    player: Arc<Mutex<MockPlayerState>>,
    backend: MockBackend,
}

impl PlaybackHandle for MockPlayer {
    fn play(&mut self) -> Result<()> {
        self.player.lock().playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.player.lock().playing = false;
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        self.player.lock().position_ms = position_ms;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.player.lock().volume = volume;
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.player.lock().position_ms
    }

    fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    fn release(&mut self) {
        let delay = self.backend.state.lock().release_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        {
            let mut player = self.player.lock();
            player.playing = false;
            player.released = true;
        }
        self.backend
            .state
            .lock()
            .log
            .push(format!("release {} {}", self.kind, self.name));
    }
}
