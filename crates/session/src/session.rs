// Audio playback session
//
// Every caller operation and every asynchronous notification is applied under
// one mutex. Host callbacks run after it is released. Remote loads open the
// stream on a worker thread without the lock, and the generation counter
// decides whether their result is still wanted when they come back.

use crate::backend::{Backends, PlaybackHandle};
use crate::focus::FocusGrant;
use crate::handle::{Handle, LocalHandle, PlayerGuard, RemoteHandle};
use crate::notify::{self, Envelope, HandleNotifier, Notification, SessionNotifier};
use audiowave_core::{
    uri, AudioError, CallbackEvent, CancelToken, EventDispatcher, PlaybackMode, PlaybackStatus, PlayerCallback,
    PlayerState, ResolvedResource, Result, SessionConfig,
};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

/// How long `flush_notifications` waits for the pump
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

struct PendingLoad {
    generation: u64,
    cancel: CancelToken,
}

struct SessionState {
    state: PlayerState,
    handle: Handle,
    /// Identifier as given by the caller; set from the start of a load
    uri: Option<String>,
    mode: Option<PlaybackMode>,
    focus: Option<FocusGrant>,
    /// Bumped on every load and teardown; stale notifications carry an older value
    generation: u64,
    pending: Option<PendingLoad>,
    interrupted: bool,
    volume: f32,
}

impl SessionState {
    fn new(volume: f32) -> Self {
        Self {
            state: PlayerState::Idle,
            handle: Handle::None,
            uri: None,
            mode: None,
            focus: None,
            generation: 0,
            pending: None,
            interrupted: false,
            volume,
        }
    }

    fn transition(&mut self, to: PlayerState, events: &mut Vec<CallbackEvent>) {
        if self.state == to {
            return;
        }
        if let Err(e) = self.state.validate_transition(to) {
            log::warn!("{}", e);
        }
        log::debug!("Session state {:?} -> {:?}", self.state, to);
        events.push(CallbackEvent::StateChanged {
            old_state: self.state,
            new_state: to,
        });
        self.state = to;
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            log::debug!("Cancelling pending remote load (generation {})", pending.generation);
            pending.cancel.cancel();
        }
    }

    /// Drop the resource and the audio focus and return to `Idle`.
    /// The handle slot is expected to be empty already.
    fn reset(&mut self, events: &mut Vec<CallbackEvent>) {
        self.cancel_pending();
        self.uri = None;
        self.mode = None;
        if let Some(grant) = self.focus.take() {
            log::debug!("Releasing audio focus {}", grant.id());
        }
        self.generation += 1;
        self.transition(PlayerState::Idle, events);
    }

    /// Detach everything the session holds and return to `Idle`.
    ///
    /// The handle is handed back so the caller releases it after dropping the
    /// session lock. Releasing a remote handle joins its decode thread, which
    /// can sit in a network read until the HTTP read timeout.
    #[must_use]
    fn teardown(&mut self, events: &mut Vec<CallbackEvent>) -> Handle {
        let handle = self.handle.take();
        self.reset(events);
        handle
    }

    fn install(&mut self, handle: Handle, events: &mut Vec<CallbackEvent>) {
        self.handle = handle;
        let volume = self.volume;
        if let Some(player) = self.handle.player_mut() {
            if let Err(e) = player.set_volume(volume) {
                log::warn!("Failed to apply volume to new handle: {}", e);
            }
        }
        if let (Some(uri), Some(mode)) = (self.uri.clone(), self.mode) {
            events.push(CallbackEvent::ResourceChanged { uri, mode });
        }
        self.transition(PlayerState::Loaded, events);
    }
}

struct Shared {
    inner: Mutex<SessionState>,
    callbacks: EventDispatcher,
    config: SessionConfig,
    backends: Backends,
    tx: Sender<Envelope>,
}

impl Shared {
    /// Common first half of every load, under the lock.
    ///
    /// The previous handle is detached and returned alongside the outcome;
    /// the caller releases it without the lock and before opening anything new.
    fn begin_load(
        &self,
        st: &mut SessionState,
        uri: &str,
        mode: PlaybackMode,
        events: &mut Vec<CallbackEvent>,
    ) -> (Handle, Result<(ResolvedResource, u64)>) {
        st.cancel_pending();
        let previous = st.handle.take();

        let resolved = match uri::resolve(uri, mode, self.config.asset_root.as_deref()) {
            Ok(resolved) => resolved,
            Err(e) => {
                log::error!("Cannot resolve {}: {}", uri, e);
                st.reset(events);
                return (previous, Err(e));
            }
        };

        if st.focus.is_none() {
            match self.backends.focus.acquire(self.config.policy) {
                Ok(grant) => st.focus = Some(grant),
                Err(e) => {
                    log::error!("Audio focus denied: {}", e);
                    st.reset(events);
                    return (previous, Err(e));
                }
            }
        }

        st.generation += 1;
        st.uri = Some(uri.to_string());
        st.mode = Some(mode);
        st.transition(PlayerState::Loading, events);
        (previous, Ok((resolved, st.generation)))
    }

    fn load_local(&self, uri: &str, events: &mut Vec<CallbackEvent>) -> Result<()> {
        let (mut previous, begun) = {
            let mut st = self.inner.lock();
            self.begin_load(&mut st, uri, PlaybackMode::Local, events)
        };
        // The previous resource goes away before anything new is opened
        previous.release();
        let (resolved, generation) = begun?;

        let mut st = self.inner.lock();
        if st.generation != generation {
            log::info!("Load of {} was superseded", uri);
            return Err(AudioError::Cancelled);
        }

        let opened = match resolved {
            ResolvedResource::File(path) => self
                .backends
                .local
                .open(&path, HandleNotifier::new(generation, self.tx.clone()))
                .map(|player| (path, PlayerGuard::new(player))),
            ResolvedResource::Url(url) => Err(AudioError::ResourceUnavailable(format!(
                "{} is not a local resource",
                url
            ))),
        };

        match opened {
            Ok((path, player)) => {
                log::info!("Loaded local resource {}", path.display());
                st.install(Handle::Local(LocalHandle { path, player }), events);
                Ok(())
            }
            Err(e) => {
                let e = e.into_unavailable();
                log::error!("Failed to load {}: {}", uri, e);
                st.reset(events);
                Err(e)
            }
        }
    }

    fn begin_remote_load(
        &self,
        uri: &str,
        events: &mut Vec<CallbackEvent>,
    ) -> (Handle, Result<(String, u64, CancelToken)>) {
        let mut st = self.inner.lock();
        let (previous, begun) = self.begin_load(&mut st, uri, PlaybackMode::Remote, events);
        let begun = match begun {
            Ok((ResolvedResource::Url(url), generation)) => {
                let cancel = CancelToken::new();
                st.pending = Some(PendingLoad {
                    generation,
                    cancel: cancel.clone(),
                });
                Ok((url, generation, cancel))
            }
            Ok((ResolvedResource::File(path), _)) => {
                st.reset(events);
                Err(AudioError::ResourceUnavailable(format!(
                    "{} is not a remote resource",
                    path.display()
                )))
            }
            Err(e) => Err(e),
        };
        (previous, begun)
    }

    /// Open a remote stream on a worker thread, waiting at most `load_timeout`.
    ///
    /// A handle that arrives after the caller stopped waiting is dropped by
    /// the worker, which releases it.
    fn open_remote(&self, url: &str, generation: u64, cancel: &CancelToken) -> Result<PlayerGuard> {
        let (tx, rx) = mpsc::sync_channel::<Result<PlayerGuard>>(1);
        let remote = self.backends.remote.clone();
        let notifier = HandleNotifier::new(generation, self.tx.clone());
        let worker_cancel = cancel.clone();
        let worker_url = url.to_string();

        thread::Builder::new()
            .name("audiowave-remote-load".to_string())
            .spawn(move || {
                let result = remote
                    .open(&worker_url, notifier, &worker_cancel)
                    .map(PlayerGuard::new);
                if tx.send(result).is_err() {
                    log::debug!("Remote load of {} finished after the caller gave up", worker_url);
                }
            })
            .map_err(|e| AudioError::PlaybackError(format!("Failed to spawn load thread: {}", e)))?;

        match rx.recv_timeout(self.config.load_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                Err(AudioError::ResourceUnavailable(format!(
                    "Timed out after {:?} opening {}",
                    self.config.load_timeout, url
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::ResourceUnavailable(format!(
                "Remote load of {} aborted",
                url
            ))),
        }
    }

    /// Install the opened stream if the load is still wanted.
    ///
    /// A handle that lost the race is returned for release outside the lock.
    fn finish_remote_load(
        &self,
        st: &mut SessionState,
        url: String,
        generation: u64,
        opened: Result<PlayerGuard>,
        events: &mut Vec<CallbackEvent>,
    ) -> (Result<()>, Option<PlayerGuard>) {
        let still_wanted = matches!(&st.pending, Some(p) if p.generation == generation);
        if !still_wanted {
            log::info!("Remote load of {} was superseded", url);
            return (Err(AudioError::Cancelled), opened.ok());
        }
        st.pending = None;

        match opened {
            Ok(player) => {
                log::info!("Loaded remote resource {}", url);
                st.install(
                    Handle::Remote(RemoteHandle {
                        url,
                        player,
                        buffering: false,
                    }),
                    events,
                );
                (Ok(()), None)
            }
            Err(e) => {
                let e = e.into_unavailable();
                log::error!("Failed to load {}: {}", url, e);
                st.reset(events);
                (Err(e), None)
            }
        }
    }

    /// Apply one notification; returns the events to dispatch
    fn apply(&self, generation: Option<u64>, notification: Notification) -> Vec<CallbackEvent> {
        let mut events = Vec::new();
        let mut released = Handle::None;
        let mut st = self.inner.lock();

        if let Some(generation) = generation {
            if generation != st.generation || st.handle.is_none() {
                log::debug!(
                    "Ignoring {:?} from generation {} (current {})",
                    notification,
                    generation,
                    st.generation
                );
                return events;
            }
        }

        match notification {
            Notification::Finished => {
                if st.state != PlayerState::Playing {
                    log::debug!("Ignoring completion in state {:?}", st.state);
                    return events;
                }
                log::info!("Playback completed");
                if let Some(player) = st.handle.player_mut() {
                    if let Err(e) = player.pause().and_then(|_| player.seek(0)) {
                        log::warn!("Failed to rewind after completion: {}", e);
                    }
                }
                st.transition(PlayerState::Loaded, &mut events);
                events.push(CallbackEvent::PlaybackCompleted);
            }
            Notification::Buffering(buffering) => {
                if let Handle::Remote(remote) = &mut st.handle {
                    if remote.buffering != buffering {
                        log::debug!("Buffering: {}", buffering);
                        remote.buffering = buffering;
                        events.push(CallbackEvent::BufferingChanged { buffering });
                    }
                }
            }
            Notification::Failed(message) => {
                log::error!("Playback failed: {}", message);
                events.push(CallbackEvent::Error { message });
                released = st.teardown(&mut events);
            }
            Notification::Position {
                position_ms,
                duration_ms,
            } => {
                events.push(CallbackEvent::PositionChanged {
                    position_ms,
                    duration_ms,
                });
            }
            Notification::InterruptionBegan => {
                if st.interrupted {
                    return events;
                }
                log::info!("Audio interruption began");
                st.interrupted = true;
                if st.state == PlayerState::Playing {
                    if let Some(player) = st.handle.player_mut() {
                        if let Err(e) = player.pause() {
                            log::warn!("Failed to pause for interruption: {}", e);
                        }
                    }
                    st.transition(PlayerState::Paused, &mut events);
                }
                events.push(CallbackEvent::Interrupted);
            }
            Notification::InterruptionEnded => {
                if st.interrupted {
                    log::info!("Audio interruption ended");
                    st.interrupted = false;
                    events.push(CallbackEvent::InterruptionEnded);
                }
            }
        }
        drop(st);
        released.release();
        events
    }
}

fn run_pump(shared: Weak<Shared>, rx: Receiver<Envelope>) {
    log::debug!("Notification pump started");
    while let Ok(envelope) = rx.recv() {
        match envelope {
            Envelope::Notify {
                generation,
                notification,
            } => {
                let Some(shared) = shared.upgrade() else { break };
                let events = shared.apply(generation, notification);
                shared.callbacks.dispatch_all(events);
            }
            Envelope::Barrier(ack) => {
                let _ = ack.send(());
            }
            Envelope::Shutdown => break,
        }
    }
    log::debug!("Notification pump exited");
}

/// A playback session owning the audio focus and at most one loaded resource
pub struct AudioPlaybackSession {
    shared: Arc<Shared>,
    notifier: SessionNotifier,
    pump: Option<thread::JoinHandle<()>>,
}

impl AudioPlaybackSession {
    pub fn new(config: SessionConfig, backends: Backends) -> Result<Self> {
        log::info!("Creating playback session ({:?})", config.policy);

        let (tx, rx) = notify::channel();
        let shared = Arc::new(Shared {
            inner: Mutex::new(SessionState::new(config.initial_volume)),
            callbacks: EventDispatcher::new(),
            config,
            backends,
            tx: tx.clone(),
        });

        let weak = Arc::downgrade(&shared);
        let pump = thread::Builder::new()
            .name("audiowave-notify".to_string())
            .spawn(move || run_pump(weak, rx))
            .map_err(|e| AudioError::PlaybackError(format!("Failed to spawn notification thread: {}", e)))?;

        Ok(Self {
            shared,
            notifier: SessionNotifier::new(tx),
            pump: Some(pump),
        })
    }

    /// Load `uri`, replacing whatever the session currently holds
    pub fn load(&self, uri: &str, mode: PlaybackMode) -> Result<()> {
        log::info!("Loading {} ({:?})", uri, mode);
        match mode {
            PlaybackMode::Local => {
                let mut events = Vec::new();
                let result = self.shared.load_local(uri, &mut events);
                self.shared.callbacks.dispatch_all(events);
                result
            }
            PlaybackMode::Remote => self.load_remote(uri),
        }
    }

    fn load_remote(&self, uri: &str) -> Result<()> {
        let mut events = Vec::new();
        let (mut previous, begun) = self.shared.begin_remote_load(uri, &mut events);
        previous.release();
        self.shared.callbacks.dispatch_all(std::mem::take(&mut events));
        let (url, generation, cancel) = begun?;

        let opened = self.shared.open_remote(&url, generation, &cancel);

        let (result, discarded) = {
            let mut st = self.shared.inner.lock();
            self.shared
                .finish_remote_load(&mut st, url, generation, opened, &mut events)
        };
        drop(discarded);
        self.shared.callbacks.dispatch_all(events);
        result
    }

    /// Abort an in-flight remote load; no-op otherwise
    pub fn cancel_load(&self) {
        let mut events = Vec::new();
        let mut released = Handle::None;
        {
            let mut st = self.shared.inner.lock();
            if st.pending.is_some() {
                log::info!("Remote load cancelled by caller");
                released = st.teardown(&mut events);
            }
        }
        released.release();
        self.shared.callbacks.dispatch_all(events);
    }

    pub fn play(&self) -> Result<()> {
        let mut events = Vec::new();
        let result = {
            let mut st = self.shared.inner.lock();
            self.play_locked(&mut st, &mut events)
        };
        self.shared.callbacks.dispatch_all(events);
        result
    }

    fn play_locked(&self, st: &mut SessionState, events: &mut Vec<CallbackEvent>) -> Result<()> {
        if !st.state.has_handle() {
            return Err(AudioError::NoResourceLoaded);
        }
        if st.interrupted {
            return Err(AudioError::PlaybackInterrupted);
        }
        if st.state == PlayerState::Playing {
            return Ok(());
        }
        let player = st.handle.player_mut().ok_or(AudioError::NoResourceLoaded)?;
        player.play()?;
        st.transition(PlayerState::Playing, events);
        Ok(())
    }

    /// Suspend playback; accepted in every state
    pub fn pause(&self) -> Result<()> {
        let mut events = Vec::new();
        let result = {
            let mut st = self.shared.inner.lock();
            if st.state == PlayerState::Playing {
                match st.handle.player_mut().map(|p| p.pause()) {
                    Some(Err(e)) => Err(e),
                    _ => {
                        st.transition(PlayerState::Paused, &mut events);
                        Ok(())
                    }
                }
            } else {
                Ok(())
            }
        };
        self.shared.callbacks.dispatch_all(events);
        result
    }

    /// Release the handle, the current resource and the audio focus.
    ///
    /// The session is `Idle` as soon as the lock is dropped; the handle itself
    /// is released afterwards, so other callers are not held up by it.
    pub fn stop(&self) {
        let mut events = Vec::new();
        let mut released = Handle::None;
        {
            let mut st = self.shared.inner.lock();
            if st.state != PlayerState::Idle || st.pending.is_some() || st.focus.is_some() {
                log::info!("Stopping session");
                released = st.teardown(&mut events);
            }
        }
        released.release();
        self.shared.callbacks.dispatch_all(events);
    }

    /// Seek to `position_ms`, clamped to the duration when it is known
    pub fn seek(&self, position_ms: u64) -> Result<()> {
        let mut events = Vec::new();
        let result = {
            let mut st = self.shared.inner.lock();
            match st.handle.player_mut() {
                None => Err(AudioError::NoResourceLoaded),
                Some(player) => {
                    let duration_ms = player.duration_ms();
                    let target = duration_ms.map_or(position_ms, |d| position_ms.min(d));
                    log::debug!("Seeking to {}ms", target);
                    player.seek(target).map(|_| {
                        events.push(CallbackEvent::PositionChanged {
                            position_ms: target,
                            duration_ms,
                        })
                    })
                }
            }
        };
        self.shared.callbacks.dispatch_all(events);
        result
    }

    /// Set the output volume, clamped into `[0.0, 1.0]`
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if volume.is_nan() {
            return Err(AudioError::InvalidState("Volume must be a number".to_string()));
        }
        let volume = volume.clamp(0.0, 1.0);
        let mut events = Vec::new();
        let result = {
            let mut st = self.shared.inner.lock();
            st.volume = volume;
            let applied = match st.handle.player_mut() {
                Some(player) => player.set_volume(volume),
                None => Ok(()),
            };
            if applied.is_ok() {
                events.push(CallbackEvent::VolumeChanged { volume });
            }
            applied
        };
        self.shared.callbacks.dispatch_all(events);
        result
    }

    pub fn volume(&self) -> f32 {
        self.shared.inner.lock().volume
    }

    /// Playback position; 0 without a handle
    pub fn position_ms(&self) -> u64 {
        self.shared
            .inner
            .lock()
            .handle
            .player()
            .map(|p| p.position_ms())
            .unwrap_or(0)
    }

    /// Duration of the loaded resource; `None` when unknown or idle
    pub fn duration_ms(&self) -> Option<u64> {
        self.shared
            .inner
            .lock()
            .handle
            .player()
            .and_then(|p| p.duration_ms())
    }

    pub fn state(&self) -> PlayerState {
        self.shared.inner.lock().state
    }

    pub fn current_uri(&self) -> Option<String> {
        self.shared.inner.lock().uri.clone()
    }

    pub fn mode(&self) -> Option<PlaybackMode> {
        self.shared.inner.lock().mode
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    pub fn is_buffering(&self) -> bool {
        self.shared.inner.lock().handle.is_buffering()
    }

    pub fn is_interrupted(&self) -> bool {
        self.shared.inner.lock().interrupted
    }

    pub fn status(&self) -> PlaybackStatus {
        let st = self.shared.inner.lock();
        let player: Option<&dyn PlaybackHandle> = st.handle.player();
        PlaybackStatus {
            state: st.state,
            mode: st.handle.mode().or(st.mode),
            uri: st.uri.clone(),
            position_ms: player.map(|p| p.position_ms()).unwrap_or(0),
            duration_ms: player.and_then(|p| p.duration_ms()),
            volume: st.volume,
            buffering: st.handle.is_buffering(),
            interrupted: st.interrupted,
        }
    }

    /// Replace the host callback; `None` removes it
    pub fn set_callback(&self, callback: Option<Arc<dyn PlayerCallback>>) {
        self.shared
            .callbacks
            .set_callback(callback, self.shared.config.position_update_interval_ms);
    }

    /// Sender for platform notifications such as interruptions
    pub fn notifier(&self) -> SessionNotifier {
        self.notifier.clone()
    }

    /// Wait until every notification posted so far has been applied
    pub fn flush_notifications(&self) -> bool {
        self.flush_notifications_within(FLUSH_TIMEOUT)
    }

    /// `flush_notifications` with a caller-chosen limit; false when it ran out
    pub fn flush_notifications_within(&self, timeout: Duration) -> bool {
        self.notifier.flush(timeout)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }
}

impl Drop for AudioPlaybackSession {
    fn drop(&mut self) {
        self.stop();
        let _ = self.shared.tx.send(Envelope::Shutdown);
        if let Some(pump) = self.pump.take() {
            // A host callback may drop the last reference from the pump itself
            if pump.thread().id() != thread::current().id() {
                let _ = pump.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::{AudioFocus, FocusArbiter};
    use crate::mock::MockBackend;
    use audiowave_core::{RecordingCallback, SessionPolicy};
    use std::time::Instant;

    fn session_with(backend: &MockBackend, arbiter: &FocusArbiter, config: SessionConfig) -> AudioPlaybackSession {
        AudioPlaybackSession::new(config, backend.backends(Arc::new(arbiter.clone()))).unwrap()
    }

    fn session(backend: &MockBackend) -> AudioPlaybackSession {
        session_with(backend, &FocusArbiter::new(), SessionConfig::default())
    }

    #[test]
    fn test_idle_queries() {
        let backend = MockBackend::new();
        let session = session(&backend);

        assert_eq!(session.state(), PlayerState::Idle);
        assert_eq!(session.position_ms(), 0);
        assert_eq!(session.duration_ms(), None);
        assert_eq!(session.current_uri(), None);
        assert!(!session.is_playing());
        assert_eq!(session.status(), PlaybackStatus::default());
    }

    #[test]
    fn test_operations_without_resource() {
        let backend = MockBackend::new();
        let session = session(&backend);

        assert_eq!(session.play(), Err(AudioError::NoResourceLoaded));
        assert_eq!(session.seek(100), Err(AudioError::NoResourceLoaded));
        assert_eq!(session.pause(), Ok(()));
    }

    #[test]
    fn test_stop_twice_from_idle() {
        let backend = MockBackend::new();
        let session = session(&backend);
        let recorder = Arc::new(RecordingCallback::new());
        session.set_callback(Some(recorder.clone()));

        session.stop();
        session.stop();

        assert_eq!(session.state(), PlayerState::Idle);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_local_scenario_ends_idle() {
        let backend = MockBackend::new();
        let arbiter = FocusArbiter::new();
        let session = session_with(&backend, &arbiter, SessionConfig::default());

        session.load("file:///a.mp3", PlaybackMode::Local).unwrap();
        assert_eq!(session.state(), PlayerState::Loaded);
        assert_eq!(session.current_uri().as_deref(), Some("file:///a.mp3"));
        assert_eq!(session.mode(), Some(PlaybackMode::Local));
        assert!(arbiter.is_held());

        session.play().unwrap();
        assert!(session.is_playing());
        session.pause().unwrap();
        assert_eq!(session.state(), PlayerState::Paused);
        session.play().unwrap();
        session.stop();

        assert_eq!(session.state(), PlayerState::Idle);
        assert_eq!(session.current_uri(), None);
        assert_eq!(backend.live_handles(), 0);
        assert!(!arbiter.is_held());
        assert_eq!(backend.log(), vec!["open local /a.mp3", "release local /a.mp3"]);
    }

    #[test]
    fn test_pause_resume_keeps_position() {
        let backend = MockBackend::new();
        let session = session(&backend);
        session.load("/music/a.mp3", PlaybackMode::Local).unwrap();
        session.play().unwrap();

        backend.advance(1500);
        session.pause().unwrap();
        let paused_at = session.position_ms();
        backend.advance(1000);
        assert_eq!(session.position_ms(), paused_at);

        session.play().unwrap();
        assert!(session.position_ms() >= paused_at);
        backend.advance(500);
        assert_eq!(session.position_ms(), 2000);
    }

    #[test]
    fn test_play_and_pause_are_idempotent() {
        let backend = MockBackend::new();
        let session = session(&backend);
        session.load("/a.mp3", PlaybackMode::Local).unwrap();

        session.pause().unwrap();
        assert_eq!(session.state(), PlayerState::Loaded);
        session.play().unwrap();
        session.play().unwrap();
        assert_eq!(session.state(), PlayerState::Playing);
        session.pause().unwrap();
        session.pause().unwrap();
        assert_eq!(session.state(), PlayerState::Paused);
    }

    #[test]
    fn test_seek_is_clamped_to_duration() {
        let backend = MockBackend::new().with_duration(Some(10_000));
        let session = session(&backend);
        session.load("/a.mp3", PlaybackMode::Local).unwrap();

        session.seek(4_000).unwrap();
        assert_eq!(session.position_ms(), 4_000);
        session.seek(99_000).unwrap();
        assert_eq!(session.position_ms(), 10_000);
        assert_eq!(session.duration_ms(), Some(10_000));
    }

    #[test]
    fn test_seek_with_unknown_duration() {
        let backend = MockBackend::new().with_duration(None);
        let session = session(&backend);
        session.load("/a.mp3", PlaybackMode::Local).unwrap();

        session.seek(99_000).unwrap();
        assert_eq!(session.position_ms(), 99_000);
        assert_eq!(session.duration_ms(), None);
    }

    #[test]
    fn test_local_replaces_remote_releasing_it_first() {
        let backend = MockBackend::new();
        let session = session(&backend);

        session.load("https://x/y.mp3", PlaybackMode::Remote).unwrap();
        session.play().unwrap();
        session.load("file:///a.mp3", PlaybackMode::Local).unwrap();

        assert_eq!(
            backend.log(),
            vec![
                "open remote https://x/y.mp3",
                "release remote https://x/y.mp3",
                "open local /a.mp3",
            ]
        );
        assert_eq!(backend.live_handles(), 1);
        assert_eq!(session.mode(), Some(PlaybackMode::Local));
        assert_eq!(session.state(), PlayerState::Loaded);
    }

    #[test]
    fn test_unreachable_remote_is_unavailable() {
        let backend = MockBackend::new();
        backend.mark_unreachable("https://x/y.mp3");
        let arbiter = FocusArbiter::new();
        let session = session_with(&backend, &arbiter, SessionConfig::default());

        let err = session.load("https://x/y.mp3", PlaybackMode::Remote).unwrap_err();
        assert!(matches!(err, AudioError::ResourceUnavailable(_)));
        assert_eq!(session.state(), PlayerState::Idle);
        assert_eq!(session.current_uri(), None);
        assert!(!arbiter.is_held());
    }

    #[test]
    fn test_missing_local_file_is_unavailable() {
        let backend = MockBackend::new();
        backend.mark_missing("/gone.mp3");
        let session = session(&backend);

        let err = session.load("/gone.mp3", PlaybackMode::Local).unwrap_err();
        assert!(matches!(err, AudioError::ResourceUnavailable(_)));
        assert_eq!(session.state(), PlayerState::Idle);
    }

    #[test]
    fn test_failed_load_drops_previous_resource() {
        let backend = MockBackend::new();
        backend.mark_missing("/gone.mp3");
        let session = session(&backend);

        session.load("/a.mp3", PlaybackMode::Local).unwrap();
        assert!(session.load("/gone.mp3", PlaybackMode::Local).is_err());
        assert_eq!(session.state(), PlayerState::Idle);
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn test_mode_mismatch_is_rejected() {
        let backend = MockBackend::new();
        let session = session(&backend);

        assert!(matches!(
            session.load("https://x/y.mp3", PlaybackMode::Local),
            Err(AudioError::ResourceUnavailable(_))
        ));
        assert!(matches!(
            session.load("/a.mp3", PlaybackMode::Remote),
            Err(AudioError::ResourceUnavailable(_))
        ));
        assert!(matches!(
            session.load("content://media/1", PlaybackMode::Local),
            Err(AudioError::ResourceUnavailable(_))
        ));
        assert!(backend.log().is_empty());
    }

    #[test]
    fn test_second_exclusive_session_is_refused() {
        let backend = MockBackend::new();
        let arbiter = FocusArbiter::new();
        let first = session_with(&backend, &arbiter, SessionConfig::default());
        let second = session_with(&backend, &arbiter, SessionConfig::default());

        first.load("/a.mp3", PlaybackMode::Local).unwrap();
        let err = second.load("/b.mp3", PlaybackMode::Local).unwrap_err();
        assert!(matches!(err, AudioError::SessionAcquisitionFailed(_)));
        assert_eq!(second.state(), PlayerState::Idle);

        first.stop();
        second.load("/b.mp3", PlaybackMode::Local).unwrap();
    }

    #[test]
    fn test_mixing_sessions_coexist() {
        let backend = MockBackend::new();
        let arbiter = FocusArbiter::new();
        let config = SessionConfig::default().with_policy(SessionPolicy::Mix);
        let first = session_with(&backend, &arbiter, config.clone());
        let second = session_with(&backend, &arbiter, config);

        first.load("/a.mp3", PlaybackMode::Local).unwrap();
        second.load("/b.mp3", PlaybackMode::Local).unwrap();
        assert!(arbiter.acquire(SessionPolicy::Exclusive).is_err());
    }

    #[test]
    fn test_superseded_remote_load_is_cancelled() {
        let backend = MockBackend::new().with_remote_delay(Duration::from_millis(300));
        let session = Arc::new(session(&backend));

        let first = {
            let session = session.clone();
            thread::spawn(move || session.load("https://x/slow.mp3", PlaybackMode::Remote))
        };
        let started = Instant::now();
        while session.state() != PlayerState::Loading && started.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }

        session.load("/a.mp3", PlaybackMode::Local).unwrap();
        assert_eq!(first.join().unwrap(), Err(AudioError::Cancelled));

        assert_eq!(session.state(), PlayerState::Loaded);
        assert_eq!(session.current_uri().as_deref(), Some("/a.mp3"));
        assert_eq!(backend.live_handles(), 1);
        assert!(!backend.log().contains(&"open remote https://x/slow.mp3".to_string()));
    }

    #[test]
    fn test_remote_load_times_out() {
        let backend = MockBackend::new().with_remote_delay(Duration::from_millis(500));
        let arbiter = FocusArbiter::new();
        let config = SessionConfig::default().with_load_timeout(Duration::from_millis(50));
        let session = session_with(&backend, &arbiter, config);

        let err = session.load("https://x/slow.mp3", PlaybackMode::Remote).unwrap_err();
        assert!(matches!(err, AudioError::ResourceUnavailable(_)));
        assert_eq!(session.state(), PlayerState::Idle);
        assert!(!arbiter.is_held());

        // The worker gives up on the cancel token without opening anything
        thread::sleep(Duration::from_millis(100));
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn test_cancel_load() {
        let backend = MockBackend::new().with_remote_delay(Duration::from_millis(300));
        let session = Arc::new(session(&backend));

        let pending = {
            let session = session.clone();
            thread::spawn(move || session.load("https://x/slow.mp3", PlaybackMode::Remote))
        };
        let started = Instant::now();
        while session.state() != PlayerState::Loading && started.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }

        session.cancel_load();
        assert_eq!(pending.join().unwrap(), Err(AudioError::Cancelled));
        assert_eq!(session.state(), PlayerState::Idle);
        assert_eq!(backend.live_handles(), 0);

        // Nothing pending any more
        session.cancel_load();
        assert_eq!(session.state(), PlayerState::Idle);
    }

    #[test]
    fn test_interruption_blocks_play_until_ended() {
        let backend = MockBackend::new();
        let session = session(&backend);
        let recorder = Arc::new(RecordingCallback::new());
        session.set_callback(Some(recorder.clone()));

        session.load("/a.mp3", PlaybackMode::Local).unwrap();
        session.play().unwrap();

        session.notifier().interruption_began();
        assert!(session.flush_notifications());
        assert_eq!(session.state(), PlayerState::Paused);
        assert!(session.is_interrupted());
        assert_eq!(session.play(), Err(AudioError::PlaybackInterrupted));

        session.notifier().interruption_ended();
        assert!(session.flush_notifications());
        // No automatic resume
        assert_eq!(session.state(), PlayerState::Paused);
        session.play().unwrap();
        assert!(session.is_playing());

        let events = recorder.events();
        assert!(events.contains(&CallbackEvent::Interrupted));
        assert!(events.contains(&CallbackEvent::InterruptionEnded));
    }

    #[test]
    fn test_completion_rewinds_to_loaded() {
        let backend = MockBackend::new().with_duration(Some(3_000));
        let session = session(&backend);
        let recorder = Arc::new(RecordingCallback::new());
        session.set_callback(Some(recorder.clone()));

        session.load("/a.mp3", PlaybackMode::Local).unwrap();
        session.play().unwrap();
        backend.advance(3_000);
        backend.last_notifier().unwrap().finished();
        assert!(session.flush_notifications());

        assert_eq!(session.state(), PlayerState::Loaded);
        assert_eq!(session.position_ms(), 0);
        assert!(recorder.events().contains(&CallbackEvent::PlaybackCompleted));

        session.play().unwrap();
        assert!(session.is_playing());
    }

    #[test]
    fn test_handle_failure_returns_to_idle() {
        let backend = MockBackend::new();
        let arbiter = FocusArbiter::new();
        let session = session_with(&backend, &arbiter, SessionConfig::default());
        let recorder = Arc::new(RecordingCallback::new());
        session.set_callback(Some(recorder.clone()));

        session.load("https://x/y.mp3", PlaybackMode::Remote).unwrap();
        session.play().unwrap();
        backend.last_notifier().unwrap().failed("connection reset");
        assert!(session.flush_notifications());

        assert_eq!(session.state(), PlayerState::Idle);
        assert_eq!(backend.live_handles(), 0);
        assert!(!arbiter.is_held());
        assert!(recorder.events().contains(&CallbackEvent::Error {
            message: "connection reset".to_string()
        }));
    }

    #[test]
    fn test_stale_notifications_are_ignored() {
        let backend = MockBackend::new();
        let session = session(&backend);

        session.load("https://x/y.mp3", PlaybackMode::Remote).unwrap();
        let stale = backend.last_notifier().unwrap();
        session.load("/a.mp3", PlaybackMode::Local).unwrap();
        session.play().unwrap();

        stale.failed("late error from the old stream");
        stale.finished();
        stale.buffering(true);
        assert!(session.flush_notifications());

        assert_eq!(session.state(), PlayerState::Playing);
        assert!(!session.is_buffering());
    }

    #[test]
    fn test_position_reports_follow_generation() {
        let backend = MockBackend::new().with_duration(Some(9_000));
        let session = session_with(
            &backend,
            &FocusArbiter::new(),
            SessionConfig::default().with_position_update_interval_ms(0),
        );
        let recorder = Arc::new(RecordingCallback::new());
        session.set_callback(Some(recorder.clone()));

        session.load("https://x/old.mp3", PlaybackMode::Remote).unwrap();
        let stale = backend.last_notifier().unwrap();
        session.load("https://x/new.mp3", PlaybackMode::Remote).unwrap();
        let current = backend.last_notifier().unwrap();
        session.play().unwrap();
        recorder.clear();

        stale.position(111, Some(5_000));
        current.position(1_250, Some(9_000));
        assert!(session.flush_notifications());

        assert_eq!(
            recorder.events(),
            vec![CallbackEvent::PositionChanged {
                position_ms: 1_250,
                duration_ms: Some(9_000),
            }]
        );
    }

    #[test]
    fn test_stop_does_not_hold_lock_while_releasing() {
        let backend = MockBackend::new().with_release_delay(Duration::from_millis(600));
        let session = Arc::new(session(&backend));
        session.load("https://x/y.mp3", PlaybackMode::Remote).unwrap();
        session.play().unwrap();

        let stopping = {
            let session = session.clone();
            thread::spawn(move || session.stop())
        };
        let started = Instant::now();
        while session.state() != PlayerState::Idle && started.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }

        // The handle is still being released, yet queries answer at once
        let queried = Instant::now();
        assert_eq!(session.status().state, PlayerState::Idle);
        assert_eq!(session.position_ms(), 0);
        assert!(queried.elapsed() < Duration::from_millis(300));
        assert!(!backend.log().contains(&"release remote https://x/y.mp3".to_string()));

        stopping.join().unwrap();
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn test_replacing_load_releases_before_opening() {
        let backend = MockBackend::new().with_release_delay(Duration::from_millis(50));
        let session = session(&backend);

        session.load("https://x/y.mp3", PlaybackMode::Remote).unwrap();
        session.load("https://x/z.mp3", PlaybackMode::Remote).unwrap();

        assert_eq!(
            backend.log(),
            vec![
                "open remote https://x/y.mp3",
                "release remote https://x/y.mp3",
                "open remote https://x/z.mp3",
            ]
        );
        assert_eq!(backend.live_handles(), 1);
        assert_eq!(session.state(), PlayerState::Loaded);
    }

    #[test]
    fn test_buffering_flag_follows_remote_handle() {
        let backend = MockBackend::new();
        let session = session(&backend);
        let recorder = Arc::new(RecordingCallback::new());
        session.set_callback(Some(recorder.clone()));

        session.load("https://x/y.mp3", PlaybackMode::Remote).unwrap();
        let notifier = backend.last_notifier().unwrap();
        notifier.buffering(true);
        assert!(session.flush_notifications());
        assert!(session.is_buffering());
        assert!(session.status().buffering);

        notifier.buffering(false);
        assert!(session.flush_notifications());
        assert!(!session.is_buffering());

        let buffering_events: Vec<_> = recorder
            .events()
            .into_iter()
            .filter(|e| matches!(e, CallbackEvent::BufferingChanged { .. }))
            .collect();
        assert_eq!(buffering_events.len(), 2);
    }

    #[test]
    fn test_volume_is_clamped_and_kept_across_loads() {
        let backend = MockBackend::new();
        let session = session(&backend);

        session.set_volume(1.7).unwrap();
        assert_eq!(session.volume(), 1.0);
        session.set_volume(0.25).unwrap();
        session.load("/a.mp3", PlaybackMode::Local).unwrap();
        assert_eq!(backend.last_volume(), Some(0.25));
        assert!(session.set_volume(f32::NAN).is_err());
        session.set_volume(-3.0).unwrap();
        assert_eq!(backend.last_volume(), Some(0.0));
    }

    #[test]
    fn test_event_order_for_load_and_play() {
        let backend = MockBackend::new();
        let session = session(&backend);
        let recorder = Arc::new(RecordingCallback::new());
        session.set_callback(Some(recorder.clone()));

        session.load("/a.mp3", PlaybackMode::Local).unwrap();
        session.play().unwrap();

        assert_eq!(
            recorder.events(),
            vec![
                CallbackEvent::StateChanged {
                    old_state: PlayerState::Idle,
                    new_state: PlayerState::Loading,
                },
                CallbackEvent::ResourceChanged {
                    uri: "/a.mp3".to_string(),
                    mode: PlaybackMode::Local,
                },
                CallbackEvent::StateChanged {
                    old_state: PlayerState::Loading,
                    new_state: PlayerState::Loaded,
                },
                CallbackEvent::StateChanged {
                    old_state: PlayerState::Loaded,
                    new_state: PlayerState::Playing,
                },
            ]
        );
    }

    #[test]
    fn test_drop_releases_everything() {
        let backend = MockBackend::new();
        let arbiter = FocusArbiter::new();
        {
            let session = session_with(&backend, &arbiter, SessionConfig::default());
            session.load("/a.mp3", PlaybackMode::Local).unwrap();
            session.play().unwrap();
        }
        assert_eq!(backend.live_handles(), 0);
        assert!(!arbiter.is_held());
    }

    #[test]
    fn test_asset_uri_uses_asset_root() {
        let backend = MockBackend::new();
        let config = SessionConfig::default().with_asset_root("/bundle/assets");
        let session = session_with(&backend, &FocusArbiter::new(), config);

        session.load("asset://sounds/ping.wav", PlaybackMode::Local).unwrap();
        assert_eq!(backend.log(), vec!["open local /bundle/assets/sounds/ping.wav"]);
    }
}
