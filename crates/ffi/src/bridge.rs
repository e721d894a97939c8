// Host-facing operations, independent of the calling convention
//
// The C ABI and the JNI entrypoints are thin wrappers around these functions.

use crate::registry::{register_session, with_session};
use audiowave_core::uri::resolve;
use audiowave_core::{AudioError, PlaybackMode, PlayerCallback, Result, SessionConfig};
use audiowave_decode::{generate_waveform, probe_duration_ms};
use audiowave_engine::{engine_backends, EngineConfig};
use audiowave_session::{AudioPlaybackSession, Backends};
use audiowave_transport_http::HttpClient;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Session settings applied to players created after the change
static BRIDGE_CONFIG: Lazy<Mutex<SessionConfig>> = Lazy::new(|| Mutex::new(SessionConfig::default()));

static PROBE_CLIENT: Lazy<HttpClient> = Lazy::new(HttpClient::default);

/// How long an interruption call waits for the session to apply it
const INTERRUPTION_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub fn set_asset_root(root: Option<PathBuf>) {
    log::info!("Asset root set to {:?}", root);
    BRIDGE_CONFIG.lock().asset_root = root;
}

pub fn session_config() -> SessionConfig {
    BRIDGE_CONFIG.lock().clone()
}

/// Create a player on the default output device
pub fn create_player() -> Result<i64> {
    create_player_with(session_config(), engine_backends(EngineConfig::default()))
}

pub fn create_player_with(config: SessionConfig, backends: Backends) -> Result<i64> {
    let session = AudioPlaybackSession::new(config, backends)?;
    Ok(register_session(session))
}

pub fn load(id: i64, uri: &str, mode: PlaybackMode) -> Result<()> {
    with_session(id, |s| s.load(uri, mode))
}

/// Play `uri`, resuming it when it is already the loaded resource
pub fn play_audio(id: i64, uri: &str) -> Result<()> {
    with_session(id, |s| {
        let resume = s.state().has_handle() && s.current_uri().as_deref() == Some(uri);
        if !resume {
            s.load(uri, PlaybackMode::infer(uri))?;
        }
        s.play()
    })
}

pub fn play(id: i64) -> Result<()> {
    with_session(id, |s| s.play())
}

pub fn pause(id: i64) -> Result<()> {
    with_session(id, |s| s.pause())
}

pub fn stop(id: i64) -> Result<()> {
    with_session(id, |s| {
        s.stop();
        Ok(())
    })
}

pub fn cancel_load(id: i64) -> Result<()> {
    with_session(id, |s| {
        s.cancel_load();
        Ok(())
    })
}

pub fn seek(id: i64, position_ms: u64) -> Result<()> {
    with_session(id, |s| s.seek(position_ms))
}

pub fn set_volume(id: i64, volume: f32) -> Result<()> {
    with_session(id, |s| s.set_volume(volume))
}

pub fn position_ms(id: i64) -> Result<u64> {
    with_session(id, |s| Ok(s.position_ms()))
}

pub fn duration_ms(id: i64) -> Result<Option<u64>> {
    with_session(id, |s| Ok(s.duration_ms()))
}

pub fn is_playing(id: i64) -> Result<bool> {
    with_session(id, |s| Ok(s.is_playing()))
}

pub fn is_buffering(id: i64) -> Result<bool> {
    with_session(id, |s| Ok(s.is_buffering()))
}

pub fn state_code(id: i64) -> Result<i32> {
    with_session(id, |s| Ok(s.state().code()))
}

pub fn set_callback(id: i64, callback: Option<Arc<dyn PlayerCallback>>) -> Result<()> {
    with_session(id, |s| {
        s.set_callback(callback);
        Ok(())
    })
}

/// Apply an interruption before returning so the host sees the paused state
pub fn interruption_began(id: i64) -> Result<()> {
    with_session(id, |s| apply_interruption(s, true, INTERRUPTION_FLUSH_TIMEOUT))
}

pub fn interruption_ended(id: i64) -> Result<()> {
    with_session(id, |s| apply_interruption(s, false, INTERRUPTION_FLUSH_TIMEOUT))
}

fn apply_interruption(session: &AudioPlaybackSession, began: bool, timeout: Duration) -> Result<()> {
    let notifier = session.notifier();
    if began {
        notifier.interruption_began();
    } else {
        notifier.interruption_ended();
    }
    if session.flush_notifications_within(timeout) {
        Ok(())
    } else {
        Err(AudioError::PlaybackError(format!(
            "Interruption not applied within {:?}",
            timeout
        )))
    }
}

/// Duration of `uri` without loading it into a player
pub fn audio_duration_ms(uri: &str) -> Result<u64> {
    let asset_root = BRIDGE_CONFIG.lock().asset_root.clone();
    let resource = resolve(uri, PlaybackMode::infer(uri), asset_root.as_deref())?;
    probe_duration_ms(&resource, &PROBE_CLIENT)
}

pub fn waveform(uri: &str, samples: usize) -> Result<Vec<f32>> {
    let asset_root = BRIDGE_CONFIG.lock().asset_root.clone();
    let resource = resolve(uri, PlaybackMode::infer(uri), asset_root.as_deref())?;
    log::info!("Generating {} waveform points for {}", samples, uri);
    generate_waveform(&resource, samples, &PROBE_CLIENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::remove_session;
    use audiowave_core::{CallbackEvent, PlayerState};
    use audiowave_session::mock::MockBackend;
    use audiowave_session::FocusArbiter;

    fn mock_player(backend: &MockBackend) -> i64 {
        create_player_with(SessionConfig::default(), backend.backends(Arc::new(FocusArbiter::new()))).unwrap()
    }

    #[test]
    fn test_play_audio_loads_then_resumes() {
        let backend = MockBackend::new();
        let id = mock_player(&backend);

        play_audio(id, "file:///a.mp3").unwrap();
        assert!(is_playing(id).unwrap());
        backend.advance(1_500);
        pause(id).unwrap();
        assert_eq!(state_code(id).unwrap(), PlayerState::Paused.code());

        // Same URI resumes the loaded handle
        play_audio(id, "file:///a.mp3").unwrap();
        assert!(is_playing(id).unwrap());
        assert!(position_ms(id).unwrap() >= 1_500);
        let opens = backend.log().iter().filter(|e| e.starts_with("open")).count();
        assert_eq!(opens, 1);

        // A different URI replaces it, inferring the mode
        play_audio(id, "https://example.com/b.mp3").unwrap();
        assert!(backend.log().contains(&"release local /a.mp3".to_string()));
        assert!(is_playing(id).unwrap());

        remove_session(id).unwrap();
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn test_play_audio_reloads_after_stop() {
        let backend = MockBackend::new();
        let id = mock_player(&backend);

        play_audio(id, "/a.mp3").unwrap();
        stop(id).unwrap();
        assert_eq!(state_code(id).unwrap(), PlayerState::Idle.code());
        play_audio(id, "/a.mp3").unwrap();
        assert!(is_playing(id).unwrap());

        remove_session(id).unwrap();
    }

    #[test]
    fn test_failed_play_audio_reports_unavailable() {
        let backend = MockBackend::new();
        backend.mark_unreachable("https://example.com/gone.mp3");
        let id = mock_player(&backend);

        let err = play_audio(id, "https://example.com/gone.mp3").unwrap_err();
        assert!(matches!(err, AudioError::ResourceUnavailable(_)));
        assert_eq!(state_code(id).unwrap(), PlayerState::Idle.code());

        remove_session(id).unwrap();
    }

    #[test]
    fn test_interruption_is_applied_synchronously() {
        let backend = MockBackend::new();
        let id = mock_player(&backend);

        play_audio(id, "/a.mp3").unwrap();
        interruption_began(id).unwrap();
        assert_eq!(state_code(id).unwrap(), PlayerState::Paused.code());
        assert_eq!(play(id), Err(AudioError::PlaybackInterrupted));
        interruption_ended(id).unwrap();
        play(id).unwrap();

        remove_session(id).unwrap();
    }

    /// Holds up the notification pump on every event
    struct StalledHost;

    impl PlayerCallback for StalledHost {
        fn on_event(&self, _event: CallbackEvent) {
            std::thread::sleep(Duration::from_millis(400));
        }
    }

    #[test]
    fn test_unapplied_interruption_is_an_error() {
        let backend = MockBackend::new();
        let session = AudioPlaybackSession::new(
            SessionConfig::default(),
            backend.backends(Arc::new(FocusArbiter::new())),
        )
        .unwrap();
        session.set_callback(Some(Arc::new(StalledHost)));

        let err = apply_interruption(&session, true, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, AudioError::PlaybackError(_)));

        // Once the pump catches up the interruption has been applied
        assert!(session.flush_notifications());
        assert!(session.is_interrupted());
        assert_eq!(apply_interruption(&session, false, Duration::from_secs(5)), Ok(()));
    }

    #[test]
    fn test_cancel_load_and_buffering_queries() {
        let backend = MockBackend::new();
        let id = mock_player(&backend);

        cancel_load(id).unwrap();
        assert!(!is_buffering(id).unwrap());
        load(id, "https://example.com/a.mp3", PlaybackMode::Remote).unwrap();
        backend.last_notifier().unwrap().buffering(true);
        with_session(id, |s| Ok(s.flush_notifications())).unwrap();
        assert!(is_buffering(id).unwrap());

        remove_session(id).unwrap();
        assert!(matches!(is_buffering(id), Err(AudioError::InvalidState(_))));
        assert!(matches!(cancel_load(id), Err(AudioError::InvalidState(_))));
    }

    #[test]
    fn test_duration_probe_rejects_unsupported_scheme() {
        let err = audio_duration_ms("content://media/1").unwrap_err();
        assert!(matches!(err, AudioError::ResourceUnavailable(_)));
    }

    #[test]
    fn test_waveform_of_missing_file_fails() {
        assert!(waveform("file:///definitely/not/here.wav", 16).is_err());
    }
}
