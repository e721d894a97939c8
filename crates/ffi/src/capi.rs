// C ABI entrypoints
//
// Status-returning calls answer 0 on success and `AudioError::code()` on
// failure. Value-returning calls answer the value, or a negative code.

use crate::bridge;
use crate::logging::init_logging;
use audiowave_core::{AudioError, CallbackEvent, PlaybackMode, PlayerCallback, Result};
use std::ffi::{c_char, c_void, CStr};
use std::path::PathBuf;
use std::sync::Arc;

/// Returned by `audiowave_get_duration` while the duration is unknown
pub const AUDIOWAVE_DURATION_UNKNOWN: i64 = -10;

pub const AUDIOWAVE_EVENT_STATE_CHANGED: i32 = 1;
pub const AUDIOWAVE_EVENT_RESOURCE_CHANGED: i32 = 2;
pub const AUDIOWAVE_EVENT_POSITION: i32 = 3;
pub const AUDIOWAVE_EVENT_COMPLETED: i32 = 4;
pub const AUDIOWAVE_EVENT_ERROR: i32 = 5;
pub const AUDIOWAVE_EVENT_BUFFERING: i32 = 6;
pub const AUDIOWAVE_EVENT_VOLUME: i32 = 7;
pub const AUDIOWAVE_EVENT_INTERRUPTED: i32 = 8;
pub const AUDIOWAVE_EVENT_INTERRUPTION_ENDED: i32 = 9;

/// Host event handler: `(player_id, event, value, user_data)`
pub type AudiowaveEventFn = extern "C" fn(i64, i32, i64, *mut c_void);

fn to_code(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            log::error!("FFI error: {}", err);
            err.code()
        }
    }
}

fn to_value(result: Result<i64>) -> i64 {
    match result {
        Ok(value) => value,
        Err(err) => {
            log::error!("FFI error: {}", err);
            err.code() as i64
        }
    }
}

fn read_str<'a>(ptr: *const c_char) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(AudioError::InvalidState("Null string argument".into()));
    }
    // Caller guarantees a NUL-terminated string alive for the duration of the call
    let c_str = unsafe { CStr::from_ptr(ptr) };
    c_str
        .to_str()
        .map_err(|e| AudioError::InvalidState(format!("Invalid UTF-8 argument: {}", e)))
}

/// Event code and scalar payload handed to C callbacks
pub fn encode_event(event: &CallbackEvent) -> (i32, i64) {
    match event {
        CallbackEvent::StateChanged { new_state, .. } => (AUDIOWAVE_EVENT_STATE_CHANGED, new_state.code() as i64),
        CallbackEvent::ResourceChanged { mode, .. } => (
            AUDIOWAVE_EVENT_RESOURCE_CHANGED,
            match mode {
                PlaybackMode::Local => 0,
                PlaybackMode::Remote => 1,
            },
        ),
        CallbackEvent::PositionChanged { position_ms, .. } => (AUDIOWAVE_EVENT_POSITION, *position_ms as i64),
        CallbackEvent::PlaybackCompleted => (AUDIOWAVE_EVENT_COMPLETED, 0),
        CallbackEvent::Error { .. } => (AUDIOWAVE_EVENT_ERROR, 0),
        CallbackEvent::BufferingChanged { buffering } => (AUDIOWAVE_EVENT_BUFFERING, *buffering as i64),
        // Volume in thousandths
        CallbackEvent::VolumeChanged { volume } => (AUDIOWAVE_EVENT_VOLUME, (volume * 1000.0).round() as i64),
        CallbackEvent::Interrupted => (AUDIOWAVE_EVENT_INTERRUPTED, 0),
        CallbackEvent::InterruptionEnded => (AUDIOWAVE_EVENT_INTERRUPTION_ENDED, 0),
    }
}

struct CEventCallback {
    player_id: i64,
    func: AudiowaveEventFn,
    // Opaque to us; stored as an integer so the callback stays Send + Sync
    user_data: usize,
}

impl PlayerCallback for CEventCallback {
    fn on_event(&self, event: CallbackEvent) {
        if let CallbackEvent::Error { message } = &event {
            log::warn!("Player {} error: {}", self.player_id, message);
        }
        let (code, value) = encode_event(&event);
        (self.func)(self.player_id, code, value, self.user_data as *mut c_void);
    }
}

#[no_mangle]
pub extern "C" fn audiowave_init_logging() {
    init_logging();
}

/// Create a player; returns its id, or a negative code
#[no_mangle]
pub extern "C" fn audiowave_create() -> i64 {
    to_value(bridge::create_player())
}

/// Directory `asset://` and relative identifiers resolve under; null clears it
#[no_mangle]
pub extern "C" fn audiowave_set_asset_root(path: *const c_char) -> i32 {
    if path.is_null() {
        bridge::set_asset_root(None);
        return 0;
    }
    to_code(read_str(path).map(|p| bridge::set_asset_root(Some(PathBuf::from(p)))))
}

/// `mode`: 0 local, 1 remote
#[no_mangle]
pub extern "C" fn audiowave_load(player_id: i64, uri: *const c_char, mode: i32) -> i32 {
    to_code(read_str(uri).and_then(|uri| {
        let mode = PlaybackMode::from_code(mode)?;
        bridge::load(player_id, uri, mode)
    }))
}

#[no_mangle]
pub extern "C" fn audiowave_play_audio(player_id: i64, uri: *const c_char) -> i32 {
    to_code(read_str(uri).and_then(|uri| bridge::play_audio(player_id, uri)))
}

#[no_mangle]
pub extern "C" fn audiowave_play(player_id: i64) -> i32 {
    to_code(bridge::play(player_id))
}

#[no_mangle]
pub extern "C" fn audiowave_pause(player_id: i64) -> i32 {
    to_code(bridge::pause(player_id))
}

#[no_mangle]
pub extern "C" fn audiowave_stop(player_id: i64) -> i32 {
    to_code(bridge::stop(player_id))
}

#[no_mangle]
pub extern "C" fn audiowave_cancel_load(player_id: i64) -> i32 {
    to_code(bridge::cancel_load(player_id))
}

/// Negative positions seek to the start
#[no_mangle]
pub extern "C" fn audiowave_seek(player_id: i64, position_ms: i64) -> i32 {
    to_code(bridge::seek(player_id, position_ms.max(0) as u64))
}

#[no_mangle]
pub extern "C" fn audiowave_set_volume(player_id: i64, volume: f32) -> i32 {
    to_code(bridge::set_volume(player_id, volume))
}

#[no_mangle]
pub extern "C" fn audiowave_get_position(player_id: i64) -> i64 {
    to_value(bridge::position_ms(player_id).map(|ms| ms as i64))
}

#[no_mangle]
pub extern "C" fn audiowave_get_duration(player_id: i64) -> i64 {
    to_value(
        bridge::duration_ms(player_id).map(|d| d.map(|ms| ms as i64).unwrap_or(AUDIOWAVE_DURATION_UNKNOWN)),
    )
}

/// 1 playing, 0 not playing
#[no_mangle]
pub extern "C" fn audiowave_is_playing(player_id: i64) -> i32 {
    to_value(bridge::is_playing(player_id).map(i64::from)) as i32
}

#[no_mangle]
pub extern "C" fn audiowave_is_buffering(player_id: i64) -> i32 {
    to_value(bridge::is_buffering(player_id).map(i64::from)) as i32
}

/// 0 idle, 1 loading, 2 loaded, 3 playing, 4 paused
#[no_mangle]
pub extern "C" fn audiowave_get_state(player_id: i64) -> i32 {
    to_value(bridge::state_code(player_id).map(i64::from)) as i32
}

/// Install `callback` for player events; null removes it.
///
/// The callback runs on a session thread and must not call back into the
/// same player synchronously for long.
#[no_mangle]
pub extern "C" fn audiowave_set_event_callback(
    player_id: i64,
    callback: Option<AudiowaveEventFn>,
    user_data: *mut c_void,
) -> i32 {
    let callback = callback.map(|func| {
        Arc::new(CEventCallback {
            player_id,
            func,
            user_data: user_data as usize,
        }) as Arc<dyn PlayerCallback>
    });
    to_code(bridge::set_callback(player_id, callback))
}

#[no_mangle]
pub extern "C" fn audiowave_interruption_began(player_id: i64) -> i32 {
    to_code(bridge::interruption_began(player_id))
}

#[no_mangle]
pub extern "C" fn audiowave_interruption_ended(player_id: i64) -> i32 {
    to_code(bridge::interruption_ended(player_id))
}

/// Duration of `uri` in milliseconds without loading it, or a negative code
#[no_mangle]
pub extern "C" fn audiowave_get_audio_duration(uri: *const c_char) -> i64 {
    to_value(read_str(uri).and_then(|uri| bridge::audio_duration_ms(uri).map(|ms| ms as i64)))
}

/// Write up to `out_len` waveform points for `uri` into `out`.
///
/// Returns the number of points written, or a negative code.
#[no_mangle]
pub extern "C" fn audiowave_generate_waveform(uri: *const c_char, samples: i32, out: *mut f32, out_len: usize) -> i32 {
    let result = read_str(uri).and_then(|uri| {
        if out.is_null() || samples < 0 {
            return Err(AudioError::InvalidState("Invalid waveform buffer".into()));
        }
        let points = bridge::waveform(uri, samples as usize)?;
        let count = points.len().min(out_len);
        // Caller provides `out_len` writable floats at `out`
        let dest = unsafe { std::slice::from_raw_parts_mut(out, count) };
        dest.copy_from_slice(&points[..count]);
        Ok(count as i64)
    });
    to_value(result) as i32
}

#[no_mangle]
pub extern "C" fn audiowave_release(player_id: i64) -> i32 {
    to_code(crate::registry::remove_session(player_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiowave_core::{PlayerState, SessionConfig};
    use audiowave_session::mock::MockBackend;
    use audiowave_session::FocusArbiter;
    use parking_lot::Mutex;
    use std::ffi::CString;

    fn mock_player(backend: &MockBackend) -> i64 {
        bridge::create_player_with(SessionConfig::default(), backend.backends(Arc::new(FocusArbiter::new()))).unwrap()
    }

    static SEEN: Mutex<Vec<(i64, i32, i64)>> = parking_lot::const_mutex(Vec::new());

    extern "C" fn record(player_id: i64, event: i32, value: i64, _user_data: *mut c_void) {
        SEEN.lock().push((player_id, event, value));
    }

    #[test]
    fn test_status_codes() {
        let backend = MockBackend::new();
        let id = mock_player(&backend);

        assert_eq!(audiowave_play(id), AudioError::NoResourceLoaded.code());
        assert_eq!(audiowave_get_duration(id), AUDIOWAVE_DURATION_UNKNOWN);
        assert_eq!(audiowave_get_position(id), 0);

        let uri = CString::new("file:///a.mp3").unwrap();
        assert_eq!(audiowave_load(id, uri.as_ptr(), 0), 0);
        assert_eq!(audiowave_get_duration(id), 60_000);
        assert_eq!(audiowave_get_state(id), PlayerState::Loaded.code());
        assert_eq!(audiowave_play(id), 0);
        assert_eq!(audiowave_is_playing(id), 1);
        assert_eq!(audiowave_seek(id, -5), 0);
        assert_eq!(audiowave_get_position(id), 0);
        assert_eq!(audiowave_stop(id), 0);
        assert_eq!(audiowave_is_playing(id), 0);

        assert_eq!(audiowave_release(id), 0);
        assert_eq!(audiowave_play(id), -1);
        assert_eq!(audiowave_get_state(id), -1);
        assert_eq!(audiowave_release(id), -1);
    }

    #[test]
    fn test_bad_arguments() {
        let backend = MockBackend::new();
        let id = mock_player(&backend);

        assert_eq!(audiowave_load(id, std::ptr::null(), 0), -1);
        let uri = CString::new("/a.mp3").unwrap();
        assert_eq!(audiowave_load(id, uri.as_ptr(), 7), -1);
        assert_eq!(audiowave_set_volume(id, f32::NAN), -1);
        let remote = CString::new("https://example.com/a.mp3").unwrap();
        assert_eq!(audiowave_load(id, remote.as_ptr(), 0), AudioError::ResourceUnavailable(String::new()).code());
        assert_eq!(
            audiowave_generate_waveform(uri.as_ptr(), 8, std::ptr::null_mut(), 8),
            -1
        );

        audiowave_release(id);
    }

    #[test]
    fn test_play_audio_and_events() {
        let backend = MockBackend::new();
        let id = mock_player(&backend);
        assert_eq!(audiowave_set_event_callback(id, Some(record), std::ptr::null_mut()), 0);

        let uri = CString::new("/a.mp3").unwrap();
        assert_eq!(audiowave_play_audio(id, uri.as_ptr()), 0);
        assert_eq!(audiowave_interruption_began(id), 0);
        assert_eq!(audiowave_play(id), AudioError::PlaybackInterrupted.code());
        assert_eq!(audiowave_interruption_ended(id), 0);
        assert_eq!(audiowave_play_audio(id, uri.as_ptr()), 0);

        let seen: Vec<(i32, i64)> = SEEN
            .lock()
            .iter()
            .filter(|(player, _, _)| *player == id)
            .map(|(_, event, value)| (*event, *value))
            .collect();
        assert!(seen.contains(&(AUDIOWAVE_EVENT_RESOURCE_CHANGED, 0)));
        assert!(seen.contains(&(AUDIOWAVE_EVENT_STATE_CHANGED, PlayerState::Playing.code() as i64)));
        assert!(seen.contains(&(AUDIOWAVE_EVENT_INTERRUPTED, 0)));
        assert!(seen.contains(&(AUDIOWAVE_EVENT_INTERRUPTION_ENDED, 0)));

        assert_eq!(audiowave_set_event_callback(id, None, std::ptr::null_mut()), 0);
        audiowave_release(id);
    }

    #[test]
    fn test_event_encoding() {
        assert_eq!(
            encode_event(&CallbackEvent::VolumeChanged { volume: 0.25 }),
            (AUDIOWAVE_EVENT_VOLUME, 250)
        );
        assert_eq!(
            encode_event(&CallbackEvent::BufferingChanged { buffering: true }),
            (AUDIOWAVE_EVENT_BUFFERING, 1)
        );
        assert_eq!(
            encode_event(&CallbackEvent::PositionChanged {
                position_ms: 1234,
                duration_ms: None
            }),
            (AUDIOWAVE_EVENT_POSITION, 1234)
        );
    }
}
