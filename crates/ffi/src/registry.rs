// Player registry shared by the C ABI and JNI entrypoints

use crate::logging::init_logging;
use audiowave_core::{AudioError, Result};
use audiowave_session::AudioPlaybackSession;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

static PLAYER_REGISTRY: Lazy<Mutex<HashMap<i64, Arc<AudioPlaybackSession>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_PLAYER_ID: AtomicI64 = AtomicI64::new(1);

pub fn register_session(session: AudioPlaybackSession) -> i64 {
    init_logging();
    let id = NEXT_PLAYER_ID.fetch_add(1, Ordering::SeqCst);
    PLAYER_REGISTRY.lock().insert(id, Arc::new(session));
    log::info!("Registered player {}", id);
    id
}

/// Run `f` against a registered session.
///
/// The registry lock is dropped before `f` runs, so a slow remote load on one
/// player never blocks calls on another.
pub fn with_session<R>(id: i64, f: impl FnOnce(&AudioPlaybackSession) -> Result<R>) -> Result<R> {
    let session = PLAYER_REGISTRY
        .lock()
        .get(&id)
        .cloned()
        .ok_or_else(|| AudioError::InvalidState(format!("Invalid player ID {}", id)))?;
    f(&session)
}

/// Unregister a player, stopping its session.
///
/// Calls already in flight keep their reference; the session is torn down
/// once the last one returns.
pub fn remove_session(id: i64) -> Result<()> {
    let session = PLAYER_REGISTRY
        .lock()
        .remove(&id)
        .ok_or_else(|| AudioError::InvalidState(format!("Invalid player ID {}", id)))?;
    session.stop();
    log::info!("Released player {}", id);
    Ok(())
}
