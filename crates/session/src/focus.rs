// Audio focus: the process-level claim on the audio output
//
// An exclusive claim excludes every other claim. Mixable claims coexist with
// each other but not with an exclusive one.

use audiowave_core::{AudioError, Result, SessionPolicy};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Source of audio focus grants
pub trait AudioFocus: Send + Sync {
    fn acquire(&self, policy: SessionPolicy) -> Result<FocusGrant>;
}

/// A held claim; dropping it releases the claim
pub struct FocusGrant {
    id: u64,
    policy: SessionPolicy,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl FocusGrant {
    pub fn new(id: u64, policy: SessionPolicy, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            policy,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }
}

impl Drop for FocusGrant {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for FocusGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusGrant")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .finish()
    }
}

#[derive(Default)]
struct FocusState {
    exclusive: Option<u64>,
    mixers: HashSet<u64>,
    next_id: u64,
}

/// In-process focus arbiter.
///
/// `FocusArbiter::global()` is shared by every session in the process;
/// separate arbiters are only useful to isolate tests.
#[derive(Clone, Default)]
pub struct FocusArbiter {
    state: Arc<Mutex<FocusState>>,
}

static GLOBAL_ARBITER: Lazy<FocusArbiter> = Lazy::new(FocusArbiter::new);

impl FocusArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> FocusArbiter {
        GLOBAL_ARBITER.clone()
    }

    pub fn is_held(&self) -> bool {
        let state = self.state.lock();
        state.exclusive.is_some() || !state.mixers.is_empty()
    }
}

impl AudioFocus for FocusArbiter {
    fn acquire(&self, policy: SessionPolicy) -> Result<FocusGrant> {
        let mut state = self.state.lock();

        if let Some(holder) = state.exclusive {
            return Err(AudioError::SessionAcquisitionFailed(format!(
                "audio output held exclusively by session {}",
                holder
            )));
        }
        if policy == SessionPolicy::Exclusive && !state.mixers.is_empty() {
            return Err(AudioError::SessionAcquisitionFailed(format!(
                "{} mixing session(s) hold the audio output",
                state.mixers.len()
            )));
        }

        state.next_id += 1;
        let id = state.next_id;
        match policy {
            SessionPolicy::Exclusive => state.exclusive = Some(id),
            SessionPolicy::Mix => {
                state.mixers.insert(id);
            }
        }
        drop(state);

        log::debug!("Audio focus {} granted ({:?})", id, policy);
        let shared = self.state.clone();
        Ok(FocusGrant::new(id, policy, move || {
            let mut state = shared.lock();
            if state.exclusive == Some(id) {
                state.exclusive = None;
            }
            state.mixers.remove(&id);
            log::debug!("Audio focus {} released", id);
        }))
    }
}
