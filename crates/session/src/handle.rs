// The session's single slot for a loaded resource
//
// Local and remote handles live in one tagged variant, so holding both at
// once cannot be expressed.

use crate::backend::PlaybackHandle;
use audiowave_core::PlaybackMode;
use std::path::PathBuf;

/// Owns a backend handle and releases it when dropped
pub(crate) struct PlayerGuard(Box<dyn PlaybackHandle>);

impl PlayerGuard {
    pub(crate) fn new(player: Box<dyn PlaybackHandle>) -> Self {
        Self(player)
    }

    pub(crate) fn get(&self) -> &dyn PlaybackHandle {
        self.0.as_ref()
    }

    pub(crate) fn get_mut(&mut self) -> &mut dyn PlaybackHandle {
        self.0.as_mut()
    }
}

impl Drop for PlayerGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

pub(crate) struct LocalHandle {
    pub path: PathBuf,
    pub player: PlayerGuard,
}

pub(crate) struct RemoteHandle {
    pub url: String,
    pub player: PlayerGuard,
    pub buffering: bool,
}

pub(crate) enum Handle {
    None,
    Local(LocalHandle),
    Remote(RemoteHandle),
}

impl Handle {
    pub fn is_none(&self) -> bool {
        matches!(self, Handle::None)
    }

    pub fn mode(&self) -> Option<PlaybackMode> {
        match self {
            Handle::None => None,
            Handle::Local(_) => Some(PlaybackMode::Local),
            Handle::Remote(_) => Some(PlaybackMode::Remote),
        }
    }

    pub fn player(&self) -> Option<&dyn PlaybackHandle> {
        match self {
            Handle::None => None,
            Handle::Local(h) => Some(h.player.get()),
            Handle::Remote(h) => Some(h.player.get()),
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut dyn PlaybackHandle> {
        match self {
            Handle::None => None,
            Handle::Local(h) => Some(h.player.get_mut()),
            Handle::Remote(h) => Some(h.player.get_mut()),
        }
    }

    pub fn is_buffering(&self) -> bool {
        matches!(self, Handle::Remote(h) if h.buffering)
    }

    /// Move the handle out, leaving `Handle::None` behind
    #[must_use]
    pub fn take(&mut self) -> Handle {
        std::mem::replace(self, Handle::None)
    }

    /// Drop the current handle, releasing its backend resources
    pub fn release(&mut self) {
        match std::mem::replace(self, Handle::None) {
            Handle::None => {}
            Handle::Local(h) => log::debug!("Releasing local handle {}", h.path.display()),
            Handle::Remote(h) => log::debug!("Releasing remote handle {}", h.url),
        }
    }
}
