// Session backends running on the playback engine

use crate::engine::{EngineConfig, PlaybackEngine};
use audiowave_core::{CancelToken, ResolvedResource, Result};
use audiowave_session::{Backends, HandleNotifier, LocalPlayback, PlaybackHandle, RemotePlayback};
use std::path::Path;
use std::sync::Arc;

/// Plays files from device storage
#[derive(Clone, Default)]
pub struct EngineLocalPlayback {
    config: EngineConfig,
}

impl EngineLocalPlayback {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl LocalPlayback for EngineLocalPlayback {
    fn open(&self, path: &Path, notifier: HandleNotifier) -> Result<Box<dyn PlaybackHandle>> {
        let engine = PlaybackEngine::start(
            ResolvedResource::File(path.to_path_buf()),
            notifier,
            CancelToken::new(),
            &self.config,
        )?;
        Ok(Box::new(engine))
    }
}

/// Streams HTTP(S) resources through range requests
#[derive(Clone, Default)]
pub struct EngineRemotePlayback {
    config: EngineConfig,
}

impl EngineRemotePlayback {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl RemotePlayback for EngineRemotePlayback {
    fn open(&self, url: &str, notifier: HandleNotifier, cancel: &CancelToken) -> Result<Box<dyn PlaybackHandle>> {
        cancel.check()?;
        let engine = PlaybackEngine::start(
            ResolvedResource::Url(url.to_string()),
            notifier,
            cancel.clone(),
            &self.config,
        )?;
        // Superseded while the engine was opening
        cancel.check()?;
        Ok(Box::new(engine))
    }
}

/// Session backends for both modes sharing one engine configuration
pub fn engine_backends(config: EngineConfig) -> Backends {
    Backends::new(
        Arc::new(EngineLocalPlayback::new(config.clone())),
        Arc::new(EngineRemotePlayback::new(config)),
    )
}
