// Audio playback engine backing the session's local and remote handles

pub mod backend;
pub mod convert;
pub mod cpal_renderer;
pub mod engine;
pub mod renderer;
pub mod ring;

pub use backend::{engine_backends, EngineLocalPlayback, EngineRemotePlayback};
pub use cpal_renderer::{CpalRenderer, CpalRendererFactory};
pub use engine::{EngineConfig, PlaybackEngine};
pub use renderer::{AudioRenderer, NullRendererFactory, OutputSpec, RenderFeed, RendererFactory};
pub use ring::SharedRingBuffer;
