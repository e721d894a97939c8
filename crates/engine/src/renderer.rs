// Audio output abstraction
//
// A renderer pulls PCM from a `RenderFeed` on its own schedule. Renderers are
// created on the engine's decode thread and never leave it, so they need not
// be `Send` (cpal streams are not on every platform).

use crate::ring::SharedRingBuffer;
use audiowave_core::Result;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Output stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// State shared between the decode thread and the output callback
#[derive(Clone)]
pub struct RenderFeed {
    ring: SharedRingBuffer,
    playing: Arc<AtomicBool>,
    volume_bits: Arc<AtomicU32>,
    frames_played: Arc<AtomicU64>,
    underflows: Arc<AtomicU64>,
}

impl RenderFeed {
    pub fn new(ring: SharedRingBuffer) -> Self {
        Self {
            ring,
            playing: Arc::new(AtomicBool::new(false)),
            volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            frames_played: Arc::new(AtomicU64::new(0)),
            underflows: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn ring(&self) -> &SharedRingBuffer {
        &self.ring
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    /// Frames consumed by the output since the last reset
    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::SeqCst)
    }

    pub fn reset_frames_played(&self) {
        self.frames_played.store(0, Ordering::SeqCst);
    }

    /// Fill an interleaved output buffer; called from the output callback
    pub fn fill(&self, data: &mut [f32], channels: u16) {
        if !self.is_playing() {
            data.fill(0.0);
            return;
        }

        let read = self.ring.read(data);

        // Skip the multiply at unity gain
        let vol = self.volume();
        if (vol - 1.0).abs() > 0.001 {
            for sample in data[..read].iter_mut() {
                *sample *= vol;
            }
        }

        if read < data.len() {
            data[read..].fill(0.0);
            let count = self.underflows.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 50 == 0 {
                log::warn!("Audio underflow count={}", count);
            }
        }

        self.frames_played
            .fetch_add((read / channels.max(1) as usize) as u64, Ordering::SeqCst);
    }
}

/// A running output stream
pub trait AudioRenderer {
    /// Format the renderer consumes from the feed
    fn spec(&self) -> OutputSpec;
}

/// Creates renderers on the decode thread
pub trait RendererFactory: Send + Sync {
    /// `preferred` is the source format; the renderer may pick another
    fn create(&self, preferred: OutputSpec, feed: RenderFeed) -> Result<Box<dyn AudioRenderer>>;
}

/// Renderer that consumes the feed in real time without producing sound
pub struct NullRenderer {
    spec: OutputSpec,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Pull interval of the null renderer
const NULL_TICK: Duration = Duration::from_millis(10);

impl NullRenderer {
    pub fn start(spec: OutputSpec, feed: RenderFeed) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let samples_per_tick =
            (spec.sample_rate as u64 * NULL_TICK.as_millis() as u64 / 1000) as usize * spec.channels as usize;

        let thread = thread::Builder::new()
            .name("audiowave-null-output".to_string())
            .spawn(move || {
                let mut scratch = vec![0.0f32; samples_per_tick.max(1)];
                while !stop_flag.load(Ordering::Relaxed) {
                    feed.fill(&mut scratch, spec.channels);
                    thread::sleep(NULL_TICK);
                }
            })
            .map_err(|e| log::error!("Failed to start null output: {}", e))
            .ok();

        Self { spec, stop, thread }
    }
}

impl AudioRenderer for NullRenderer {
    fn spec(&self) -> OutputSpec {
        self.spec
    }
}

impl Drop for NullRenderer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Factory for `NullRenderer`, for headless hosts and tests
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRendererFactory;

impl RendererFactory for NullRendererFactory {
    fn create(&self, preferred: OutputSpec, feed: RenderFeed) -> Result<Box<dyn AudioRenderer>> {
        Ok(Box::new(NullRenderer::start(preferred, feed)))
    }
}
