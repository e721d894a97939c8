// Playback engine: decode thread -> PCM ring buffer -> renderer
//
// One engine per loaded resource. The decode thread owns the demuxer, the
// decoder and the renderer; the handle side only flips atomics. Asynchronous
// outcomes (end of stream, buffering, failures) are posted through the
// handle's notifier and never touch session state directly.

use crate::convert::FrameConverter;
use crate::renderer::{AudioRenderer, OutputSpec, RenderFeed, RendererFactory};
use crate::ring::SharedRingBuffer;
use audiowave_core::{AudioError, CancelToken, ResolvedResource, Result};
use audiowave_decode::{open_media_source, AudioDecoder, Demuxer, TrackInfo};
use audiowave_session::{HandleNotifier, PlaybackHandle};
use audiowave_transport_http::HttpClient;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use symphonia::core::formats::Packet;

/// Seconds of output audio the ring buffer holds
const RING_BUFFER_SECS: usize = 5;

/// Decoded audio needed before a buffering stream counts as playable again
const PRE_BUFFER_MS: u64 = 100;

/// Spacing of position notifications from the decode thread
const POSITION_UPDATE_INTERVAL_MS: u64 = 100;

/// Stop decoding ahead once the ring is this full
const RING_HIGH_WATER: f32 = 0.9;

const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// How often a remote engine checks whether playback has run dry
const BUFFERING_POLL: Duration = Duration::from_millis(20);

const NO_SEEK: u64 = u64::MAX;
const UNKNOWN_DURATION: u64 = u64::MAX;

/// Flags shared between the handle and the decode thread
struct EngineControl {
    stop: AtomicBool,
    seek_request: AtomicU64,
    /// Position the frame counter is relative to
    base_ms: AtomicU64,
    duration_ms: AtomicU64,
    out_rate: AtomicU32,
    /// Every packet has been decoded; set until the next seek
    at_end: AtomicBool,
}

impl EngineControl {
    fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            seek_request: AtomicU64::new(NO_SEEK),
            base_ms: AtomicU64::new(0),
            duration_ms: AtomicU64::new(UNKNOWN_DURATION),
            out_rate: AtomicU32::new(48000),
            at_end: AtomicBool::new(false),
        }
    }

    fn duration_ms(&self) -> Option<u64> {
        match self.duration_ms.load(Ordering::SeqCst) {
            UNKNOWN_DURATION => None,
            d => Some(d),
        }
    }

    fn position_ms(&self, feed: &RenderFeed) -> u64 {
        let rate = self.out_rate.load(Ordering::SeqCst).max(1) as u64;
        let played_ms = feed.frames_played() * 1000 / rate;
        let position = self.base_ms.load(Ordering::SeqCst) + played_ms;
        match self.duration_ms() {
            Some(d) => position.min(d),
            None => position,
        }
    }

    fn seek_pending(&self) -> bool {
        self.seek_request.load(Ordering::SeqCst) != NO_SEEK
    }
}

/// Collaborators an engine is started with
#[derive(Clone)]
pub struct EngineConfig {
    pub renderer: Arc<dyn RendererFactory>,
    pub http: HttpClient,
}

impl EngineConfig {
    pub fn new(renderer: Arc<dyn RendererFactory>, http: HttpClient) -> Self {
        Self { renderer, http }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            renderer: Arc::new(crate::cpal_renderer::CpalRendererFactory),
            http: HttpClient::default(),
        }
    }
}

/// A running playback engine; the session's handle for one resource
pub struct PlaybackEngine {
    label: String,
    feed: RenderFeed,
    control: Arc<EngineControl>,
    cancel: CancelToken,
    thread: Option<thread::JoinHandle<()>>,
    info: TrackInfo,
}

impl PlaybackEngine {
    /// Open `resource` and start decoding, paused.
    ///
    /// Blocks until the track is probed and the output is running, or until
    /// opening fails. Tripping `cancel` aborts a remote open.
    pub fn start(
        resource: ResolvedResource,
        notifier: HandleNotifier,
        cancel: CancelToken,
        config: &EngineConfig,
    ) -> Result<Self> {
        let label = match &resource {
            ResolvedResource::File(path) => path.display().to_string(),
            ResolvedResource::Url(url) => url.clone(),
        };
        log::info!("Starting playback engine for {}", label);

        let feed = RenderFeed::new(SharedRingBuffer::new(48000 * 2 * RING_BUFFER_SECS));
        let control = Arc::new(EngineControl::new());
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<TrackInfo>>(1);

        let worker_feed = feed.clone();
        let worker_control = control.clone();
        let worker_cancel = cancel.clone();
        let renderer = config.renderer.clone();
        let http = config.http.clone();

        let thread = thread::Builder::new()
            .name("audiowave-decode".to_string())
            .spawn(move || {
                let opened = DecodeWorker::open(
                    &resource,
                    &http,
                    worker_cancel,
                    renderer.as_ref(),
                    worker_feed,
                    worker_control,
                    notifier,
                );
                match opened {
                    Ok(worker) => {
                        if ready_tx.send(Ok(worker.info.clone())).is_ok() {
                            worker.run();
                        }
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| AudioError::PlaybackError(format!("Failed to spawn decode thread: {}", e)))?;

        let info = match ready_rx.recv() {
            Ok(Ok(info)) => info,
            failed => {
                // The thread has exited or is about to; make sure it is gone
                control.stop.store(true, Ordering::SeqCst);
                cancel.cancel();
                let _ = thread.join();
                return Err(match failed {
                    Ok(Err(e)) => e,
                    _ => AudioError::PlaybackError("Decode thread exited while opening".to_string()),
                });
            }
        };

        log::info!(
            "Engine ready: {}Hz, {} channels, duration {:?}ms",
            info.sample_rate,
            info.channels,
            info.duration_ms
        );
        Ok(Self {
            label,
            feed,
            control,
            cancel,
            thread: Some(thread),
            info,
        })
    }

    pub fn track_info(&self) -> &TrackInfo {
        &self.info
    }

    fn shutdown(&mut self) {
        self.feed.set_playing(false);
        self.control.stop.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            log::debug!("Waiting for decode thread of {}", self.label);
            let _ = thread.join();
        }
    }
}

impl PlaybackHandle for PlaybackEngine {
    fn play(&mut self) -> Result<()> {
        if self.thread.is_none() {
            return Err(AudioError::PlaybackError("Engine already released".to_string()));
        }
        self.feed.set_playing(true);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.feed.set_playing(false);
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        // Report the target right away; the decode thread catches up
        self.control.base_ms.store(position_ms, Ordering::SeqCst);
        self.feed.reset_frames_played();
        self.control.seek_request.store(position_ms, Ordering::SeqCst);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.feed.set_volume(volume);
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.control.position_ms(&self.feed)
    }

    fn duration_ms(&self) -> Option<u64> {
        self.control.duration_ms()
    }

    fn release(&mut self) {
        log::info!("Releasing playback engine for {}", self.label);
        self.shutdown();
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct DecodeWorker {
    demuxer: Demuxer,
    decoder: AudioDecoder,
    converter: FrameConverter,
    /// Keeps the output stream alive for the lifetime of the thread
    _renderer: Box<dyn AudioRenderer>,
    out_spec: OutputSpec,
    feed: RenderFeed,
    control: Arc<EngineControl>,
    notifier: HandleNotifier,
    cancel: CancelToken,
    remote: bool,
    info: TrackInfo,
}

impl DecodeWorker {
    fn open(
        resource: &ResolvedResource,
        http: &HttpClient,
        cancel: CancelToken,
        renderer: &dyn RendererFactory,
        feed: RenderFeed,
        control: Arc<EngineControl>,
        notifier: HandleNotifier,
    ) -> Result<Self> {
        let (source, hint) = open_media_source(resource, http, &cancel)?;
        let demuxer = Demuxer::from_media_source(source, hint)?;
        let info = demuxer.get_track_info()?;
        let decoder = AudioDecoder::from_demuxer(&demuxer)?;
        cancel.check()?;

        let preferred = OutputSpec {
            sample_rate: info.sample_rate.max(1),
            channels: info.channels.max(1),
        };
        // The output could not be claimed for this session
        let renderer = renderer.create(preferred, feed.clone()).map_err(|e| {
            AudioError::SessionAcquisitionFailed(format!("Cannot open audio output: {}", e))
        })?;
        let out_spec = renderer.spec();

        feed.ring()
            .resize(out_spec.sample_rate as usize * out_spec.channels as usize * RING_BUFFER_SECS);
        control.out_rate.store(out_spec.sample_rate, Ordering::SeqCst);
        if let Some(d) = info.duration_ms {
            control.duration_ms.store(d, Ordering::SeqCst);
        }

        let converter = FrameConverter::new(info.sample_rate, out_spec.sample_rate, info.channels, out_spec.channels);
        if !converter.is_passthrough() {
            log::info!(
                "Converting {}Hz/{}ch -> {}Hz/{}ch",
                info.sample_rate,
                info.channels,
                out_spec.sample_rate,
                out_spec.channels
            );
        }

        Ok(Self {
            demuxer,
            decoder,
            converter,
            _renderer: renderer,
            out_spec,
            feed,
            control,
            notifier,
            cancel,
            remote: matches!(resource, ResolvedResource::Url(_)),
            info,
        })
    }

    fn stopping(&self) -> bool {
        self.control.stop.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    fn run(mut self) {
        log::info!("Decoder thread started");

        let refill_samples =
            (PRE_BUFFER_MS * self.out_spec.sample_rate as u64 / 1000) as usize * self.out_spec.channels as usize;
        let mut last_position_update = Instant::now();
        let mut at_end = false;
        let mut completion_reported = false;
        // Network reads block this thread, so underruns are watched from another one
        let monitor = self.remote.then(|| {
            BufferingMonitor::spawn(
                self.feed.clone(),
                self.control.clone(),
                self.notifier.clone(),
                refill_samples,
            )
        });

        loop {
            if self.stopping() {
                log::info!("Decoder thread stopping");
                break;
            }

            let target = self.control.seek_request.swap(NO_SEEK, Ordering::SeqCst);
            if target != NO_SEEK {
                self.seek(target);
                at_end = false;
                self.control.at_end.store(false, Ordering::SeqCst);
                completion_reported = false;
            }

            let playing = self.feed.is_playing();
            if playing && last_position_update.elapsed() >= Duration::from_millis(POSITION_UPDATE_INTERVAL_MS) {
                self.notifier
                    .position(self.control.position_ms(&self.feed), self.control.duration_ms());
                last_position_update = Instant::now();
            }

            if at_end {
                // Completion is reported once the output has drained the ring
                if playing && !completion_reported && self.feed.ring().available_read() == 0 {
                    log::info!("Playback completed");
                    self.feed.set_playing(false);
                    self.notifier.finished();
                    completion_reported = true;
                }
                thread::sleep(IDLE_SLEEP);
                continue;
            }

            if self.feed.ring().fullness() > RING_HIGH_WATER {
                thread::sleep(IDLE_SLEEP);
                continue;
            }

            let step = match self.demuxer.next_packet() {
                Ok(Some(packet)) => self.write_packet(&packet),
                Ok(None) => {
                    log::debug!("End of stream reached");
                    at_end = true;
                    self.control.at_end.store(true, Ordering::SeqCst);
                    Ok(())
                }
                Err(e) => Err(e),
            };

            if let Err(e) = step {
                if self.stopping() {
                    break;
                }
                log::error!("Decoding error: {}", e);
                self.feed.set_playing(false);
                self.notifier.failed(e.to_string());
                break;
            }
        }

        if let Some(monitor) = monitor {
            monitor.finish();
        }
        log::info!("Decoder thread exited");
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let pcm = self.decoder.decode(packet)?;
        self.converter.set_input_channels(pcm.channels);
        let samples = self.converter.process(pcm.samples);

        let ring = self.feed.ring();
        let mut written = 0;
        while written < samples.len() {
            // A seek or stop makes the rest of this packet stale
            if self.control.stop.load(Ordering::SeqCst) || self.control.seek_pending() {
                return Ok(());
            }
            let w = ring.write(&samples[written..]);
            if w == 0 {
                // Ring full: back off longer the fuller it is
                let sleep_ms = if ring.fullness() > 0.9 { 15 } else { 5 };
                thread::sleep(Duration::from_millis(sleep_ms));
            } else {
                written += w;
            }
        }
        Ok(())
    }

    fn seek(&mut self, target_ms: u64) {
        match self.demuxer.seek(target_ms) {
            Ok(actual_ms) => {
                log::info!("Decoder seek to {}ms (landed at {}ms)", target_ms, actual_ms);
                self.control.base_ms.store(actual_ms, Ordering::SeqCst);
            }
            Err(e) => log::warn!("Seek to {}ms failed: {}", target_ms, e),
        }
        self.decoder.reset();
        self.converter.reset();
        self.feed.ring().clear();
        self.feed.reset_frames_played();
    }
}

/// Reports buffering transitions of a remote stream.
///
/// The stream is buffering while it plays with an empty ring before the end of
/// the track, and recovers once `refill_samples` are queued again.
struct BufferingMonitor {
    done: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl BufferingMonitor {
    fn spawn(feed: RenderFeed, control: Arc<EngineControl>, notifier: HandleNotifier, refill_samples: usize) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let done_flag = done.clone();
        let thread = thread::Builder::new()
            .name("audiowave-buffering".to_string())
            .spawn(move || {
                let mut buffering = false;
                while !done_flag.load(Ordering::SeqCst) {
                    let level = feed.ring().available_read();
                    let at_end = control.at_end.load(Ordering::SeqCst);
                    if !buffering && feed.is_playing() && !at_end && level == 0 {
                        log::debug!("Stream buffering");
                        buffering = true;
                        notifier.buffering(true);
                    } else if buffering && (at_end || level >= refill_samples) {
                        log::debug!("Stream buffered");
                        buffering = false;
                        notifier.buffering(false);
                    }
                    thread::sleep(BUFFERING_POLL);
                }
            })
            .map_err(|e| log::warn!("Failed to start buffering monitor: {}", e))
            .ok();
        Self { done, thread }
    }

    fn finish(mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::NullRendererFactory;
    use audiowave_session::Notification;

    /// 16-bit PCM mono WAV
    fn wav_mono_i16(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    fn temp_wav(name: &str, millis: u32) -> std::path::PathBuf {
        let rate = 8000;
        let pcm = vec![1000i16; (rate * millis / 1000) as usize];
        let path = std::env::temp_dir().join(format!("audiowave_engine_{}_{}", std::process::id(), name));
        std::fs::write(&path, wav_mono_i16(rate, &pcm)).unwrap();
        path
    }

    fn headless() -> EngineConfig {
        EngineConfig::new(Arc::new(NullRendererFactory), HttpClient::default())
    }

    fn wait_for(
        capture: &audiowave_session::NotificationCapture,
        wanted: impl Fn(&Notification) -> bool,
    ) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(n) = capture.recv_timeout(Duration::from_millis(100)) {
                if wanted(&n) {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn test_plays_local_file_to_completion() {
        let path = temp_wav("complete.wav", 300);
        let (notifier, capture) = HandleNotifier::capture(1);
        let mut engine = PlaybackEngine::start(
            ResolvedResource::File(path.clone()),
            notifier,
            CancelToken::new(),
            &headless(),
        )
        .unwrap();

        assert_eq!(engine.duration_ms(), Some(300));
        assert_eq!(engine.position_ms(), 0);
        engine.play().unwrap();

        assert!(wait_for(&capture, |n| *n == Notification::Finished));
        assert!(engine.position_ms() >= 250);

        engine.release();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_paused_engine_does_not_advance() {
        let path = temp_wav("paused.wav", 500);
        let (notifier, _capture) = HandleNotifier::capture(1);
        let mut engine = PlaybackEngine::start(
            ResolvedResource::File(path.clone()),
            notifier,
            CancelToken::new(),
            &headless(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(engine.position_ms(), 0);

        // The decode thread may land a frame or two before the target
        engine.seek(200).unwrap();
        let pos = engine.position_ms();
        assert!((190..=200).contains(&pos), "position {}", pos);
        thread::sleep(Duration::from_millis(100));
        let pos = engine.position_ms();
        assert!((190..=200).contains(&pos), "position {}", pos);

        engine.seek(10_000).unwrap();
        // Clamped to the track length
        assert!(engine.position_ms() <= 500);

        engine.release();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_fails_to_start() {
        let (notifier, _capture) = HandleNotifier::capture(1);
        let err = PlaybackEngine::start(
            ResolvedResource::File("/definitely/missing.wav".into()),
            notifier,
            CancelToken::new(),
            &headless(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AudioError::ResourceUnavailable(_)));
    }

    #[test]
    fn test_stalled_stream_reports_buffering() {
        use audiowave_transport_http::testing::{wav_i16, ServeOptions, TestServer};

        // Longer than one 256KB range at 48kHz stereo, so a second range is needed
        let body = wav_i16(48000, 2, 76_800, 800);
        let options = ServeOptions {
            stall_after_first_range: Duration::from_millis(2500),
            ..Default::default()
        };
        let server = TestServer::serve(body, options).unwrap();

        let (notifier, capture) = HandleNotifier::capture(1);
        let mut engine = PlaybackEngine::start(
            ResolvedResource::Url(server.url("long.wav")),
            notifier,
            CancelToken::new(),
            &headless(),
        )
        .unwrap();
        assert_eq!(engine.duration_ms(), Some(1600));
        engine.play().unwrap();

        assert!(wait_for(&capture, |n| *n == Notification::Buffering(true)));
        assert!(wait_for(&capture, |n| *n == Notification::Buffering(false)));
        assert!(wait_for(&capture, |n| *n == Notification::Finished));

        engine.release();
    }

    struct NoDeviceFactory;

    impl RendererFactory for NoDeviceFactory {
        fn create(&self, _preferred: OutputSpec, _feed: RenderFeed) -> Result<Box<dyn AudioRenderer>> {
            Err(AudioError::DeviceError("No output device available".to_string()))
        }
    }

    #[test]
    fn test_missing_output_device_fails_acquisition() {
        let path = temp_wav("nodevice.wav", 100);
        let (notifier, _capture) = HandleNotifier::capture(1);
        let config = EngineConfig::new(Arc::new(NoDeviceFactory), HttpClient::default());
        let err = PlaybackEngine::start(ResolvedResource::File(path.clone()), notifier, CancelToken::new(), &config)
            .err()
            .unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, AudioError::SessionAcquisitionFailed(_)));
        assert!(matches!(err.into_unavailable(), AudioError::SessionAcquisitionFailed(_)));
    }

    #[test]
    fn test_garbage_file_fails_to_start() {
        let path = std::env::temp_dir().join(format!("audiowave_engine_{}_garbage.mp3", std::process::id()));
        std::fs::write(&path, b"definitely not audio").unwrap();
        let (notifier, _capture) = HandleNotifier::capture(1);
        let result = PlaybackEngine::start(
            ResolvedResource::File(path.clone()),
            notifier,
            CancelToken::new(),
            &headless(),
        );
        let _ = std::fs::remove_file(&path);
        assert!(result.is_err());
    }
}
