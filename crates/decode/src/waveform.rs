// Amplitude waveform for drawing a scrub bar
//
// Frames are mixed down to mono and grouped into equal buckets; each bucket
// contributes its RMS (doubled, capped at 1.0). The result is normalized so
// the loudest bucket is 1.0.

use crate::decoder::AudioDecoder;
use crate::demux::Demuxer;
use crate::source::open_media_source;
use audiowave_core::{AudioError, CancelToken, ResolvedResource, Result};
use audiowave_transport_http::HttpClient;

/// Streaming accumulator for a fixed number of waveform points
pub struct WaveformBuilder {
    points: Vec<f32>,
    target: usize,
    frames_per_point: u64,
    frames_seen: u64,
    sum_squares: f64,
    frames_in_point: u64,
}

impl WaveformBuilder {
    pub fn new(target: usize, total_frames: u64) -> Self {
        let frames_per_point = if target == 0 {
            1
        } else {
            (total_frames / target as u64).max(1)
        };
        Self {
            points: Vec::with_capacity(target),
            target,
            frames_per_point,
            frames_seen: 0,
            sum_squares: 0.0,
            frames_in_point: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.points.len() >= self.target
    }

    /// Feed interleaved samples with `channels` channels
    pub fn push_interleaved(&mut self, samples: &[f32], channels: usize) {
        let channels = channels.max(1);
        for frame in samples.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            self.push_mono(mono);
        }
    }

    pub fn push_mono(&mut self, sample: f32) {
        if self.is_full() {
            return;
        }
        let s = sample.abs() as f64;
        self.sum_squares += s * s;
        self.frames_in_point += 1;
        self.frames_seen += 1;

        if self.frames_seen >= (self.points.len() as u64 + 1) * self.frames_per_point {
            self.close_point();
        }
    }

    fn close_point(&mut self) {
        let rms = (self.sum_squares / self.frames_in_point as f64).sqrt();
        self.points.push((rms * 2.0).min(1.0) as f32);
        self.sum_squares = 0.0;
        self.frames_in_point = 0;
    }

    pub fn finish(mut self) -> Vec<f32> {
        if !self.is_full() && self.frames_in_point > 0 {
            self.close_point();
        }
        self.points.resize(self.target, 0.0);

        let max = self.points.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            for p in self.points.iter_mut() {
                *p /= max;
            }
        }
        self.points
    }
}

/// Decode `resource` and compute `samples` waveform points in `[0, 1]`
pub fn generate_waveform(resource: &ResolvedResource, samples: usize, client: &HttpClient) -> Result<Vec<f32>> {
    if samples == 0 {
        return Ok(Vec::new());
    }

    let cancel = CancelToken::new();
    let (source, hint) = open_media_source(resource, client, &cancel)?;
    let mut demuxer = Demuxer::from_media_source(source, hint)?;
    let info = demuxer.get_track_info()?;
    let mut decoder = AudioDecoder::from_demuxer(&demuxer)?;

    log::info!(
        "Generating {} waveform points ({}Hz, {} channels, {:?} frames)",
        samples,
        info.sample_rate,
        info.channels,
        info.n_frames
    );

    match info.n_frames {
        Some(total) => {
            let mut builder = WaveformBuilder::new(samples, total);
            while !builder.is_full() {
                let Some(packet) = demuxer.next_packet()? else { break };
                let pcm = decoder.decode(&packet)?;
                builder.push_interleaved(pcm.samples, pcm.channels as usize);
            }
            Ok(builder.finish())
        }
        None => {
            // Length unknown up front: decode everything, then bucket
            let mut mono = Vec::new();
            while let Some(packet) = demuxer.next_packet()? {
                let pcm = decoder.decode(&packet)?;
                let channels = (pcm.channels as usize).max(1);
                mono.extend(
                    pcm.samples
                        .chunks_exact(channels)
                        .map(|f| f.iter().sum::<f32>() / channels as f32),
                );
            }
            if mono.is_empty() {
                return Err(AudioError::DecodingError("No audio decoded".to_string()));
            }
            let mut builder = WaveformBuilder::new(samples, mono.len() as u64);
            for s in mono {
                builder.push_mono(s);
            }
            Ok(builder.finish())
        }
    }
}
