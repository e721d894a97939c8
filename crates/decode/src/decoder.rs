// Packet decoding into interleaved f32 PCM

use crate::demux::Demuxer;
use audiowave_core::{AudioError, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

/// Interleaved samples of one decoded packet
#[derive(Debug, Clone, Copy)]
pub struct PcmChunk<'a> {
    pub samples: &'a [f32],
    pub channels: u16,
}

impl PcmChunk<'_> {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Audio decoder
pub struct AudioDecoder {
    decoder: Box<dyn Decoder>,
    sample_buf: Option<SampleBuffer<f32>>,
    /// Frames the current sample buffer can hold
    buf_frames: u64,
    channels: u16,
}

impl AudioDecoder {
    pub fn from_demuxer(demuxer: &Demuxer) -> Result<Self> {
        let codec_params = demuxer.codec_params()?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::UnsupportedFormat(format!("Failed to create decoder: {}", e)))?;

        Ok(Self {
            decoder,
            sample_buf: None,
            buf_frames: 0,
            channels,
        })
    }

    /// Channel count of the decoded output
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Decode a packet into interleaved samples.
    ///
    /// Corrupt packets are skipped with a warning and yield an empty chunk.
    pub fn decode(&mut self, packet: &Packet) -> Result<PcmChunk<'_>> {
        let decoded = match self.decoder.decode(packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet: {}", e);
                return Ok(PcmChunk {
                    samples: &[],
                    channels: self.channels,
                });
            }
            Err(e) => return Err(AudioError::DecodingError(format!("Decoding failed: {}", e))),
        };

        let spec = *decoded.spec();
        self.channels = spec.channels.count() as u16;

        let frames = decoded.capacity() as u64;
        if self.sample_buf.is_none() || frames > self.buf_frames {
            self.sample_buf = Some(SampleBuffer::new(frames, spec));
            self.buf_frames = frames;
        }

        let channels = self.channels;
        let samples: &[f32] = match self.sample_buf.as_mut() {
            Some(buf) => {
                buf.copy_interleaved_ref(decoded);
                buf.samples()
            }
            None => &[],
        };
        Ok(PcmChunk { samples, channels })
    }

    /// Drop decoder state after a seek
    pub fn reset(&mut self) {
        self.decoder.reset();
    }
}
