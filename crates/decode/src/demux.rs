// Container demuxing using Symphonia

use audiowave_core::{AudioError, Result};
use symphonia::core::codecs::{CodecParameters, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

/// Track information
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frame count, when the container declares it
    pub n_frames: Option<u64>,
    pub duration_ms: Option<u64>,
}

/// Audio demuxer wrapper, bound to the first decodable track
pub struct Demuxer {
    format_reader: Box<dyn FormatReader>,
    track_id: u32,
}

impl Demuxer {
    pub fn from_media_source(media_source: Box<dyn MediaSource>, hint: Hint) -> Result<Self> {
        let media_source_stream = MediaSourceStream::new(media_source, Default::default());

        let probe_result = symphonia::default::get_probe()
            .format(
                &hint,
                media_source_stream,
                &FormatOptions {
                    enable_gapless: true,
                    ..Default::default()
                },
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::ResourceUnavailable(format!("Failed to probe media: {}", e)))?;

        let format_reader = probe_result.format;

        let track_id = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .map(|t| t.id)
            .ok_or_else(|| AudioError::ResourceUnavailable("No audio track found".to_string()))?;

        Ok(Self {
            format_reader,
            track_id,
        })
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn codec_params(&self) -> Result<&CodecParameters> {
        self.format_reader
            .tracks()
            .iter()
            .find(|t| t.id == self.track_id)
            .map(|t| &t.codec_params)
            .ok_or_else(|| AudioError::ResourceUnavailable("Track not found".to_string()))
    }

    /// Next packet of our track; `None` at end of stream
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    return Err(AudioError::UnsupportedFormat(
                        "Track layout changed mid-stream".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(AudioError::DecodingError(format!("Failed to read packet: {}", e)));
                }
            };

            if packet.track_id() == self.track_id {
                return Ok(Some(packet));
            }
        }
    }

    /// Seek to `position_ms`; returns the position actually reached
    pub fn seek(&mut self, position_ms: u64) -> Result<u64> {
        let seconds = position_ms / 1000;
        let frac = (position_ms % 1000) as f64 / 1000.0;

        let seeked = self
            .format_reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::new(seconds, frac),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| AudioError::PlaybackError(format!("Seek failed: {}", e)))?;

        let params = self.codec_params()?;
        let actual_ms = match (params.time_base, params.sample_rate) {
            (Some(tb), _) => {
                let t = tb.calc_time(seeked.actual_ts);
                t.seconds * 1000 + (t.frac * 1000.0) as u64
            }
            (None, Some(rate)) => seeked.actual_ts * 1000 / rate as u64,
            (None, None) => position_ms,
        };
        Ok(actual_ms)
    }

    pub fn get_track_info(&self) -> Result<TrackInfo> {
        let codec_params = self.codec_params()?;

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| AudioError::UnsupportedFormat("Sample rate not specified".to_string()))?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);
        let n_frames = codec_params.n_frames;
        let duration_ms = n_frames.map(|n| n * 1000 / sample_rate as u64);

        Ok(TrackInfo {
            sample_rate,
            channels,
            n_frames,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::wav_mono_i16;
    use std::io::Cursor;

    fn wav_demuxer(frames: usize) -> Demuxer {
        let bytes = wav_mono_i16(8000, &vec![100i16; frames]);
        let mut hint = Hint::new();
        hint.with_extension("wav");
        Demuxer::from_media_source(Box::new(Cursor::new(bytes)), hint).unwrap()
    }

    #[test]
    fn test_track_info_from_wav() {
        let info = wav_demuxer(4000).get_track_info().unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.n_frames, Some(4000));
        assert_eq!(info.duration_ms, Some(500));
    }

    #[test]
    fn test_packets_end_with_none() {
        let mut demuxer = wav_demuxer(800);
        let mut packets = 0;
        while let Some(_) = demuxer.next_packet().unwrap() {
            packets += 1;
            assert!(packets < 10_000);
        }
        assert!(packets > 0);
    }

    #[test]
    fn test_garbage_is_unavailable() {
        let result = Demuxer::from_media_source(Box::new(Cursor::new(vec![0u8; 64])), Hint::new());
        assert!(matches!(result, Err(AudioError::ResourceUnavailable(_))));
    }
}
