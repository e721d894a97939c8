// Demuxing, decoding and offline analysis of audio resources using Symphonia

pub mod decoder;
pub mod demux;
pub mod source;
pub mod waveform;

pub use decoder::{AudioDecoder, PcmChunk};
pub use demux::{Demuxer, TrackInfo};
pub use source::open_media_source;
pub use waveform::{generate_waveform, WaveformBuilder};

use audiowave_core::{AudioError, CancelToken, ResolvedResource, Result};
use audiowave_transport_http::HttpClient;

/// Open `resource` and return its track parameters without decoding audio
pub fn probe_track(resource: &ResolvedResource, client: &HttpClient, cancel: &CancelToken) -> Result<TrackInfo> {
    let (source, hint) = open_media_source(resource, client, cancel)?;
    let demuxer = Demuxer::from_media_source(source, hint)?;
    demuxer.get_track_info()
}

/// Duration of `resource` in milliseconds.
///
/// Fails with `ResourceUnavailable` when the container does not declare its
/// length.
pub fn probe_duration_ms(resource: &ResolvedResource, client: &HttpClient) -> Result<u64> {
    let info = probe_track(resource, client, &CancelToken::new()).map_err(AudioError::into_unavailable)?;
    info.duration_ms
        .ok_or_else(|| AudioError::ResourceUnavailable("Could not extract duration".to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Build a 16-bit PCM mono WAV file in memory
    pub fn wav_mono_i16(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
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

    /// Write bytes to a unique temp file and return its path
    pub fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "audiowave_test_{}_{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, bytes).expect("write temp file");
        path
    }
}
