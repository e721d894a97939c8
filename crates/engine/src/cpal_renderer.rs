// cpal output on the default device

use crate::renderer::{AudioRenderer, OutputSpec, RenderFeed, RendererFactory};
use audiowave_core::{AudioError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};

/// Output stream on the system's default device
pub struct CpalRenderer {
    stream: Stream,
    spec: OutputSpec,
}

impl CpalRenderer {
    pub fn new(preferred: OutputSpec, feed: RenderFeed) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceError("No output device available".to_string()))?;

        log::info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let config = Self::pick_config(&device, preferred)?;
        let spec = OutputSpec {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };
        log::debug!("Stream config: {:?}", config);

        let channels = config.channels;
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| feed.fill(data, channels),
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::DeviceError(format!("Failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::PlaybackError(format!("Failed to start stream: {}", e)))?;

        log::info!("Audio stream started: {}Hz, {} channels", spec.sample_rate, spec.channels);
        Ok(Self { stream, spec })
    }

    /// The source format if the device takes it as f32, otherwise the device default
    fn pick_config(device: &Device, preferred: OutputSpec) -> Result<StreamConfig> {
        let rate = cpal::SampleRate(preferred.sample_rate);
        if let Ok(mut configs) = device.supported_output_configs() {
            let exact = configs.find(|c| {
                c.sample_format() == SampleFormat::F32
                    && c.channels() == preferred.channels
                    && c.min_sample_rate() <= rate
                    && rate <= c.max_sample_rate()
            });
            if let Some(range) = exact {
                return Ok(range.with_sample_rate(rate).config());
            }
        }

        let default = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceError(format!("Output config failed: {}", e)))?;
        if default.sample_format() != SampleFormat::F32 {
            return Err(AudioError::DeviceError(format!(
                "Only f32 output is supported, device wants {:?}",
                default.sample_format()
            )));
        }
        Ok(default.config())
    }
}

impl AudioRenderer for CpalRenderer {
    fn spec(&self) -> OutputSpec {
        self.spec
    }
}

impl Drop for CpalRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            log::warn!("Failed to pause stream on drop: {}", e);
        }
    }
}

/// Factory for `CpalRenderer`
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalRendererFactory;

impl RendererFactory for CpalRendererFactory {
    fn create(&self, preferred: OutputSpec, feed: RenderFeed) -> Result<Box<dyn AudioRenderer>> {
        Ok(Box::new(CpalRenderer::new(preferred, feed)?))
    }
}
