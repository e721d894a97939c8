// Channel mapping and sample rate conversion to the output device format

/// Converts decoded interleaved PCM to the output layout.
///
/// Resampling is linear and carries the last input frame across calls so
/// packet boundaries do not click.
pub struct FrameConverter {
    in_rate: u32,
    out_rate: u32,
    in_channels: usize,
    out_channels: usize,
    /// Input frames advanced per output frame
    step: f64,
    /// Read position, relative to `prev` at index 0
    pos: f64,
    prev: Option<Vec<f32>>,
    mapped: Vec<f32>,
    output: Vec<f32>,
}

impl FrameConverter {
    pub fn new(in_rate: u32, out_rate: u32, in_channels: u16, out_channels: u16) -> Self {
        let in_rate = in_rate.max(1);
        let out_rate = out_rate.max(1);
        Self {
            in_rate,
            out_rate,
            in_channels: in_channels.max(1) as usize,
            out_channels: out_channels.max(1) as usize,
            step: in_rate as f64 / out_rate as f64,
            pos: 0.0,
            prev: None,
            mapped: Vec::new(),
            output: Vec::new(),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.in_rate == self.out_rate && self.in_channels == self.out_channels
    }

    pub fn set_input_channels(&mut self, channels: u16) {
        let channels = channels.max(1) as usize;
        if channels != self.in_channels {
            log::debug!("Input channels changed {} -> {}", self.in_channels, channels);
            self.in_channels = channels;
        }
    }

    /// Forget resampling history, e.g. after a seek
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.prev = None;
    }

    pub fn process(&mut self, input: &[f32]) -> &[f32] {
        self.map_channels(input);
        if self.in_rate == self.out_rate {
            return &self.mapped;
        }
        self.resample();
        &self.output
    }

    fn map_channels(&mut self, input: &[f32]) {
        self.mapped.clear();
        let (ic, oc) = (self.in_channels, self.out_channels);

        if ic == oc {
            self.mapped.extend_from_slice(&input[..input.len() - input.len() % ic]);
            return;
        }

        for frame in input.chunks_exact(ic) {
            if oc == 1 {
                // Downmix to mono: average all channels
                self.mapped.push(frame.iter().sum::<f32>() / ic as f32);
            } else {
                for c in 0..oc {
                    self.mapped.push(frame[c % ic]);
                }
            }
        }
    }

    fn resample(&mut self) {
        self.output.clear();
        let oc = self.out_channels;
        let new_frames = self.mapped.len() / oc;
        if new_frames == 0 {
            return;
        }

        let offset = usize::from(self.prev.is_some());
        let total = new_frames + offset;
        let prev = self.prev.take();

        while self.pos + 1.0 < total as f64 {
            let i = self.pos.floor() as usize;
            let frac = (self.pos - i as f64) as f32;
            let a = frame_at(prev.as_deref(), &self.mapped, oc, i);
            let b = frame_at(prev.as_deref(), &self.mapped, oc, i + 1);
            for c in 0..oc {
                self.output.push(a[c] + (b[c] - a[c]) * frac);
            }
            self.pos += self.step;
        }

        // The last frame becomes index 0 of the next call
        self.pos -= (total - 1) as f64;
        self.prev = Some(frame_at(prev.as_deref(), &self.mapped, oc, total - 1).to_vec());
    }
}

/// Frame `i` of the sequence `prev` followed by `mapped`
fn frame_at<'a>(prev: Option<&'a [f32]>, mapped: &'a [f32], channels: usize, i: usize) -> &'a [f32] {
    match prev {
        Some(p) if i == 0 => p,
        Some(_) => &mapped[(i - 1) * channels..i * channels],
        None => &mapped[i * channels..(i + 1) * channels],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let mut conv = FrameConverter::new(48000, 48000, 2, 2);
        assert!(conv.is_passthrough());
        assert_eq!(conv.process(&[0.1, 0.2, 0.3, 0.4]), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_mono_to_stereo() {
        let mut conv = FrameConverter::new(44100, 44100, 1, 2);
        assert_eq!(conv.process(&[0.5, -0.5]), &[0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_stereo_to_mono() {
        let mut conv = FrameConverter::new(44100, 44100, 2, 1);
        assert_eq!(conv.process(&[1.0, 0.0, 0.2, 0.4]), &[0.5, 0.3]);
    }

    #[test]
    fn test_upsample_doubles_frames_over_time() {
        let mut conv = FrameConverter::new(24000, 48000, 1, 1);
        let mut produced = 0;
        for _ in 0..100 {
            produced += conv.process(&[0.25; 240]).len();
        }
        // One frame of history is held back
        assert!((47_990..=48_000).contains(&produced), "produced {}", produced);
    }

    #[test]
    fn test_downsample_interpolates_across_calls() {
        let mut conv = FrameConverter::new(48000, 24000, 1, 1);
        let ramp: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let first = conv.process(&ramp[..4]).to_vec();
        let second = conv.process(&ramp[4..]).to_vec();
        assert_eq!(first, vec![0.0, 2.0]);
        assert_eq!(second, vec![4.0, 6.0]);
    }

    #[test]
    fn test_reset_drops_history() {
        let mut conv = FrameConverter::new(48000, 44100, 2, 2);
        conv.process(&[0.1; 64]);
        conv.reset();
        let out = conv.process(&[0.3; 64]).to_vec();
        assert!(out.iter().all(|s| (*s - 0.3).abs() < 1e-6));
    }
}
