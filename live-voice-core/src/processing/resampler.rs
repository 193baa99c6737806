/// Channel mapping and streaming linear-interpolation resampling.
///
/// Bridges device formats and session formats: capture devices deliver
/// interleaved audio at their native rate, the session wants 16 kHz mono;
/// the response arrives as 24 kHz mono and the output device renders at its
/// own rate and channel count.
///
/// The resampler is stateful. The fractional source position and the last
/// input sample carry over between calls, so a stream split into blocks of
/// any size resamples exactly as it would in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Resampler {
    source_sample_rate: f64,
    target_sample_rate: f64,
    /// Source position of the next output sample, relative to `carry`.
    phase: f64,
    /// Last input sample of the previous call.
    carry: Option<f32>,
}

impl Resampler {
    pub fn new(source_sample_rate: f64, target_sample_rate: f64) -> Self {
        Self {
            source_sample_rate,
            target_sample_rate,
            phase: 0.0,
            carry: None,
        }
    }

    pub fn source_sample_rate(&self) -> f64 {
        self.source_sample_rate
    }

    pub fn target_sample_rate(&self) -> f64 {
        self.target_sample_rate
    }

    /// Whether source and target rates match closely enough to skip work.
    pub fn is_passthrough(&self) -> bool {
        (self.source_sample_rate - self.target_sample_rate).abs() < 0.01
    }

    /// Ratio of output samples to input samples.
    pub fn ratio(&self) -> f64 {
        self.target_sample_rate / self.source_sample_rate
    }

    /// Start a new stream: drop the carried position and sample.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.carry = None;
    }

    /// Resample the next block of a mono stream.
    ///
    /// Returns input unchanged if rates match. An output sample that needs
    /// input beyond this block is produced by the next call.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return samples.to_vec();
        }
        if samples.is_empty() {
            return Vec::new();
        }

        let carry = self.carry;
        let offset = usize::from(carry.is_some());
        let at = |i: usize| match carry {
            Some(c) if i == 0 => c,
            _ => samples[i - offset],
        };

        let step = 1.0 / self.ratio();
        let last = (samples.len() + offset - 1) as f64;
        let mut output = Vec::with_capacity((samples.len() as f64 * self.ratio()) as usize + 1);
        while self.phase < last {
            let index = self.phase as usize;
            let fraction = (self.phase - index as f64) as f32;
            output.push(at(index) * (1.0 - fraction) + at(index + 1) * fraction);
            self.phase += step;
        }

        self.phase -= last;
        self.carry = samples.last().copied();
        output
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let frame_count = samples.len() / channels;
    let scale = 1.0 / channels as f32;
    let mut mono = Vec::with_capacity(frame_count);
    for frame in 0..frame_count {
        let mut sum = 0.0f32;
        for ch in 0..channels {
            sum += samples[frame * channels + ch];
        }
        mono.push(sum * scale);
    }
    mono
}

/// Copy each mono sample into every channel of an interleaved buffer.
///
/// `output.len()` must be a multiple of `channels`; extra mono samples are ignored.
pub fn upmix_into(mono: &[f32], output: &mut [f32], channels: usize) {
    let channels = channels.max(1);
    for (frame, &sample) in output.chunks_mut(channels).zip(mono) {
        frame.fill(sample);
    }
}
