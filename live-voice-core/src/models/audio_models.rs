use std::sync::Arc;

/// Microphone capture rate expected by the remote endpoint.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Rate of the PCM audio streamed back by the remote endpoint.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per capture block delivered by the input device.
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// Int16 ↔ float scale factor used at both codec boundaries.
pub const PCM_SCALE: f32 = 32768.0;

/// An immutable block of signed 16-bit PCM samples.
///
/// Fields are private so a frame cannot be mutated once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioFrame {
    /// Creates a mono frame.
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: 1,
        }
    }

    /// Converts normalized float samples into a mono Int16 frame.
    ///
    /// Samples are scaled by 32768 and saturated to the Int16 range, so a
    /// full-scale `1.0` becomes `32767` instead of wrapping.
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let converted = samples
            .iter()
            .map(|&s| (s * PCM_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
            .collect::<Vec<_>>();
        Self::new(converted, sample_rate)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of samples across all channels.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let frames = self.samples.len() / self.channels as usize;
        frames as f64 / f64::from(self.sample_rate)
    }

    /// Normalizes samples into `[-1.0, 1.0)` by division by 32768.
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| f32::from(s) / PCM_SCALE).collect()
    }
}

/// A wire-ready audio chunk: base64 PCM16LE plus its declared format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: String,
    pub sample_rate: u32,
    pub mime_type: String,
}

impl EncodedChunk {
    /// MIME tag for raw little-endian PCM at the given rate.
    pub fn pcm_mime_type(sample_rate: u32) -> String {
        format!("audio/pcm;rate={}", sample_rate)
    }
}

/// A decoded frame bound to an absolute start time on the output clock.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackUnit {
    pub id: u64,
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub start_time: f64,
}

impl PlaybackUnit {
    pub fn from_frame(id: u64, frame: &AudioFrame, start_time: f64) -> Self {
        Self {
            id,
            samples: frame.to_f32().into(),
            sample_rate: frame.sample_rate(),
            start_time,
        }
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }
}

/// Direction of an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceDirection {
    Input,
    Output,
}

/// An audio device available for capture or playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub direction: DeviceDirection,
    pub is_default: bool,
}

/// Counters for debugging a live session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub frames_captured: u64,
    pub samples_captured: u64,
    pub chunks_received: u64,
    pub units_scheduled: u64,
    pub units_finished: u64,
    pub interruptions: u64,
    pub truncated_chunks: u64,
}
