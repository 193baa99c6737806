//! Conversion between `AudioFrame`s and the wire encoding.
//!
//! Wire format: mono PCM, signed 16-bit little-endian samples, wrapped in
//! standard base64 as the transport envelope. Stateless.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::models::audio_models::{AudioFrame, EncodedChunk};
use crate::models::error::SessionError;

/// Bytes per Int16 sample.
pub const SAMPLE_WIDTH: usize = 2;

/// Pack samples as little-endian Int16. Output length = `samples.len() * 2`.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * SAMPLE_WIDTH);
    for &sample in samples {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    data
}

/// Reinterpret little-endian bytes as Int16 samples.
///
/// A trailing odd byte is dropped; only whole samples are returned.
pub fn bytes_to_pcm16(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(SAMPLE_WIDTH)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Number of bytes `bytes_to_pcm16` discards for a buffer of `len` bytes.
pub fn trailing_bytes(len: usize) -> usize {
    len % SAMPLE_WIDTH
}

/// Encode a frame into a transport-ready chunk.
pub fn encode(frame: &AudioFrame) -> EncodedChunk {
    let bytes = pcm16_to_bytes(frame.samples());
    EncodedChunk {
        data: BASE64.encode(bytes),
        sample_rate: frame.sample_rate(),
        mime_type: EncodedChunk::pcm_mime_type(frame.sample_rate()),
    }
}

/// Remove the base64 transport envelope.
pub fn unwrap_envelope(payload: &str) -> Result<Vec<u8>, SessionError> {
    BASE64
        .decode(payload.trim())
        .map_err(|e| SessionError::Protocol(format!("invalid base64 audio payload: {}", e)))
}

/// Decode raw PCM16LE bytes into a mono frame at `sample_rate`.
pub fn decode_pcm16(data: &[u8], sample_rate: u32) -> AudioFrame {
    AudioFrame::new(bytes_to_pcm16(data), sample_rate)
}

/// Inverse of [`encode`]: unwrap the envelope, then reinterpret as Int16.
pub fn decode(payload: &str, sample_rate: u32) -> Result<AudioFrame, SessionError> {
    let bytes = unwrap_envelope(payload)?;
    Ok(decode_pcm16(&bytes, sample_rate))
}
