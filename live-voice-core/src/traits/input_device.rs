use std::sync::Arc;

use crate::models::audio_models::AudioDeviceInfo;
use crate::models::error::SessionError;

/// Callback invoked with each captured block.
///
/// Blocks are mono f32 samples in `[-1.0, 1.0]` at the rate requested in
/// [`InputDevice::open`], exactly `block_size` samples long.
pub type CaptureCallback = Arc<dyn Fn(&[f32]) + Send + Sync + 'static>;

/// Interface for platform-specific microphone sources.
///
/// The device pushes blocks; the session never polls it. Implemented by
/// `CpalInputDevice` in `live-voice-native`.
pub trait InputDevice: Send {
    /// Whether a capture device is currently available.
    fn is_available(&self) -> bool;

    /// Acquire the device and start delivering blocks via `callback`.
    ///
    /// The callback fires on a dedicated audio thread; keep processing minimal.
    fn open(
        &mut self,
        sample_rate: u32,
        block_size: usize,
        callback: CaptureCallback,
    ) -> Result<(), SessionError>;

    /// Stop capturing and release the device. Must be safe to call twice.
    fn close(&mut self) -> Result<(), SessionError>;

    /// Information about the device backing this input.
    fn device_info(&self) -> AudioDeviceInfo;
}
