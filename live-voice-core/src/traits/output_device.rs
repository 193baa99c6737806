use std::sync::Arc;

use crate::models::audio_models::{AudioDeviceInfo, PlaybackUnit};
use crate::models::error::SessionError;

/// Callback invoked with the id of a unit that played to its end.
pub type PlaybackFinishedCallback = Arc<dyn Fn(u64) + Send + Sync + 'static>;

/// Interface for platform-specific playback sinks with their own clock.
///
/// The clock is monotonic and starts at 0 when the device is opened.
pub trait OutputDevice: Send {
    /// Acquire the device and start its clock.
    fn open(
        &mut self,
        sample_rate: u32,
        on_finished: PlaybackFinishedCallback,
    ) -> Result<(), SessionError>;

    /// Current position of the output clock in seconds.
    fn current_time(&self) -> f64;

    /// Schedule a unit to start at `unit.start_time` on the output clock.
    fn schedule(&mut self, unit: &PlaybackUnit) -> Result<(), SessionError>;

    /// Stop one unit immediately, whether it has started or not.
    fn stop_unit(&mut self, id: u64);

    /// Flush everything scheduled or playing.
    fn stop_all(&mut self);

    /// Stop playback and release the device. Must be safe to call twice.
    fn close(&mut self) -> Result<(), SessionError>;

    fn device_info(&self) -> AudioDeviceInfo;
}
