use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{PlaybackUnit, SessionDiagnostics};
use crate::models::error::SessionError;
use crate::processing::frame_codec;
use crate::traits::output_device::{OutputDevice, PlaybackFinishedCallback};

/// Time window of a scheduled unit on the output clock, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackWindow {
    pub start_time: f64,
    pub end_time: f64,
}

/// Gapless scheduling of streamed response audio.
///
/// Chunks arrive in small, independently timed pieces. Each one is decoded
/// and placed at `max(next_start_time, clock)`, then the watermark moves to
/// the end of that unit, so consecutive chunks play back to back without
/// gaps or overlap. Interruption stops everything scheduled and rebases the
/// watermark on the current clock.
///
/// Not internally synchronized: the session worker is its only caller, and
/// every operation takes `&mut self`, so decode-then-schedule for one chunk
/// and an interruption reset can never interleave.
pub struct PlaybackScheduler<O: OutputDevice> {
    output: Arc<Mutex<O>>,
    sample_rate: u32,
    next_start_time: f64,
    active_units: BTreeMap<u64, PlaybackWindow>,
    next_unit_id: u64,
    diagnostics: Arc<Mutex<SessionDiagnostics>>,
    device_open: bool,
}

impl<O: OutputDevice> PlaybackScheduler<O> {
    /// Acquire the output device and start with an empty schedule at clock 0.
    pub fn open(
        output: Arc<Mutex<O>>,
        sample_rate: u32,
        on_finished: PlaybackFinishedCallback,
        diagnostics: Arc<Mutex<SessionDiagnostics>>,
    ) -> Result<Self, SessionError> {
        output.lock().open(sample_rate, on_finished)?;
        log::info!("Playback opened at {} Hz", sample_rate);

        Ok(Self {
            output,
            sample_rate,
            next_start_time: 0.0,
            active_units: BTreeMap::new(),
            next_unit_id: 0,
            diagnostics,
            device_open: true,
        })
    }

    /// Decode one inbound chunk and schedule it after everything queued.
    ///
    /// Returns the scheduled window, or `None` when the chunk holds no whole
    /// sample. A trailing odd byte is dropped and the valid prefix is played.
    pub fn enqueue(
        &mut self,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<Option<PlaybackWindow>, SessionError> {
        self.diagnostics.lock().chunks_received += 1;

        if frame_codec::trailing_bytes(data.len()) != 0 {
            log::debug!(
                "Audio chunk of {} bytes is not sample aligned, dropping trailing byte",
                data.len()
            );
            self.diagnostics.lock().truncated_chunks += 1;
        }

        let rate = if sample_rate == 0 { self.sample_rate } else { sample_rate };
        let frame = frame_codec::decode_pcm16(data, rate);
        if frame.is_empty() {
            return Ok(None);
        }

        let now = self.current_time();
        let start_time = self.next_start_time.max(now);
        let id = self.next_unit_id;
        self.next_unit_id += 1;

        let unit = PlaybackUnit::from_frame(id, &frame, start_time);
        self.output.lock().schedule(&unit)?;

        let window = PlaybackWindow {
            start_time,
            end_time: unit.end_time(),
        };
        self.next_start_time = window.end_time;
        self.active_units.insert(id, window);
        self.diagnostics.lock().units_scheduled += 1;

        log::trace!(
            "Scheduled unit {} at {:.3}s for {:.3}s",
            id,
            start_time,
            unit.duration()
        );
        Ok(Some(window))
    }

    /// Forget a unit that played to its end. Unknown ids are ignored.
    pub fn finished(&mut self, id: u64) {
        if self.active_units.remove(&id).is_some() {
            self.diagnostics.lock().units_finished += 1;
        }
    }

    /// Barge-in: stop all scheduled audio and rebase on the current clock.
    ///
    /// Safe on an empty schedule. Returns the number of units stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.stop_active_units();
        self.next_start_time = self.current_time();
        self.diagnostics.lock().interruptions += 1;
        log::debug!(
            "Playback interrupted: {} units stopped, watermark reset to {:.3}s",
            stopped,
            self.next_start_time
        );
        stopped
    }

    /// Stop and clear everything without touching the watermark.
    pub fn flush(&mut self) -> usize {
        let stopped = self.stop_active_units();
        self.output.lock().stop_all();
        stopped
    }

    /// Flush and release the output device.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if !self.device_open {
            return Ok(());
        }
        self.flush();
        self.device_open = false;
        let result = self.output.lock().close();
        log::info!("Playback closed");
        result
    }

    pub fn current_time(&self) -> f64 {
        self.output.lock().current_time()
    }

    /// Output-clock time at which the next unit would start if the device
    /// were still behind.
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_count(&self) -> usize {
        self.active_units.len()
    }

    /// Scheduled or playing windows, in scheduling order.
    pub fn active_windows(&self) -> Vec<PlaybackWindow> {
        self.active_units.values().copied().collect()
    }

    fn stop_active_units(&mut self) -> usize {
        let ids: Vec<u64> = self.active_units.keys().copied().collect();
        {
            let mut output = self.output.lock();
            for &id in &ids {
                output.stop_unit(id);
            }
        }
        self.active_units.clear();
        ids.len()
    }
}

impl<O: OutputDevice> Drop for PlaybackScheduler<O> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to release output device: {}", e);
        }
    }
}
