//! cpal speaker output with a sample-accurate playout clock.
//!
//! The output clock is the number of frames the device has pulled, kept in
//! a shared [`PlayoutTimeline`]. Units arrive at the session rate and are
//! resampled to the device rate before being placed on the timeline.
//! Back-to-back units are converted as one stream so that they tile the
//! device clock without gaps or overlaps.

use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::Mutex;

use live_voice_core::models::audio_models::{AudioDeviceInfo, DeviceDirection, PlaybackUnit};
use live_voice_core::models::error::SessionError;
use live_voice_core::processing::playout_timeline::PlayoutTimeline;
use live_voice_core::processing::resampler::{upmix_into, Resampler};
use live_voice_core::traits::output_device::{OutputDevice, PlaybackFinishedCallback};

use crate::device_enumerator::find_device;
use crate::sample_convert::{f32_to_i16, f32_to_u16};

type SharedTimeline = Arc<Mutex<PlayoutTimeline>>;

/// cpal speaker playback.
///
/// Like the input, the `!Send` stream lives on its own thread; scheduling
/// goes through the shared timeline.
pub struct CpalOutputDevice {
    device_name: Option<String>,
    timeline: Option<SharedTimeline>,
    converter: Option<UnitConverter>,
    stop_tx: Option<flume::Sender<()>>,
    playback_handle: Option<thread::JoinHandle<()>>,
}

impl CpalOutputDevice {
    /// Play through the system default output.
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            timeline: None,
            converter: None,
            stop_tx: None,
            playback_handle: None,
        }
    }

    /// Play through a specific output by name.
    pub fn with_device(name: String) -> Self {
        Self {
            device_name: Some(name),
            timeline: None,
            converter: None,
            stop_tx: None,
            playback_handle: None,
        }
    }
}

impl OutputDevice for CpalOutputDevice {
    fn open(
        &mut self,
        sample_rate: u32,
        on_finished: PlaybackFinishedCallback,
    ) -> Result<(), SessionError> {
        if self.timeline.is_some() {
            return Err(SessionError::ConfigurationFailed(
                "output device already open".into(),
            ));
        }

        let (ready_tx, ready_rx) = flume::bounded::<Result<SharedTimeline, SessionError>>(1);
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let device_name = self.device_name.clone();

        let handle = thread::Builder::new()
            .name("cpal-output".into())
            .spawn(move || {
                let (stream, timeline) =
                    match build_playback_stream(device_name.as_deref(), on_finished) {
                        Ok(built) => built,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                let _ = ready_tx.send(Ok(timeline));

                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| SessionError::Unknown(format!("failed to spawn output thread: {}", e)))?;

        let timeline = match ready_rx.recv() {
            Ok(Ok(timeline)) => timeline,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(SessionError::Unknown("output thread exited early".into()));
            }
        };

        let device_rate = timeline.lock().sample_rate();
        log::debug!(
            "Playback at device rate {} Hz for {} Hz session audio",
            device_rate,
            sample_rate
        );
        self.converter = Some(UnitConverter::new(sample_rate, device_rate));
        self.timeline = Some(timeline);
        self.stop_tx = Some(stop_tx);
        self.playback_handle = Some(handle);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.timeline
            .as_ref()
            .map(|t| t.lock().current_time())
            .unwrap_or(0.0)
    }

    fn schedule(&mut self, unit: &PlaybackUnit) -> Result<(), SessionError> {
        let (Some(timeline), Some(converter)) = (self.timeline.as_ref(), self.converter.as_mut())
        else {
            return Err(SessionError::DeviceNotAvailable("output device not open".into()));
        };
        let mut timeline = timeline.lock();
        let samples = converter.convert(unit, &timeline);
        timeline.schedule(unit.id, unit.start_time, samples);
        Ok(())
    }

    fn stop_unit(&mut self, id: u64) {
        if let Some(ref timeline) = self.timeline {
            timeline.lock().cancel(id);
        }
        if let Some(ref mut converter) = self.converter {
            converter.reset();
        }
    }

    fn stop_all(&mut self) {
        if let Some(ref timeline) = self.timeline {
            timeline.lock().clear();
        }
        if let Some(ref mut converter) = self.converter {
            converter.reset();
        }
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.timeline = None;
        self.converter = None;
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.playback_handle.take() {
            if handle.join().is_err() {
                return Err(SessionError::Unknown("output thread panicked".into()));
            }
        }
        Ok(())
    }

    fn device_info(&self) -> AudioDeviceInfo {
        AudioDeviceInfo {
            id: self
                .device_name
                .clone()
                .unwrap_or_else(|| "default-output".into()),
            name: self
                .device_name
                .clone()
                .unwrap_or_else(|| "Default Speaker".into()),
            direction: DeviceDirection::Output,
            is_default: self.device_name.is_none(),
        }
    }
}

impl Drop for CpalOutputDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Converts session-rate units into device-rate timeline buffers.
///
/// A unit that starts where the previous one ended continues the same
/// resampler stream, and every buffer is sized to the device frames its
/// time span covers.
struct UnitConverter {
    device_rate: u32,
    resampler: Resampler,
    next_start: Option<f64>,
}

impl UnitConverter {
    fn new(session_rate: u32, device_rate: u32) -> Self {
        Self {
            device_rate,
            resampler: Resampler::new(f64::from(session_rate), f64::from(device_rate)),
            next_start: None,
        }
    }

    /// Break the stream; the next unit starts fresh.
    fn reset(&mut self) {
        self.resampler.reset();
        self.next_start = None;
    }

    fn convert(&mut self, unit: &PlaybackUnit, timeline: &PlayoutTimeline) -> Vec<f32> {
        let source_rate = f64::from(unit.sample_rate.max(1));
        let contiguous = self
            .next_start
            .is_some_and(|t| (t - unit.start_time).abs() < 1e-6);
        if (self.resampler.source_sample_rate() - source_rate).abs() >= 0.01 {
            self.resampler = Resampler::new(source_rate, f64::from(self.device_rate));
        } else if !contiguous {
            self.resampler.reset();
        }

        let end_time = unit.start_time + unit.samples.len() as f64 / source_rate;
        let length = timeline
            .frame_at(end_time)
            .saturating_sub(timeline.frame_at(unit.start_time)) as usize;

        let mut samples = self.resampler.process(&unit.samples);
        let hold = samples.last().copied().unwrap_or(0.0);
        samples.resize(length, hold);
        self.next_start = Some(end_time);
        samples
    }
}

/// Pulls mono audio from the timeline and fans it out to device channels.
struct PlaybackRenderer {
    channels: usize,
    timeline: SharedTimeline,
    on_finished: PlaybackFinishedCallback,
    mono: Vec<f32>,
    interleaved: Vec<f32>,
}

impl PlaybackRenderer {
    fn new(channels: usize, timeline: SharedTimeline, on_finished: PlaybackFinishedCallback) -> Self {
        Self {
            channels: channels.max(1),
            timeline,
            on_finished,
            mono: Vec::new(),
            interleaved: Vec::new(),
        }
    }

    /// Fill `out` (interleaved) from the timeline.
    fn render(&mut self, out: &mut [f32]) {
        self.mono.resize(out.len() / self.channels, 0.0);
        let finished = self.timeline.lock().render(&mut self.mono);
        out.fill(0.0);
        upmix_into(&self.mono, out, self.channels);
        for id in finished {
            (self.on_finished)(id);
        }
    }

    /// Render into a non-float device buffer.
    fn render_converted<T>(&mut self, out: &mut [T], convert: fn(f32) -> T) {
        let mut interleaved = std::mem::take(&mut self.interleaved);
        interleaved.resize(out.len(), 0.0);
        self.render(&mut interleaved);
        for (dst, &src) in out.iter_mut().zip(&interleaved) {
            *dst = convert(src);
        }
        self.interleaved = interleaved;
    }
}

fn build_playback_stream(
    device_name: Option<&str>,
    on_finished: PlaybackFinishedCallback,
) -> Result<(cpal::Stream, SharedTimeline), SessionError> {
    let host = cpal::default_host();
    let device = find_device(&host, DeviceDirection::Output, device_name)?;
    let supported = device
        .default_output_config()
        .map_err(|e| SessionError::DeviceNotAvailable(format!("output config error: {}", e)))?;

    let channels = supported.channels() as usize;
    let device_rate = supported.sample_rate().0;
    log::info!(
        "Speaker {:?}: {} Hz, {} channels, {:?}",
        device.name().unwrap_or_default(),
        device_rate,
        channels,
        supported.sample_format()
    );

    let timeline = Arc::new(Mutex::new(PlayoutTimeline::new(device_rate)));
    let mut renderer = PlaybackRenderer::new(channels, Arc::clone(&timeline), on_finished);
    let config = supported.config();
    let err_fn = |err: cpal::StreamError| log::error!("Audio output stream error: {}", err);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                renderer.render_converted(data, f32_to_i16)
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                renderer.render_converted(data, f32_to_u16)
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.render(data),
            err_fn,
            None,
        ),
        other => {
            return Err(SessionError::DeviceNotAvailable(format!(
                "unsupported output sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| SessionError::DeviceNotAvailable(format!("build output stream failed: {}", e)))?;

    stream
        .play()
        .map_err(|e| SessionError::DeviceNotAvailable(format!("start output stream failed: {}", e)))?;
    Ok((stream, timeline))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(channels: usize, rate: u32) -> (PlaybackRenderer, SharedTimeline, Arc<Mutex<Vec<u64>>>) {
        let timeline = Arc::new(Mutex::new(PlayoutTimeline::new(rate)));
        let finished = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&finished);
        let on_finished: PlaybackFinishedCallback = Arc::new(move |id| sink.lock().push(id));
        (
            PlaybackRenderer::new(channels, Arc::clone(&timeline), on_finished),
            timeline,
            finished,
        )
    }

    #[test]
    fn mono_timeline_is_copied_to_every_channel() {
        let (mut renderer, timeline, _) = renderer(2, 1000);
        timeline.lock().schedule(0, 0.0, vec![0.5, -0.5]);

        let mut out = [0.0f32; 6];
        renderer.render(&mut out);

        assert_eq!(out, [0.5, 0.5, -0.5, -0.5, 0.0, 0.0]);
        assert_eq!(timeline.lock().position(), 3);
    }

    #[test]
    fn finished_units_are_reported() {
        let (mut renderer, timeline, finished) = renderer(1, 1000);
        timeline.lock().schedule(7, 0.0, vec![0.1; 4]);

        let mut out = [0.0f32; 4];
        renderer.render(&mut out);

        assert_eq!(*finished.lock(), vec![7]);
    }

    #[test]
    fn integer_buffers_are_converted() {
        let (mut renderer, timeline, _) = renderer(1, 1000);
        timeline.lock().schedule(0, 0.0, vec![0.5, -1.0]);

        let mut out = [0i16; 3];
        renderer.render_converted(&mut out, f32_to_i16);

        assert_eq!(out, [16384, i16::MIN, 0]);
    }

    #[test]
    fn back_to_back_units_tile_a_fractional_rate() {
        // 24 kHz session audio on a 44.1 kHz speaker.
        let mut timeline = PlayoutTimeline::new(44_100);
        let mut converter = UnitConverter::new(24_000, 44_100);
        let duration = 1000.0 / 24_000.0;

        let mut start_time = 0.0;
        for id in 0..4 {
            let unit = PlaybackUnit {
                id,
                samples: vec![0.5; 1000].into(),
                sample_rate: 24_000,
                start_time,
            };
            let samples = converter.convert(&unit, &timeline);
            timeline.schedule(unit.id, unit.start_time, samples);
            start_time += duration;
        }

        let mut out = vec![0.0f32; timeline.frame_at(start_time) as usize];
        let finished = timeline.render(&mut out);

        assert_eq!(out.len(), 7350);
        assert_eq!(finished.len(), 4);
        assert!(out.iter().all(|s| (s - 0.5).abs() < 1e-5));
    }

    #[test]
    fn gap_between_units_restarts_the_stream() {
        let timeline = PlayoutTimeline::new(48_000);
        let mut converter = UnitConverter::new(24_000, 48_000);
        let unit = |id, start_time, value| PlaybackUnit {
            id,
            samples: vec![value; 100].into(),
            sample_rate: 24_000,
            start_time,
        };

        converter.convert(&unit(0, 0.0, 1.0), &timeline);
        let later = converter.convert(&unit(1, 1.0, 0.0), &timeline);

        assert_eq!(later.len(), 200);
        assert!(later.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn unopened_device_reports_time_zero_and_rejects_units() {
        let mut device = CpalOutputDevice::default_device();
        assert_eq!(device.current_time(), 0.0);

        let unit = PlaybackUnit {
            id: 0,
            samples: vec![0.0; 10].into(),
            sample_rate: 24_000,
            start_time: 0.0,
        };
        assert!(matches!(
            device.schedule(&unit),
            Err(SessionError::DeviceNotAvailable(_))
        ));

        device.stop_unit(0);
        device.stop_all();
        assert!(device.close().is_ok());
    }
}
