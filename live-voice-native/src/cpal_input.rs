//! cpal microphone input.
//!
//! Opens the input device at its native format and converts on the audio
//! thread: interleaved → mono, device rate → session rate, then re-blocked
//! into fixed-size blocks before they reach the capture callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, StreamTrait};

use live_voice_core::models::audio_models::{AudioDeviceInfo, DeviceDirection};
use live_voice_core::models::error::SessionError;
use live_voice_core::processing::block_buffer::BlockBuffer;
use live_voice_core::processing::resampler::{downmix_to_mono, Resampler};
use live_voice_core::traits::input_device::{CaptureCallback, InputDevice};

use crate::device_enumerator::find_device;
use crate::sample_convert::{i16_to_f32, u16_to_f32};

/// cpal microphone capture.
///
/// `cpal::Stream` is `!Send` on some hosts, so the stream lives on a
/// dedicated thread for as long as the device is open.
pub struct CpalInputDevice {
    device_name: Option<String>,
    running: Arc<AtomicBool>,
    stop_tx: Option<flume::Sender<()>>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl CpalInputDevice {
    /// Capture from the system default microphone.
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            capture_handle: None,
        }
    }

    /// Capture from a specific microphone by name.
    pub fn with_device(name: String) -> Self {
        Self {
            device_name: Some(name),
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            capture_handle: None,
        }
    }
}

impl InputDevice for CpalInputDevice {
    fn is_available(&self) -> bool {
        find_device(
            &cpal::default_host(),
            DeviceDirection::Input,
            self.device_name.as_deref(),
        )
        .is_ok()
    }

    fn open(
        &mut self,
        sample_rate: u32,
        block_size: usize,
        callback: CaptureCallback,
    ) -> Result<(), SessionError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SessionError::ConfigurationFailed(
                "microphone already open".into(),
            ));
        }

        let (ready_tx, ready_rx) = flume::bounded::<Result<(), SessionError>>(1);
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let device_name = self.device_name.clone();

        let handle = thread::Builder::new()
            .name("cpal-input".into())
            .spawn(move || {
                let stream = match build_capture_stream(
                    device_name.as_deref(),
                    sample_rate,
                    block_size,
                    callback,
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Runs until close() sends or drops the stop sender.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| SessionError::Unknown(format!("failed to spawn input thread: {}", e)))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(SessionError::Unknown("input thread exited early".into())));
        if let Err(e) = ready {
            let _ = handle.join();
            return Err(e);
        }

        self.running.store(true, Ordering::SeqCst);
        self.stop_tx = Some(stop_tx);
        self.capture_handle = Some(handle);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                return Err(SessionError::Unknown("input thread panicked".into()));
            }
        }
        Ok(())
    }

    fn device_info(&self) -> AudioDeviceInfo {
        AudioDeviceInfo {
            id: self
                .device_name
                .clone()
                .unwrap_or_else(|| "default-input".into()),
            name: self
                .device_name
                .clone()
                .unwrap_or_else(|| "Default Microphone".into()),
            direction: DeviceDirection::Input,
            is_default: self.device_name.is_none(),
        }
    }
}

impl Drop for CpalInputDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Device-format to session-format conversion, owned by the stream callback.
struct CaptureProcessor {
    channels: usize,
    resampler: Resampler,
    blocks: BlockBuffer,
    callback: CaptureCallback,
}

impl CaptureProcessor {
    fn new(
        channels: usize,
        device_rate: u32,
        session_rate: u32,
        block_size: usize,
        callback: CaptureCallback,
    ) -> Self {
        Self {
            channels,
            resampler: Resampler::new(f64::from(device_rate), f64::from(session_rate)),
            blocks: BlockBuffer::new(block_size),
            callback,
        }
    }

    fn process(&mut self, interleaved: &[f32]) {
        let mono = downmix_to_mono(interleaved, self.channels);
        self.blocks.write(&self.resampler.process(&mono));
        while let Some(block) = self.blocks.pop_block() {
            (self.callback)(&block);
        }
    }
}

fn build_capture_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    block_size: usize,
    callback: CaptureCallback,
) -> Result<cpal::Stream, SessionError> {
    let host = cpal::default_host();
    let device = find_device(&host, DeviceDirection::Input, device_name)?;
    let supported = device
        .default_input_config()
        .map_err(|e| SessionError::DeviceNotAvailable(format!("input config error: {}", e)))?;

    let channels = supported.channels() as usize;
    let device_rate = supported.sample_rate().0;
    log::info!(
        "Microphone {:?}: {} Hz, {} channels, {:?}",
        device.name().unwrap_or_default(),
        device_rate,
        channels,
        supported.sample_format()
    );

    let mut processor = CaptureProcessor::new(channels, device_rate, sample_rate, block_size, callback);
    let config = supported.config();
    let err_fn = |err: cpal::StreamError| log::error!("Audio input stream error: {}", err);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| i16_to_f32(s)).collect();
                processor.process(&samples);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| u16_to_f32(s)).collect();
                processor.process(&samples);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| processor.process(data),
            err_fn,
            None,
        ),
        other => {
            return Err(SessionError::DeviceNotAvailable(format!(
                "unsupported input sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| SessionError::DeviceNotAvailable(format!("build input stream failed: {}", e)))?;

    stream
        .play()
        .map_err(|e| SessionError::DeviceNotAvailable(format!("start input stream failed: {}", e)))?;
    Ok(stream)
}
