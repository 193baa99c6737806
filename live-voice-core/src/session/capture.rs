use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioFrame, EncodedChunk, SessionDiagnostics};
use crate::models::config::SessionConfiguration;
use crate::models::error::SessionError;
use crate::processing::frame_codec;
use crate::traits::input_device::{CaptureCallback, InputDevice};

/// Microphone → codec → transport send queue.
///
/// Holds the input device for as long as it lives. Each block the device
/// pushes becomes one `AudioFrame`, is encoded, and is queued on the
/// transport's outbound channel without any local history. The device is
/// released by [`stop`](Self::stop) or, failing that, on drop.
pub struct CapturePipeline<I: InputDevice> {
    device: Arc<Mutex<I>>,
    running: Arc<AtomicBool>,
    device_open: bool,
}

impl<I: InputDevice> CapturePipeline<I> {
    /// Acquire the input device and start forwarding frames to `outbound`.
    pub fn start(
        device: Arc<Mutex<I>>,
        config: &SessionConfiguration,
        outbound: flume::Sender<EncodedChunk>,
        diagnostics: Arc<Mutex<SessionDiagnostics>>,
    ) -> Result<Self, SessionError> {
        let running = Arc::new(AtomicBool::new(true));
        let sample_rate = config.input_sample_rate;

        let callback: CaptureCallback = {
            let running = Arc::clone(&running);
            Arc::new(move |block: &[f32]| {
                if !running.load(Ordering::SeqCst) {
                    return;
                }

                let frame = AudioFrame::from_f32(block, sample_rate);
                {
                    let mut d = diagnostics.lock();
                    d.frames_captured += 1;
                    d.samples_captured += frame.len() as u64;
                }

                if outbound.send(frame_codec::encode(&frame)).is_err() {
                    log::debug!("Transport send queue closed, capture frame discarded");
                }
            })
        };

        if let Err(e) = device
            .lock()
            .open(sample_rate, config.capture_block_size, callback)
        {
            running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        log::info!(
            "Capture started: {} Hz, {} samples per block",
            sample_rate,
            config.capture_block_size
        );

        Ok(Self {
            device,
            running,
            device_open: true,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop forwarding frames and release the input device.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.running.store(false, Ordering::SeqCst);
        if !self.device_open {
            return Ok(());
        }
        self.device_open = false;
        let result = self.device.lock().close();
        log::info!("Capture stopped");
        result
    }
}

impl<I: InputDevice> Drop for CapturePipeline<I> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Failed to release input device: {}", e);
        }
    }
}
