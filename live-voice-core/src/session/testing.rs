//! In-memory devices and transport for exercising the session without
//! hardware or network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::audio_models::{AudioDeviceInfo, DeviceDirection, EncodedChunk, PlaybackUnit};
use crate::models::config::SessionConfiguration;
use crate::models::error::SessionError;
use crate::models::state::SessionState;
use crate::processing::frame_codec;
use crate::traits::input_device::{CaptureCallback, InputDevice};
use crate::traits::output_device::{OutputDevice, PlaybackFinishedCallback};
use crate::traits::session_delegate::SessionDelegate;
use crate::traits::transport::{Connector, TransportConnection, TransportEvents, TransportLink};

/// PCM16LE bytes of `samples` quiet, non-zero samples.
pub fn pcm_chunk(samples: usize) -> Vec<u8> {
    frame_codec::pcm16_to_bytes(&vec![100; samples])
}

/// Poll `condition` until it holds or two seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[derive(Default)]
struct InputInner {
    callback: Option<CaptureCallback>,
    opened_with: Option<(u32, usize)>,
    open_count: usize,
    close_count: usize,
    fail_open: bool,
}

/// Microphone whose blocks are pushed by the test.
#[derive(Clone, Default)]
pub struct FakeInput {
    inner: Arc<Mutex<InputInner>>,
}

impl FakeInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// An input whose `open` reports the device as unavailable.
    pub fn failing() -> Self {
        let input = Self::new();
        input.inner.lock().fail_open = true;
        input
    }

    /// Deliver one block through the registered callback, as an audio thread would.
    pub fn push(&self, block: &[f32]) {
        let callback = self.inner.lock().callback.clone();
        if let Some(callback) = callback {
            callback(block);
        }
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().open_count
    }

    pub fn close_count(&self) -> usize {
        self.inner.lock().close_count
    }

    pub fn opened_with(&self) -> Option<(u32, usize)> {
        self.inner.lock().opened_with
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().callback.is_some()
    }
}

impl InputDevice for FakeInput {
    fn is_available(&self) -> bool {
        !self.inner.lock().fail_open
    }

    fn open(
        &mut self,
        sample_rate: u32,
        block_size: usize,
        callback: CaptureCallback,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.fail_open {
            return Err(SessionError::DeviceNotAvailable("no microphone".into()));
        }
        inner.open_count += 1;
        inner.opened_with = Some((sample_rate, block_size));
        inner.callback = Some(callback);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.callback.take().is_some() {
            inner.close_count += 1;
        }
        Ok(())
    }

    fn device_info(&self) -> AudioDeviceInfo {
        AudioDeviceInfo {
            id: "fake-input".into(),
            name: "Fake Microphone".into(),
            direction: DeviceDirection::Input,
            is_default: true,
        }
    }
}

#[derive(Default)]
struct OutputInner {
    time: f64,
    on_finished: Option<PlaybackFinishedCallback>,
    scheduled: Vec<PlaybackUnit>,
    stopped: Vec<u64>,
    open_count: usize,
    close_count: usize,
    fail_open: bool,
}

/// Speaker with a manually advanced clock.
#[derive(Clone, Default)]
pub struct FakeOutput {
    inner: Arc<Mutex<OutputInner>>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let output = Self::new();
        output.inner.lock().fail_open = true;
        output
    }

    pub fn set_time(&self, seconds: f64) {
        self.inner.lock().time = seconds;
    }

    /// Report a unit as played to its end.
    pub fn finish(&self, id: u64) {
        let callback = self.inner.lock().on_finished.clone();
        if let Some(callback) = callback {
            callback(id);
        }
    }

    pub fn scheduled_starts(&self) -> Vec<f64> {
        self.inner.lock().scheduled.iter().map(|u| u.start_time).collect()
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.lock().scheduled.len()
    }

    pub fn stopped_units(&self) -> Vec<u64> {
        self.inner.lock().stopped.clone()
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().open_count
    }

    pub fn close_count(&self) -> usize {
        self.inner.lock().close_count
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().on_finished.is_some()
    }
}

impl OutputDevice for FakeOutput {
    fn open(
        &mut self,
        _sample_rate: u32,
        on_finished: PlaybackFinishedCallback,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.fail_open {
            return Err(SessionError::DeviceNotAvailable("no speaker".into()));
        }
        inner.open_count += 1;
        inner.on_finished = Some(on_finished);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.inner.lock().time
    }

    fn schedule(&mut self, unit: &PlaybackUnit) -> Result<(), SessionError> {
        self.inner.lock().scheduled.push(unit.clone());
        Ok(())
    }

    fn stop_unit(&mut self, id: u64) {
        self.inner.lock().stopped.push(id);
    }

    fn stop_all(&mut self) {}

    fn close(&mut self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.on_finished.take().is_some() {
            inner.close_count += 1;
        }
        Ok(())
    }

    fn device_info(&self) -> AudioDeviceInfo {
        AudioDeviceInfo {
            id: "fake-output".into(),
            name: "Fake Speaker".into(),
            direction: DeviceDirection::Output,
            is_default: true,
        }
    }
}

#[derive(Default)]
struct ConnectorInner {
    events: Option<TransportEvents>,
    outbound: Option<flume::Receiver<EncodedChunk>>,
    closed: bool,
    fail_connect: bool,
}

/// Transport driven by the test: it emits events on the session's behalf
/// and reads whatever capture queued.
#[derive(Clone, Default)]
pub struct FakeConnector {
    inner: Arc<Mutex<ConnectorInner>>,
    connects: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let connector = Self::new();
        connector.inner.lock().fail_connect = true;
        connector
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Event handle of the most recent connection.
    pub fn events(&self) -> TransportEvents {
        self.inner
            .lock()
            .events
            .clone()
            .expect("connector has not been used")
    }

    /// Drain the chunks capture has queued so far.
    pub fn sent_chunks(&self) -> Vec<EncodedChunk> {
        self.inner
            .lock()
            .outbound
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Connector for FakeConnector {
    type Connection = FakeConnection;

    fn connect(
        &self,
        _config: &SessionConfiguration,
        link: TransportLink,
    ) -> Result<FakeConnection, SessionError> {
        let mut inner = self.inner.lock();
        if inner.fail_connect {
            return Err(SessionError::Transport("connection refused".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        inner.events = Some(link.events);
        inner.outbound = Some(link.outbound);
        inner.closed = false;
        Ok(FakeConnection {
            inner: Arc::clone(&self.inner),
        })
    }
}

pub struct FakeConnection {
    inner: Arc<Mutex<ConnectorInner>>,
}

impl TransportConnection for FakeConnection {
    fn close(&mut self) {
        self.inner.lock().closed = true;
    }
}

/// Delegate that records every notification.
#[derive(Default)]
pub struct RecordingDelegate {
    states: Mutex<Vec<SessionState>>,
    errors: Mutex<Vec<SessionError>>,
    interruptions: AtomicUsize,
}

impl RecordingDelegate {
    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().clone()
    }

    pub fn errors(&self) -> Vec<SessionError> {
        self.errors.lock().clone()
    }

    pub fn interruptions(&self) -> usize {
        self.interruptions.load(Ordering::SeqCst)
    }
}

impl SessionDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        self.states.lock().push(state.clone());
    }

    fn on_error(&self, error: &SessionError) {
        self.errors.lock().push(error.clone());
    }

    fn on_playback_interrupted(&self) {
        self.interruptions.fetch_add(1, Ordering::SeqCst);
    }
}
