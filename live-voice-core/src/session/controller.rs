use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::audio_models::{AudioDeviceInfo, EncodedChunk, SessionDiagnostics};
use crate::models::config::SessionConfiguration;
use crate::models::error::SessionError;
use crate::models::events::{InboundAudioEvent, TransportEvent};
use crate::models::state::SessionState;
use crate::session::capture::CapturePipeline;
use crate::session::events::SessionEvent;
use crate::session::scheduler::PlaybackScheduler;
use crate::traits::input_device::InputDevice;
use crate::traits::output_device::{OutputDevice, PlaybackFinishedCallback};
use crate::traits::session_delegate::SessionDelegate;
use crate::traits::transport::{Connector, TransportConnection, TransportEvents, TransportLink};

/// State shared between the controller and its worker thread.
struct SharedState {
    state: SessionState,
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
}

/// Applies state transitions and forwards them to the delegate.
#[derive(Clone)]
struct StateNotifier {
    shared: Arc<Mutex<SharedState>>,
    delegate: Option<Arc<dyn SessionDelegate>>,
}

impl StateNotifier {
    fn current(&self) -> SessionState {
        self.shared.lock().state.clone()
    }

    fn set(&self, state: SessionState) {
        self.shared.lock().state = state.clone();
        self.announce(&state);
    }

    /// Move to `next` only if the current state passes `allowed`.
    fn advance(&self, allowed: impl Fn(&SessionState) -> bool, next: SessionState) -> bool {
        {
            let mut s = self.shared.lock();
            if !allowed(&s.state) {
                return false;
            }
            s.state = next.clone();
        }
        self.announce(&next);
        true
    }

    fn fail(&self, error: SessionError) {
        log::error!("Live session failed: {}", error);
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(&error);
        }
        self.set(SessionState::Errored(error));
    }

    fn announce(&self, state: &SessionState) {
        log::info!("Session state: {}", state.status_text());
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(state);
        }
    }
}

struct WorkerHandle {
    events: flume::Sender<SessionEvent>,
    handle: thread::JoinHandle<()>,
}

/// Live voice session orchestrator.
///
/// Generic over the input device, output device and transport connector.
/// Owns the device handles and the connection; every session-level decision
/// happens on one worker thread that consumes [`SessionEvent`]s in order:
///
/// ```text
/// [InputDevice] → [CapturePipeline] → send queue → [Connection] → remote
/// remote → [Connection] → SessionEvent ─→ worker → [PlaybackScheduler] → [OutputDevice]
/// ```
///
/// `start()` and `stop()` never return errors. Failures end in
/// [`SessionState::Errored`], a status string and [`SessionDelegate::on_error`].
pub struct LiveSession<I, O, C>
where
    I: InputDevice + 'static,
    O: OutputDevice + 'static,
    C: Connector,
{
    input: Arc<Mutex<I>>,
    output: Arc<Mutex<O>>,
    connector: Arc<C>,
    config: SessionConfiguration,
    shared: Arc<Mutex<SharedState>>,
    diagnostics: Arc<Mutex<SessionDiagnostics>>,
    delegate: Option<Arc<dyn SessionDelegate>>,
    worker: Option<WorkerHandle>,
}

impl<I, O, C> LiveSession<I, O, C>
where
    I: InputDevice + 'static,
    O: OutputDevice + 'static,
    C: Connector,
{
    pub fn new(input: I, output: O, connector: C, config: SessionConfiguration) -> Self {
        Self {
            input: Arc::new(Mutex::new(input)),
            output: Arc::new(Mutex::new(output)),
            connector: Arc::new(connector),
            config,
            shared: Arc::new(Mutex::new(SharedState {
                state: SessionState::Idle,
                session_id: None,
                started_at: None,
            })),
            diagnostics: Arc::new(Mutex::new(SessionDiagnostics::default())),
            delegate: None,
            worker: None,
        }
    }

    /// Takes effect from the next `start()`.
    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn config(&self) -> &SessionConfiguration {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state.clone()
    }

    pub fn status_text(&self) -> &'static str {
        self.shared.lock().state.status_text()
    }

    /// Id of the current or most recent session.
    pub fn session_id(&self) -> Option<Uuid> {
        self.shared.lock().session_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().started_at
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.diagnostics.lock().clone()
    }

    pub fn available_devices(&self) -> Vec<AudioDeviceInfo> {
        let mut devices = Vec::new();
        {
            let input = self.input.lock();
            if input.is_available() {
                devices.push(input.device_info());
            }
        }
        devices.push(self.output.lock().device_info());
        devices
    }

    /// Open a new session. Transitions: idle/closed/errored → connecting.
    ///
    /// A call while a session is connecting, active or closing is ignored.
    pub fn start(&mut self) {
        let current = self.state();
        if !current.can_start() {
            log::debug!("start() ignored while {}", current.status_text());
            return;
        }
        self.reap_worker();

        let notifier = self.notifier();
        if let Err(reason) = self.config.validate() {
            notifier.fail(SessionError::ConfigurationFailed(reason));
            return;
        }

        *self.diagnostics.lock() = SessionDiagnostics::default();
        let session_id = Uuid::new_v4();
        {
            let mut s = self.shared.lock();
            s.session_id = Some(session_id);
            s.started_at = Some(Utc::now());
        }
        log::info!("Starting live session {}", session_id);
        notifier.set(SessionState::Connecting);

        let (outbound_tx, outbound_rx) = flume::unbounded();
        let (events_tx, events_rx) = flume::unbounded();
        let link = TransportLink {
            outbound: outbound_rx,
            events: TransportEvents::new(events_tx.clone()),
        };

        let connection = match self.connector.connect(&self.config, link) {
            Ok(connection) => connection,
            Err(e) => {
                notifier.fail(e);
                return;
            }
        };

        let worker = SessionWorker {
            input: Arc::clone(&self.input),
            output: Arc::clone(&self.output),
            config: self.config.clone(),
            notifier: notifier.clone(),
            diagnostics: Arc::clone(&self.diagnostics),
            events: events_tx.clone(),
            connection: Some(connection),
            outbound: Some(outbound_tx),
            capture: None,
            scheduler: None,
        };

        match thread::Builder::new()
            .name("live-session".into())
            .spawn(move || worker.run(events_rx))
        {
            Ok(handle) => {
                self.worker = Some(WorkerHandle {
                    events: events_tx,
                    handle,
                });
            }
            Err(e) => notifier.fail(SessionError::Unknown(format!(
                "failed to spawn session worker: {}",
                e
            ))),
        }
    }

    /// Hard cancellation. Transitions: connecting/active → closing → closed.
    ///
    /// Returns once devices are released and the connection is closed.
    /// Outside a running session this only waits for a finishing worker.
    pub fn stop(&mut self) {
        let notifier = self.notifier();
        let requested = notifier.advance(SessionState::can_stop, SessionState::Closing);

        if requested {
            if let Some(ref worker) = self.worker {
                let _ = worker.events.send(SessionEvent::Shutdown);
            }
        }
        self.reap_worker();
    }

    fn notifier(&self) -> StateNotifier {
        StateNotifier {
            shared: Arc::clone(&self.shared),
            delegate: self.delegate.clone(),
        }
    }

    fn reap_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.events.send(SessionEvent::Shutdown);
        if worker.handle.join().is_err() {
            log::error!("Session worker panicked");
            self.notifier()
                .fail(SessionError::Unknown("session worker panicked".into()));
        }
    }
}

impl<I, O, C> Drop for LiveSession<I, O, C>
where
    I: InputDevice + 'static,
    O: OutputDevice + 'static,
    C: Connector,
{
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything one session owns, moved onto the worker thread.
struct SessionWorker<I, O, C>
where
    I: InputDevice + 'static,
    O: OutputDevice + 'static,
    C: TransportConnection,
{
    input: Arc<Mutex<I>>,
    output: Arc<Mutex<O>>,
    config: SessionConfiguration,
    notifier: StateNotifier,
    diagnostics: Arc<Mutex<SessionDiagnostics>>,
    events: flume::Sender<SessionEvent>,
    connection: Option<C>,
    outbound: Option<flume::Sender<EncodedChunk>>,
    capture: Option<CapturePipeline<I>>,
    scheduler: Option<PlaybackScheduler<O>>,
}

impl<I, O, C> SessionWorker<I, O, C>
where
    I: InputDevice + 'static,
    O: OutputDevice + 'static,
    C: TransportConnection,
{
    fn run(mut self, events: flume::Receiver<SessionEvent>) {
        // The controller keeps a sender alive, so this only ends via shutdown.
        while let Ok(event) = events.recv() {
            let outcome = match event {
                SessionEvent::Transport(TransportEvent::Opened) => self.on_opened(),
                SessionEvent::Transport(TransportEvent::Inbound(inbound)) => {
                    self.on_inbound(inbound)
                }
                SessionEvent::PlaybackFinished(id) => {
                    if let Some(ref mut scheduler) = self.scheduler {
                        scheduler.finished(id);
                    }
                    None
                }
                SessionEvent::Shutdown => Some(SessionState::Closed),
            };

            if let Some(final_state) = outcome {
                self.shutdown(final_state);
                return;
            }
        }
        self.shutdown(SessionState::Closed);
    }

    /// Acquire both devices, then go live. Returns a final state on failure.
    fn on_opened(&mut self) -> Option<SessionState> {
        if self.notifier.current() != SessionState::Connecting {
            log::debug!("Transport opened after the session left connecting, ignoring");
            return None;
        }

        let finished_tx = self.events.clone();
        let on_finished: PlaybackFinishedCallback = Arc::new(move |id| {
            let _ = finished_tx.send(SessionEvent::PlaybackFinished(id));
        });

        let scheduler = match PlaybackScheduler::open(
            Arc::clone(&self.output),
            self.config.output_sample_rate,
            on_finished,
            Arc::clone(&self.diagnostics),
        ) {
            Ok(scheduler) => scheduler,
            Err(e) => return Some(SessionState::Errored(e)),
        };
        self.scheduler = Some(scheduler);

        let Some(outbound) = self.outbound.clone() else {
            return Some(SessionState::Errored(SessionError::Unknown(
                "send queue already closed".into(),
            )));
        };
        match CapturePipeline::start(
            Arc::clone(&self.input),
            &self.config,
            outbound,
            Arc::clone(&self.diagnostics),
        ) {
            Ok(capture) => self.capture = Some(capture),
            Err(e) => return Some(SessionState::Errored(e)),
        }

        // A stop() issued meanwhile leaves the state at closing; its
        // shutdown event is already queued.
        self.notifier
            .advance(|s| matches!(s, SessionState::Connecting), SessionState::Active);
        None
    }

    fn on_inbound(&mut self, event: InboundAudioEvent) -> Option<SessionState> {
        match event {
            InboundAudioEvent::AudioChunk { data, sample_rate } => {
                let Some(ref mut scheduler) = self.scheduler else {
                    log::debug!("Audio chunk before the session is active, dropping");
                    return None;
                };
                match scheduler.enqueue(&data, sample_rate) {
                    Ok(_) => None,
                    Err(e) => Some(SessionState::Errored(e)),
                }
            }
            InboundAudioEvent::Interrupted => {
                if let Some(ref mut scheduler) = self.scheduler {
                    scheduler.interrupt();
                    if let Some(ref delegate) = self.notifier.delegate {
                        delegate.on_playback_interrupted();
                    }
                }
                None
            }
            InboundAudioEvent::Closed => {
                log::info!("Remote endpoint closed the session");
                Some(SessionState::Closed)
            }
            InboundAudioEvent::Error(reason) => {
                Some(SessionState::Errored(SessionError::Transport(reason)))
            }
        }
    }

    /// Capture teardown, transport close, scheduler flush, then the final state.
    fn shutdown(&mut self, final_state: SessionState) {
        if !matches!(self.notifier.current(), SessionState::Closing) {
            self.notifier.set(SessionState::Closing);
        }

        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.stop() {
                log::warn!("Failed to release input device: {}", e);
            }
        }
        self.outbound.take();

        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }

        if let Some(mut scheduler) = self.scheduler.take() {
            if let Err(e) = scheduler.close() {
                log::warn!("Failed to release output device: {}", e);
            }
        }

        match final_state {
            SessionState::Errored(error) => self.notifier.fail(error),
            state => self.notifier.set(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::frame_codec;
    use crate::session::testing::{
        pcm_chunk, wait_until, FakeConnector, FakeInput, FakeOutput, RecordingDelegate,
    };
    use approx::assert_abs_diff_eq;

    type TestSession = LiveSession<FakeInput, FakeOutput, FakeConnector>;

    struct Harness {
        session: TestSession,
        input: FakeInput,
        output: FakeOutput,
        connector: FakeConnector,
        delegate: Arc<RecordingDelegate>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with(FakeInput::new(), FakeOutput::new(), FakeConnector::new())
        }

        fn with(input: FakeInput, output: FakeOutput, connector: FakeConnector) -> Self {
            let mut session = LiveSession::new(
                input.clone(),
                output.clone(),
                connector.clone(),
                SessionConfiguration::default(),
            );
            let delegate = Arc::new(RecordingDelegate::default());
            session.set_delegate(delegate.clone());
            Self {
                session,
                input,
                output,
                connector,
                delegate,
            }
        }

        /// Start and complete the handshake.
        fn activate(&mut self) {
            self.session.start();
            self.connector.events().opened();
            assert!(wait_until(|| self.session.state().is_active()));
        }

        fn send_audio(&self, millis: u32) {
            self.connector.events().inbound(InboundAudioEvent::AudioChunk {
                data: pcm_chunk((24 * millis) as usize),
                sample_rate: 24_000,
            });
        }
    }

    #[test]
    fn starts_idle_with_standby_status() {
        let h = Harness::new();
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.session.status_text(), "Standby");
        assert!(h.session.session_id().is_none());
    }

    #[test]
    fn start_connects_without_touching_devices() {
        let mut h = Harness::new();
        h.session.start();

        assert_eq!(h.session.state(), SessionState::Connecting);
        assert_eq!(h.session.status_text(), "Connecting...");
        assert_eq!(h.connector.connect_count(), 1);
        assert_eq!(h.input.open_count(), 0);
        assert_eq!(h.output.open_count(), 0);
        assert!(h.session.session_id().is_some());
        assert!(h.session.started_at().is_some());
    }

    #[test]
    fn double_start_is_a_no_op() {
        let mut h = Harness::new();
        h.session.start();
        let id = h.session.session_id();

        h.session.start();

        assert_eq!(h.connector.connect_count(), 1);
        assert_eq!(h.session.session_id(), id);

        h.connector.events().opened();
        assert!(wait_until(|| h.session.state().is_active()));
        h.session.start();
        assert_eq!(h.connector.connect_count(), 1);
        assert_eq!(h.input.open_count(), 1);
    }

    #[test]
    fn stop_while_connecting_acquires_nothing() {
        let mut h = Harness::new();
        h.session.start();

        h.session.stop();

        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.input.open_count(), 0);
        assert_eq!(h.output.open_count(), 0);
        assert!(h.connector.is_closed());
        assert!(h.delegate.errors().is_empty());
        assert_eq!(
            h.delegate.states(),
            vec![
                SessionState::Connecting,
                SessionState::Closing,
                SessionState::Closed
            ]
        );
    }

    #[test]
    fn stop_without_a_session_changes_nothing() {
        let mut h = Harness::new();

        h.session.stop();

        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.delegate.states().is_empty());
        assert_eq!(h.connector.connect_count(), 0);
    }

    #[test]
    fn late_open_after_stop_does_not_acquire_devices() {
        let mut h = Harness::new();
        h.session.start();
        let events = h.connector.events();

        h.session.stop();
        events.opened();

        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.input.open_count(), 0);
    }

    #[test]
    fn open_acquires_devices_and_goes_active() {
        let mut h = Harness::new();
        h.activate();

        assert_eq!(h.session.status_text(), "Listening...");
        assert_eq!(h.input.open_count(), 1);
        assert_eq!(h.input.opened_with(), Some((16_000, 4096)));
        assert_eq!(h.output.open_count(), 1);
    }

    #[test]
    fn captured_blocks_reach_the_send_queue_in_order() {
        let mut h = Harness::new();
        h.activate();

        h.input.push(&[0.25; 4]);
        h.input.push(&[-0.5; 4]);

        let chunks = h.connector.sent_chunks();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.mime_type == "audio/pcm;rate=16000"));
        let first = frame_codec::decode(&chunks[0].data, 16_000).unwrap();
        let second = frame_codec::decode(&chunks[1].data, 16_000).unwrap();
        assert_eq!(first.samples(), &[8192; 4]);
        assert_eq!(second.samples(), &[-16384; 4]);
        assert_eq!(h.session.diagnostics().frames_captured, 2);
    }

    #[test]
    fn inbound_chunks_play_back_to_back() {
        let mut h = Harness::new();
        h.activate();

        for _ in 0..3 {
            h.send_audio(200);
        }

        assert!(wait_until(|| h.output.scheduled_count() == 3));
        let starts = h.output.scheduled_starts();
        assert_abs_diff_eq!(starts[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(starts[1], 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(starts[2], 0.4, epsilon = 1e-9);
    }

    #[test]
    fn interruption_stops_playback_but_keeps_session() {
        let mut h = Harness::new();
        h.activate();
        h.send_audio(200);
        assert!(wait_until(|| h.output.scheduled_count() == 1));

        h.output.set_time(0.05);
        h.connector.events().inbound(InboundAudioEvent::Interrupted);
        assert!(wait_until(|| h.delegate.interruptions() == 1));

        assert_eq!(h.output.stopped_units(), vec![0]);
        assert!(h.session.state().is_active());
        assert_eq!(h.input.close_count(), 0);

        h.send_audio(100);
        assert!(wait_until(|| h.output.scheduled_count() == 2));
        assert_abs_diff_eq!(h.output.scheduled_starts()[1], 0.05, epsilon = 1e-9);
        assert_eq!(h.session.diagnostics().interruptions, 1);
    }

    #[test]
    fn finished_units_are_counted() {
        let mut h = Harness::new();
        h.activate();
        h.send_audio(20);
        assert!(wait_until(|| h.output.scheduled_count() == 1));

        h.output.finish(0);

        assert!(wait_until(|| h.session.diagnostics().units_finished == 1));
    }

    #[test]
    fn transport_error_tears_down_and_errors() {
        let mut h = Harness::new();
        h.activate();

        h.connector
            .events()
            .inbound(InboundAudioEvent::Error("socket reset".into()));

        assert!(wait_until(|| h.session.state().is_terminal()));
        let expected = SessionError::Transport("socket reset".into());
        assert_eq!(h.session.state(), SessionState::Errored(expected.clone()));
        assert_eq!(h.session.status_text(), "Error occurred");
        assert_eq!(h.delegate.errors(), vec![expected]);
        assert!(!h.input.is_open());
        assert!(!h.output.is_open());
        assert!(h.connector.is_closed());
    }

    #[test]
    fn remote_close_ends_in_closed() {
        let mut h = Harness::new();
        h.activate();

        h.connector.events().inbound(InboundAudioEvent::Closed);

        assert!(wait_until(|| h.session.state() == SessionState::Closed));
        assert!(!h.input.is_open());
        assert!(!h.output.is_open());
        assert!(h.delegate.errors().is_empty());
    }

    #[test]
    fn stop_while_active_releases_everything() {
        let mut h = Harness::new();
        h.activate();

        h.session.stop();

        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.input.close_count(), 1);
        assert_eq!(h.output.close_count(), 1);
        assert!(h.connector.is_closed());

        // Nothing left to stop.
        h.session.stop();
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.input.close_count(), 1);
    }

    #[test]
    fn restart_after_close_creates_a_new_session() {
        let mut h = Harness::new();
        h.activate();
        let first = h.session.session_id();
        h.session.stop();

        h.activate();

        assert_ne!(h.session.session_id(), first);
        assert_eq!(h.connector.connect_count(), 2);
        assert_eq!(h.input.open_count(), 2);
    }

    #[test]
    fn restart_after_error_is_allowed() {
        let mut h = Harness::new();
        h.activate();
        h.connector
            .events()
            .inbound(InboundAudioEvent::Error("gone".into()));
        assert!(wait_until(|| h.session.state().is_terminal()));

        h.activate();

        assert!(h.session.state().is_active());
        assert_eq!(h.session.diagnostics().chunks_received, 0);
    }

    #[test]
    fn microphone_failure_aborts_before_active() {
        let mut h = Harness::with(FakeInput::failing(), FakeOutput::new(), FakeConnector::new());
        h.session.start();
        h.connector.events().opened();

        assert!(wait_until(|| h.session.state().is_terminal()));
        assert!(matches!(
            h.session.state(),
            SessionState::Errored(SessionError::DeviceNotAvailable(_))
        ));
        assert!(!h.delegate.states().contains(&SessionState::Active));
        assert!(!h.output.is_open());
        assert!(h.connector.is_closed());
    }

    #[test]
    fn speaker_failure_aborts_before_active() {
        let mut h = Harness::with(FakeInput::new(), FakeOutput::failing(), FakeConnector::new());
        h.session.start();
        h.connector.events().opened();

        assert!(wait_until(|| h.session.state().is_terminal()));
        assert_eq!(h.input.open_count(), 0);
        assert_eq!(h.delegate.errors().len(), 1);
    }

    #[test]
    fn connect_failure_errors_immediately() {
        let mut h = Harness::with(FakeInput::new(), FakeOutput::new(), FakeConnector::failing());
        h.session.start();

        assert_eq!(
            h.session.state(),
            SessionState::Errored(SessionError::Transport("connection refused".into()))
        );
        assert_eq!(h.input.open_count(), 0);
    }

    #[test]
    fn invalid_configuration_never_connects() {
        let config = SessionConfiguration {
            capture_block_size: 0,
            ..Default::default()
        };
        let connector = FakeConnector::new();
        let mut session =
            LiveSession::new(FakeInput::new(), FakeOutput::new(), connector.clone(), config);

        session.start();

        assert!(matches!(
            session.state(),
            SessionState::Errored(SessionError::ConfigurationFailed(_))
        ));
        assert_eq!(connector.connect_count(), 0);
    }

    #[test]
    fn audio_before_open_is_dropped() {
        let mut h = Harness::new();
        h.session.start();
        h.send_audio(100);
        h.connector.events().opened();
        assert!(wait_until(|| h.session.state().is_active()));

        assert_eq!(h.output.scheduled_count(), 0);
    }

    #[test]
    fn drop_stops_the_session() {
        let mut h = Harness::new();
        h.activate();
        let input = h.input.clone();
        let output = h.output.clone();

        drop(h);

        assert!(!input.is_open());
        assert!(!output.is_open());
    }

    #[test]
    fn lists_available_devices() {
        let h = Harness::new();
        let devices = h.session.available_devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Fake Microphone");
    }
}
