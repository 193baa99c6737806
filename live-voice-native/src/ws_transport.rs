//! WebSocket transport to the Gemini Live endpoint.
//!
//! One thread per connection owns the socket. It sends the setup message,
//! then alternates between draining the outbound queue (in order, one
//! message per chunk) and a short-timeout read of server messages.
//!
//! The handshake runs on a non-blocking socket so a close request is seen
//! within one poll. Closing waits a bounded time for the thread and then
//! detaches it; a detached thread delivers no further events.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use tungstenite::handshake::HandshakeError;
use tungstenite::http::Uri;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use live_voice_core::models::audio_models::EncodedChunk;
use live_voice_core::models::config::SessionConfiguration;
use live_voice_core::models::error::SessionError;
use live_voice_core::models::events::{InboundAudioEvent, TransportEvent};
use live_voice_core::protocol::{encode_realtime_input, encode_setup, parse_server_message, ServerEvent};
use live_voice_core::traits::transport::{
    Connector, TransportConnection, TransportEvents, TransportLink,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a read may block before the outbound queue is drained again.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

const HANDSHAKE_POLL: Duration = Duration::from_millis(10);

/// How long `close` waits for the connection thread before detaching it.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

static CRYPTO_PROVIDER: Once = Once::new();

/// Opens WebSocket connections to the endpoint in `SessionConfiguration`.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        CRYPTO_PROVIDER.call_once(|| {
            // Fails only if another provider was installed first.
            let _ = rustls::crypto::ring::default_provider().install_default();
        });
        Self
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;

    fn connect(
        &self,
        config: &SessionConfiguration,
        link: TransportLink,
    ) -> Result<WebSocketConnection, SessionError> {
        let url = config.connection_url();
        let (host, port) = endpoint_address(&url)?;
        let setup = encode_setup(config)?;
        let output_rate = config.output_sample_rate;

        let closing = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = flume::bounded::<()>(1);
        let worker = ConnectionWorker {
            url,
            host,
            port,
            setup,
            output_rate,
            outbound: link.outbound,
            events: link.events,
            closing: Arc::clone(&closing),
            _done: done_tx,
        };

        let handle = thread::Builder::new()
            .name("live-transport".into())
            .spawn(move || worker.run())
            .map_err(|e| SessionError::Transport(format!("failed to spawn transport thread: {}", e)))?;

        Ok(WebSocketConnection {
            closing,
            done: done_rx,
            handle: Some(handle),
        })
    }
}

/// Handle to a running connection thread.
pub struct WebSocketConnection {
    closing: Arc<AtomicBool>,
    /// Disconnects when the connection thread exits.
    done: flume::Receiver<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TransportConnection for WebSocketConnection {
    fn close(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };
        match self.done.recv_timeout(CLOSE_GRACE) {
            Err(flume::RecvTimeoutError::Timeout) => {
                log::warn!("Transport thread still busy after {:?}, detaching it", CLOSE_GRACE);
            }
            _ => {
                if handle.join().is_err() {
                    log::error!("Transport thread panicked");
                }
            }
        }
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// What the read loop does with one WebSocket message.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Dispatch(TransportEvent),
    /// A protocol violation; reported, then the connection ends.
    Fail(String),
    Closed,
    Skip,
}

struct ConnectionWorker {
    url: String,
    host: String,
    port: u16,
    setup: String,
    output_rate: u32,
    outbound: flume::Receiver<EncodedChunk>,
    events: TransportEvents,
    closing: Arc<AtomicBool>,
    _done: flume::Sender<()>,
}

impl ConnectionWorker {
    fn run(self) {
        let mut socket = match self.open() {
            Ok(socket) => socket,
            Err(_) if self.closing.load(Ordering::SeqCst) => {
                log::debug!("Connection to {}:{} abandoned on close", self.host, self.port);
                return;
            }
            Err(e) => {
                log::error!("Connection to {}:{} failed: {}", self.host, self.port, e);
                self.emit(InboundAudioEvent::Error(e.to_string()).into());
                return;
            }
        };
        log::info!("Connected to {}:{}", self.host, self.port);

        if let Err(e) = socket.send(Message::text(self.setup.clone())) {
            self.emit(InboundAudioEvent::Error(format!("failed to send setup: {}", e)).into());
            return;
        }

        if let Err(reason) = self.pump(&mut socket) {
            self.emit(InboundAudioEvent::Error(reason).into());
        }

        let _ = socket.close(None);
        let _ = socket.flush();
        log::debug!("Transport thread finished");
    }

    fn open(&self) -> Result<Socket, SessionError> {
        let address = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| SessionError::Transport(format!("cannot resolve {}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| SessionError::Transport(format!("no address for {}", self.host)))?;

        let tcp = TcpStream::connect_timeout(&address, CONNECT_TIMEOUT)
            .map_err(|e| SessionError::Transport(format!("connect failed: {}", e)))?;
        let control = tcp
            .try_clone()
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        control
            .set_nonblocking(true)
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let deadline = Instant::now() + CONNECT_TIMEOUT;
        let mut attempt = tungstenite::client_tls_with_config(self.url.as_str(), tcp, None, None);
        let socket = loop {
            match attempt {
                Ok((socket, _response)) => break socket,
                Err(HandshakeError::Interrupted(mid)) => {
                    if self.closing.load(Ordering::SeqCst) {
                        return Err(SessionError::Transport("closed during handshake".into()));
                    }
                    if Instant::now() >= deadline {
                        return Err(SessionError::Transport("WebSocket handshake timed out".into()));
                    }
                    thread::sleep(HANDSHAKE_POLL);
                    attempt = mid.handshake();
                }
                Err(HandshakeError::Failure(e)) => {
                    return Err(SessionError::Transport(format!("WebSocket handshake failed: {}", e)));
                }
            }
        };

        // Blocking again, with short reads so the outbound queue keeps moving.
        control
            .set_nonblocking(false)
            .and_then(|()| control.set_read_timeout(Some(POLL_INTERVAL)))
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        Ok(socket)
    }

    /// Run until the session closes us, the server closes, or an error.
    fn pump(&self, socket: &mut Socket) -> Result<(), String> {
        loop {
            if self.closing.load(Ordering::SeqCst) {
                return Ok(());
            }

            loop {
                match self.outbound.try_recv() {
                    Ok(chunk) => {
                        let text = encode_realtime_input(chunk).map_err(|e| e.to_string())?;
                        socket
                            .send(Message::text(text))
                            .map_err(|e| format!("send failed: {}", e))?;
                    }
                    Err(flume::TryRecvError::Empty) => break,
                    // Sender dropped: the session is shutting down.
                    Err(flume::TryRecvError::Disconnected) => break,
                }
            }

            match socket.read() {
                Ok(message) => match classify(message, self.output_rate) {
                    Inbound::Dispatch(event) => {
                        self.emit(event);
                    }
                    Inbound::Fail(reason) => return Err(reason),
                    Inbound::Closed => {
                        self.emit(InboundAudioEvent::Closed.into());
                        return Ok(());
                    }
                    Inbound::Skip => {}
                },
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    self.emit(InboundAudioEvent::Closed.into());
                    return Ok(());
                }
                Err(e) => return Err(format!("receive failed: {}", e)),
            }
        }
    }

    /// Forward an event unless the session already asked us to close.
    fn emit(&self, event: TransportEvent) {
        if self.closing.load(Ordering::SeqCst) {
            return;
        }
        if !self.events.emit(event) {
            log::debug!("Session gone, transport event dropped");
        }
    }
}

fn classify(message: Message, default_rate: u32) -> Inbound {
    let text = match message {
        Message::Text(text) => text.as_str().to_owned(),
        Message::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(text) => text,
            Err(_) => return Inbound::Fail("binary frame is not UTF-8 JSON".into()),
        },
        Message::Close(frame) => {
            log::info!("Server closed the connection: {:?}", frame);
            return Inbound::Closed;
        }
        _ => return Inbound::Skip,
    };

    match parse_server_message(&text, default_rate) {
        Ok(ServerEvent::TurnComplete) => {
            log::debug!("Model turn complete");
            Inbound::Skip
        }
        Ok(ServerEvent::GoAway) => {
            log::info!("Server sent goAway, connection will close");
            Inbound::Skip
        }
        Ok(event) => event
            .into_transport_event()
            .map(Inbound::Dispatch)
            .unwrap_or(Inbound::Skip),
        Err(e) => Inbound::Fail(e.to_string()),
    }
}

/// Host and port of a `ws://` or `wss://` URL.
fn endpoint_address(url: &str) -> Result<(String, u16), SessionError> {
    let uri: Uri = url
        .parse()
        .map_err(|e| SessionError::ConfigurationFailed(format!("invalid endpoint {}: {}", url, e)))?;
    let default_port = match uri.scheme_str() {
        Some("wss") => 443,
        Some("ws") => 80,
        other => {
            return Err(SessionError::ConfigurationFailed(format!(
                "unsupported endpoint scheme: {:?}",
                other
            )))
        }
    };
    let host = uri
        .host()
        .ok_or_else(|| SessionError::ConfigurationFailed(format!("endpoint has no host: {}", url)))?;
    Ok((host.to_string(), uri.port_u16().unwrap_or(default_port)))
}
