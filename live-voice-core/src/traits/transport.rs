use crate::models::audio_models::EncodedChunk;
use crate::models::config::SessionConfiguration;
use crate::models::error::SessionError;
use crate::models::events::{InboundAudioEvent, TransportEvent};
use crate::session::events::SessionEvent;

/// Sending half of the session's inbound channel, handed to a transport.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    tx: flume::Sender<SessionEvent>,
}

impl TransportEvents {
    pub fn new(tx: flume::Sender<SessionEvent>) -> Self {
        Self { tx }
    }

    /// Deliver an event to the session. Returns `false` once the session is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send(SessionEvent::Transport(event)).is_ok()
    }

    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Opened)
    }

    pub fn inbound(&self, event: InboundAudioEvent) -> bool {
        self.emit(TransportEvent::Inbound(event))
    }
}

/// Channels connecting one session to one transport connection.
///
/// `outbound` yields encoded capture chunks in submission order; the
/// connection must write them one at a time, in that order.
pub struct TransportLink {
    pub outbound: flume::Receiver<EncodedChunk>,
    pub events: TransportEvents,
}

/// Opens connections to the remote conversational endpoint.
///
/// `connect` must return promptly: the handshake completes in the
/// background and is reported through `TransportEvents::opened`.
pub trait Connector: Send + Sync + 'static {
    type Connection: TransportConnection;

    fn connect(
        &self,
        config: &SessionConfiguration,
        link: TransportLink,
    ) -> Result<Self::Connection, SessionError>;
}

/// A live connection owned by the session worker.
pub trait TransportConnection: Send + 'static {
    /// Close the connection. No events are delivered afterwards.
    fn close(&mut self);
}
