/// One inbound event from the transport, consumed once by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundAudioEvent {
    /// Raw PCM16LE bytes (transport envelope already removed).
    AudioChunk { data: Vec<u8>, sample_rate: u32 },
    /// The user started speaking over the agent.
    Interrupted,
    Error(String),
    Closed,
}

/// Everything a transport reports back to the session worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The remote session accepted the setup and is ready for input.
    Opened,
    Inbound(InboundAudioEvent),
}

impl From<InboundAudioEvent> for TransportEvent {
    fn from(event: InboundAudioEvent) -> Self {
        Self::Inbound(event)
    }
}
