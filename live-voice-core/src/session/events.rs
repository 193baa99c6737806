use crate::models::events::TransportEvent;

/// Messages consumed by the session worker, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Transport(TransportEvent),
    /// The output device finished playing a unit naturally.
    PlaybackFinished(u64),
    /// Hard cancellation requested through `LiveSession::stop`.
    Shutdown,
}
