use thiserror::Error;

/// Errors that can occur while running a live voice session.
///
/// These stay inside the session: the controller turns them into
/// `SessionState::Errored` and a status string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}
