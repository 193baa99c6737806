use super::error::SessionError;

/// Live session state machine.
///
/// State transitions:
/// ```text
/// idle → connecting → active → closing → closed
///            │           │                  │
///            └───────────┴──→ errored ──────┴──→ connecting (new session)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
    Errored(SessionError),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Connecting, active or closing: a session worker is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Connecting | Self::Active | Self::Closing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored(_))
    }

    /// Whether `start()` may open a new session from this state.
    pub fn can_start(&self) -> bool {
        self.is_idle() || self.is_terminal()
    }

    /// Whether `stop()` has anything to tear down.
    pub fn can_stop(&self) -> bool {
        matches!(self, Self::Connecting | Self::Active)
    }

    /// Short user-facing status line.
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Idle => "Standby",
            Self::Connecting => "Connecting...",
            Self::Active => "Listening...",
            Self::Closing => "Closing...",
            Self::Closed => "Closed",
            Self::Errored(_) => "Error occurred",
        }
    }
}
