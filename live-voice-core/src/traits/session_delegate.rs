use crate::models::error::SessionError;
use crate::models::state::SessionState;

/// Event delegate for live session notifications.
///
/// All methods are called from the session worker thread, not the UI thread.
/// Implementations should marshal to the UI thread if needed.
pub trait SessionDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &SessionState);

    /// Called when the session fails.
    fn on_error(&self, error: &SessionError);

    /// Called after agent audio was cut off by barge-in.
    fn on_playback_interrupted(&self) {}
}
