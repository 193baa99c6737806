use live_voice_core::{SessionDelegate, SessionError, SessionState};

/// Prints the session status line to stderr as it changes.
pub struct ConsoleDelegate;

impl SessionDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        eprintln!("[{}]", state.status_text());
    }

    fn on_error(&self, error: &SessionError) {
        eprintln!("error: {}", error);
    }

    fn on_playback_interrupted(&self) {
        log::debug!("Agent playback interrupted");
    }
}
