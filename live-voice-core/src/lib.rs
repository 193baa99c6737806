//! # live-voice-core
//!
//! Platform-agnostic core of a live voice conversation client.
//!
//! Provides the PCM codec, the capture pipeline, the transport contract and
//! wire messages, gapless playback scheduling, and session orchestration.
//! Platform backends (cpal devices, WebSocket transport) implement the
//! `InputDevice`, `OutputDevice` and `Connector` traits and plug into the
//! generic `LiveSession`.
//!
//! ## Architecture
//!
//! ```text
//! live-voice-core (this crate)
//! ├── traits/       ← InputDevice, OutputDevice, Connector, SessionDelegate
//! ├── models/       ← SessionError, SessionState, SessionConfiguration, AudioFrame, events
//! ├── processing/   ← frame codec, Resampler, BlockBuffer, PlayoutTimeline
//! ├── protocol/     ← setup / realtime input / server message JSON
//! └── session/      ← LiveSession, CapturePipeline, PlaybackScheduler
//! ```

pub mod models;
pub mod processing;
pub mod protocol;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    AudioDeviceInfo, AudioFrame, DeviceDirection, EncodedChunk, PlaybackUnit, SessionDiagnostics,
};
pub use models::config::SessionConfiguration;
pub use models::error::SessionError;
pub use models::events::{InboundAudioEvent, TransportEvent};
pub use models::state::SessionState;
pub use processing::block_buffer::BlockBuffer;
pub use processing::playout_timeline::PlayoutTimeline;
pub use processing::resampler::Resampler;
pub use session::controller::LiveSession;
pub use session::scheduler::{PlaybackScheduler, PlaybackWindow};
pub use traits::input_device::{CaptureCallback, InputDevice};
pub use traits::output_device::{OutputDevice, PlaybackFinishedCallback};
pub use traits::session_delegate::SessionDelegate;
pub use traits::transport::{Connector, TransportConnection, TransportEvents, TransportLink};
