//! # live-voice-native
//!
//! Native backend for live-voice.
//!
//! Provides:
//! - `CpalInputDevice`: Microphone capture via cpal, converted to 16 kHz mono blocks
//! - `CpalOutputDevice`: Speaker playback via cpal with a frame-counting output clock
//! - `DeviceEnumerator`: Input/output device listing
//! - `WebSocketConnector`: Gemini Live transport over WebSocket (rustls)
//!
//! ## Usage
//! ```ignore
//! use live_voice_core::{LiveSession, SessionConfiguration};
//! use live_voice_native::{CpalInputDevice, CpalOutputDevice, WebSocketConnector};
//!
//! let mut session = LiveSession::new(
//!     CpalInputDevice::default_device(),
//!     CpalOutputDevice::default_device(),
//!     WebSocketConnector::new(),
//!     SessionConfiguration::default(),
//! );
//! session.start();
//! ```

pub mod cpal_input;
pub mod cpal_output;
pub mod device_enumerator;
pub mod sample_convert;
pub mod ws_transport;

pub use cpal_input::CpalInputDevice;
pub use cpal_output::CpalOutputDevice;
pub use device_enumerator::DeviceEnumerator;
pub use ws_transport::{WebSocketConnection, WebSocketConnector};
