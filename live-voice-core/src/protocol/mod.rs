//! JSON message contract of the remote conversational endpoint.

pub mod messages;

pub use messages::{
    encode_realtime_input, encode_setup, parse_server_message, ClientMessage, ServerEvent,
};
