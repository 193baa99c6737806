use url::Url;

use super::audio_models::{CAPTURE_BLOCK_SIZE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};

/// Bidirectional streaming endpoint of the Gemini Live API.
pub const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";

pub const DEFAULT_VOICE: &str = "Zephyr";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly life tracker assistant called Alo. \
Talk to the user naturally about their day, habits, and productivity.";

/// Configuration for a live voice session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfiguration {
    /// WebSocket URL of the conversational endpoint (`ws://` or `wss://`).
    pub endpoint: String,

    /// API key appended as the `key` query parameter, if set.
    pub api_key: Option<String>,

    /// Model identifier sent in the setup message.
    pub model: String,

    /// Prebuilt voice used for the spoken response.
    pub voice_name: String,

    /// Persona text sent as the system instruction.
    pub system_instruction: String,

    /// Capture rate in Hz (default: 16000).
    pub input_sample_rate: u32,

    /// Playback rate in Hz of the streamed response (default: 24000).
    pub output_sample_rate: u32,

    /// Samples per capture block (default: 4096).
    pub capture_block_size: usize,
}

impl SessionConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.input_sample_rate == 0 {
            return Err("input sample rate must be positive".into());
        }
        if self.output_sample_rate == 0 {
            return Err("output sample rate must be positive".into());
        }
        if self.capture_block_size == 0 {
            return Err("capture block size must be positive".into());
        }
        if self.model.trim().is_empty() {
            return Err("model must not be empty".into());
        }
        if self.voice_name.trim().is_empty() {
            return Err("voice name must not be empty".into());
        }
        if !(self.endpoint.starts_with("wss://") || self.endpoint.starts_with("ws://")) {
            return Err(format!("unsupported endpoint scheme: {}", self.endpoint));
        }
        Url::parse(&self.endpoint).map_err(|e| format!("invalid endpoint {}: {}", self.endpoint, e))?;
        Ok(())
    }

    /// Endpoint URL with the API key attached as a percent-encoded
    /// `key` query parameter.
    pub fn connection_url(&self) -> String {
        let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return self.endpoint.clone();
        };
        match Url::parse(&self.endpoint) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("key", key);
                url.into()
            }
            // validate() rejects this before any connection is made.
            Err(_) => self.endpoint.clone(),
        }
    }
}

impl Default for SessionConfiguration {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            capture_block_size: CAPTURE_BLOCK_SIZE,
        }
    }
}
