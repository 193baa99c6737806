use serde::{Deserialize, Serialize};

use crate::models::audio_models::EncodedChunk;
use crate::models::config::SessionConfiguration;
use crate::models::error::SessionError;
use crate::models::events::{InboundAudioEvent, TransportEvent};
use crate::processing::frame_codec;

const AUDIO_MODALITY: &str = "AUDIO";

/// Messages sent by the client. Serializes as `{"setup": {...}}` or
/// `{"realtimeInput": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

impl ClientMessage {
    /// Session-open request: audio responses, fixed voice, fixed persona.
    pub fn setup(config: &SessionConfiguration) -> Self {
        Self::Setup(Setup {
            model: config.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec![AUDIO_MODALITY.to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: config.system_instruction.clone(),
                }],
            },
        })
    }

    pub fn realtime_input(chunk: EncodedChunk) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: chunk.mime_type,
                data: chunk.data,
            }],
        })
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(self)
            .map_err(|e| SessionError::Protocol(format!("failed to serialize message: {}", e)))
    }
}

pub fn encode_setup(config: &SessionConfiguration) -> Result<String, SessionError> {
    ClientMessage::setup(config).to_json()
}

pub fn encode_realtime_input(chunk: EncodedChunk) -> Result<String, SessionError> {
    ClientMessage::realtime_input(chunk).to_json()
}

// -- Server messages --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    go_away: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

/// A server message reduced to the one thing the session cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Setup accepted; the session may start streaming input.
    SetupComplete,
    /// PCM16LE audio, all inline parts of one message concatenated.
    Audio { data: Vec<u8>, sample_rate: u32 },
    Interrupted,
    TurnComplete,
    /// The server announced it will close the connection soon.
    GoAway,
    Ignored,
}

impl ServerEvent {
    /// The transport event to dispatch, if this server event produces one.
    pub fn into_transport_event(self) -> Option<TransportEvent> {
        match self {
            Self::SetupComplete => Some(TransportEvent::Opened),
            Self::Audio { data, sample_rate } => {
                Some(InboundAudioEvent::AudioChunk { data, sample_rate }.into())
            }
            Self::Interrupted => Some(InboundAudioEvent::Interrupted.into()),
            Self::TurnComplete | Self::GoAway | Self::Ignored => None,
        }
    }
}

/// Parse one server JSON message.
///
/// `default_rate` applies when an audio part does not declare its rate.
/// An interruption marker wins over audio carried in the same message.
pub fn parse_server_message(text: &str, default_rate: u32) -> Result<ServerEvent, SessionError> {
    let message: ServerMessage = serde_json::from_str(text)
        .map_err(|e| SessionError::Protocol(format!("invalid server message: {}", e)))?;

    if message.setup_complete.is_some() {
        return Ok(ServerEvent::SetupComplete);
    }
    if message.go_away.is_some() {
        return Ok(ServerEvent::GoAway);
    }

    let Some(content) = message.server_content else {
        return Ok(ServerEvent::Ignored);
    };
    if content.interrupted {
        return Ok(ServerEvent::Interrupted);
    }

    let mut audio = Vec::new();
    let mut sample_rate = None;
    for part in content.model_turn.map(|t| t.parts).unwrap_or_default() {
        let Some(inline) = part.inline_data else {
            continue;
        };
        if sample_rate.is_none() {
            sample_rate = inline.mime_type.as_deref().and_then(rate_from_mime_type);
        }
        audio.extend(frame_codec::unwrap_envelope(&inline.data)?);
    }

    if !audio.is_empty() {
        return Ok(ServerEvent::Audio {
            data: audio,
            sample_rate: sample_rate.unwrap_or(default_rate),
        });
    }
    if content.turn_complete {
        return Ok(ServerEvent::TurnComplete);
    }
    Ok(ServerEvent::Ignored)
}

/// Extract `rate` from a MIME tag such as `audio/pcm;rate=24000`.
fn rate_from_mime_type(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}
