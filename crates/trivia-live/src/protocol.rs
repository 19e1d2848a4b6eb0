//! Wire messages of the `BidiGenerateContent` live API.
//!
//! Outbound messages are typed [`ClientMessage`] values. Inbound JSON is parsed
//! into [`ServerMessage`] and flattened into [`ServerEvent`]s in the order the
//! session must handle them: audio, interrupted, input transcription, output
//! transcription, tool calls, turn complete.

use crate::config::SessionConfig;
use crate::error::{LiveError, LiveResult};
use crate::pcm::{AudioFrame, OUTPUT_SAMPLE_RATE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Outbound
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
    ToolResponse(ToolResponse),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub tools: Vec<ToolSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Value,
}

/// Empty object that switches a transcription stream on.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranscriptionConfig {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub data: String,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub audio: Blob,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl ClientMessage {
    /// The one-time configuration payload sent on every connect.
    pub fn setup(config: &SessionConfig) -> Self {
        let model = if config.model.starts_with("models/") {
            config.model.clone()
        } else {
            format!("models/{}", config.model)
        };
        ClientMessage::Setup(Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice.as_str().to_string(),
                        },
                    },
                },
            },
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(config.instructions.clone()),
                    inline_data: None,
                }],
            },
            tools: vec![ToolSet {
                function_declarations: config.tool_declarations.clone(),
            }],
            input_audio_transcription: config.input_transcription.then(TranscriptionConfig::default),
            output_audio_transcription: config.output_transcription.then(TranscriptionConfig::default),
        })
    }

    pub fn audio(frame: &AudioFrame) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: Blob {
                data: frame.to_base64(),
                mime_type: frame.mime_type(),
            },
        })
    }

    /// A complete user turn carrying text (typed answer or hint request).
    pub fn text_turn(text: impl Into<String>) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(text.into()),
                    inline_data: None,
                }],
            }],
            turn_complete: true,
        })
    }

    pub fn tool_response(responses: Vec<FunctionResponse>) -> Self {
        ClientMessage::ToolResponse(ToolResponse {
            function_responses: responses,
        })
    }

    pub fn to_json(&self) -> LiveResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Inbound
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

/// One thing the session has to react to, in processing order.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SetupComplete,
    Audio { data: String, sample_rate: u32 },
    Interrupted,
    InputTranscript(String),
    OutputTranscript(String),
    ToolCall(FunctionCall),
    ToolCallCancellation(Vec<String>),
    TurnComplete,
    GoAway { time_left: Option<String> },
    Error(String),
}

impl ServerMessage {
    pub fn parse(text: &str) -> LiveResult<Self> {
        serde_json::from_str(text).map_err(|e| LiveError::Protocol(format!("invalid server message: {}", e)))
    }

    pub fn parse_bytes(bytes: &[u8]) -> LiveResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| LiveError::Protocol(format!("invalid server message: {}", e)))
    }

    pub fn into_events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        if self.setup_complete.is_some() {
            events.push(ServerEvent::SetupComplete);
        }
        if let Some(error) = self.error {
            events.push(ServerEvent::Error(error.to_string()));
        }

        let mut turn_complete = false;
        if let Some(content) = self.server_content {
            if let Some(turn) = content.model_turn {
                for blob in turn.parts.into_iter().filter_map(|p| p.inline_data) {
                    if blob.mime_type.is_empty() || blob.mime_type.starts_with("audio/") {
                        let sample_rate = sample_rate_from_mime(&blob.mime_type).unwrap_or(OUTPUT_SAMPLE_RATE);
                        events.push(ServerEvent::Audio {
                            data: blob.data,
                            sample_rate,
                        });
                    }
                }
            }
            if content.interrupted {
                events.push(ServerEvent::Interrupted);
            }
            if let Some(text) = content.input_transcription.and_then(|t| t.text) {
                if !text.is_empty() {
                    events.push(ServerEvent::InputTranscript(text));
                }
            }
            if let Some(text) = content.output_transcription.and_then(|t| t.text) {
                if !text.is_empty() {
                    events.push(ServerEvent::OutputTranscript(text));
                }
            }
            turn_complete = content.turn_complete;
        }

        if let Some(call) = self.tool_call {
            events.extend(call.function_calls.into_iter().map(ServerEvent::ToolCall));
        }
        if let Some(cancel) = self.tool_call_cancellation {
            events.push(ServerEvent::ToolCallCancellation(cancel.ids));
        }
        if turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
        if let Some(go_away) = self.go_away {
            events.push(ServerEvent::GoAway {
                time_left: go_away.time_left,
            });
        }
        events
    }
}

/// `audio/pcm;rate=24000` -> `Some(24000)`
pub fn sample_rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|r| r.trim().parse().ok())
}
