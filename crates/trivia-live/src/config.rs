//! Immutable per-round session configuration.
//!
//! Built once from the round setup and the application config, then shared as
//! `Arc<SessionConfig>`. Every connect attempt, including reconnects, sends the
//! same value.

use crate::capture::DEFAULT_FRAME_SIZE;
use crate::error::{LiveError, LiveResult};
use crate::pcm::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::reconnect::ReconnectPolicy;
use std::time::Duration;
use trivia_core::{CoreConfig, RoundSetup, VoiceName, DEFAULT_LIVE_ENDPOINT, END_OF_SHOW_PHRASES};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint without the key query parameter.
    pub endpoint: String,
    pub api_key: String,
    /// Model name without the `models/` prefix.
    pub model: String,
    /// System instructions: persona, game context, questions and rules.
    pub instructions: String,
    pub voice: VoiceName,
    /// `functionDeclarations` array.
    pub tool_declarations: serde_json::Value,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub frame_size: usize,
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub handshake_timeout: Duration,
    /// Delay between end-of-show detection and round completion.
    pub finish_grace: Duration,
    /// Lower-case phrases that end the show when they appear in the host transcript.
    pub end_phrases: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_LIVE_ENDPOINT.to_string(),
            api_key: String::new(),
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            instructions: String::new(),
            voice: VoiceName::Puck,
            tool_declarations: serde_json::json!([]),
            input_transcription: true,
            output_transcription: true,
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            reconnect_max_attempts: 3,
            reconnect_base_delay: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(10),
            finish_grace: Duration::from_secs(3),
            end_phrases: END_OF_SHOW_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl SessionConfig {
    /// Configuration for one round: the host's persona and voice, every question
    /// embedded in the instructions, and the scoring tools.
    pub fn for_round(round: &RoundSetup, core: &CoreConfig, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: core.live_endpoint.clone(),
            api_key: api_key.into(),
            model: core.live_model.clone(),
            instructions: round.host_instructions(),
            voice: round.host.voice_name,
            tool_declarations: round.tool_declarations(),
            frame_size: core.frame_size as usize,
            reconnect_max_attempts: core.reconnect_max_attempts,
            reconnect_base_delay: core.reconnect_base_delay(),
            handshake_timeout: core.handshake_timeout(),
            finish_grace: core.finish_grace(),
            ..Self::default()
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.reconnect_max_attempts, self.reconnect_base_delay)
    }

    /// Full connect URL including the key.
    pub fn connect_url(&self) -> String {
        format!("{}?key={}", self.endpoint, self.api_key)
    }

    pub fn validate(&self) -> LiveResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(LiveError::Config("API key is missing".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(LiveError::Config("live model is empty".to_string()));
        }
        if self.frame_size == 0 {
            return Err(LiveError::Config("frame size must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_cadence() {
        let config = SessionConfig::default();
        assert_eq!(config.frame_size, 4096);
        assert_eq!(config.input_sample_rate, 16_000);
        assert_eq!(config.output_sample_rate, 24_000);
        assert_eq!(config.reconnect_policy().max_attempts(), 3);
        assert!(config.end_phrases.iter().any(|p| p == "goodbye"));
    }

    #[test]
    fn missing_key_fails_validation() {
        let config = SessionConfig::default();
        assert!(matches!(config.validate(), Err(LiveError::Config(_))));
        let config = SessionConfig {
            api_key: "k".into(),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.connect_url().ends_with("BidiGenerateContent?key=k"));
    }
}
