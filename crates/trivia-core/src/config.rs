//! Application configuration loaded from TOML and environment.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | storage_path | ./data | Base directory for the Sled store. |
//! | api_base | https://generativelanguage.googleapis.com/v1beta | REST base for question generation. |
//! | question_model | gemini-3-flash-preview | Model used to generate questions. |
//! | live_model | gemini-2.5-flash-native-audio-preview-12-2025 | Model hosting the live round. |
//! | live_endpoint | wss://…/BidiGenerateContent | Live WebSocket endpoint. |
//! | question_count | 5 | Questions per round. |
//! | frame_size | 4096 | Microphone samples per outbound frame. |
//! | reconnect_max_attempts | 3 | Reconnect attempts before the round is abandoned. |
//! | reconnect_base_delay_ms | 1000 | Delay unit; attempt n waits n × base. |
//! | handshake_timeout_ms | 10000 | Wait for `setupComplete`. |
//! | finish_grace_ms | 3000 | Trailing audio allowance after the show ends. |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub storage_path: String,
    pub api_base: String,
    pub question_model: String,
    pub live_model: String,
    pub live_endpoint: String,
    pub question_count: u32,
    pub frame_size: u32,
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub handshake_timeout_ms: u64,
    pub finish_grace_ms: u64,
}

impl CoreConfig {
    /// Load config from file and environment. Precedence: env `TRIVIA__*` > `TRIVIA_CONFIG` file
    /// (default `config/trivia`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("TRIVIA_CONFIG").unwrap_or_else(|_| "config/trivia".to_string());
        let builder = config::Config::builder()
            .set_default("storage_path", "./data")?
            .set_default("api_base", "https://generativelanguage.googleapis.com/v1beta")?
            .set_default("question_model", "gemini-3-flash-preview")?
            .set_default("live_model", "gemini-2.5-flash-native-audio-preview-12-2025")?
            .set_default("live_endpoint", DEFAULT_LIVE_ENDPOINT)?
            .set_default("question_count", 5_i64)?
            .set_default("frame_size", 4096_i64)?
            .set_default("reconnect_max_attempts", 3_i64)?
            .set_default("reconnect_base_delay_ms", 1000_i64)?
            .set_default("handshake_timeout_ms", 10_000_i64)?
            .set_default("finish_grace_ms", 3000_i64)?;

        let path = Path::new(&config_path);
        let with_toml = path.with_extension("toml");
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else if with_toml.exists() {
            builder.add_source(config::File::from(with_toml.as_path()))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("TRIVIA").separator("__"))
            .build()?;

        built.try_deserialize()
    }

    /// API key from `GEMINI_API_KEY`, falling back to `API_KEY`. Empty values count as missing.
    pub fn api_key() -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    pub fn store_path(&self) -> PathBuf {
        Path::new(&self.storage_path).join("trivia_store")
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn finish_grace(&self) -> Duration {
        Duration::from_millis(self.finish_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_file() {
        std::env::set_var("TRIVIA_CONFIG", "/nonexistent/trivia-config");
        let config = CoreConfig::load().unwrap();
        assert_eq!(config.frame_size, 4096);
        assert_eq!(config.reconnect_max_attempts, 3);
        assert_eq!(config.question_count, 5);
        assert_eq!(config.reconnect_base_delay(), Duration::from_secs(1));
        assert!(config.live_endpoint.ends_with("BidiGenerateContent"));
        assert!(config.store_path().ends_with("trivia_store"));
    }
}
