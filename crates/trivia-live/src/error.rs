//! Error types for the live audio session

use thiserror::Error;

/// Result type alias for live session operations
pub type LiveResult<T> = Result<T, LiveError>;

/// Errors that can occur while running a live round
#[derive(Error, Debug)]
pub enum LiveError {
    /// The remote service refused the configuration. Fatal, never retried.
    #[error("Configuration rejected by remote service: {0}")]
    ConfigRejected(String),

    /// The duplex connection failed or dropped. Routed through the reconnect policy.
    #[error("Transient transport error: {0}")]
    TransientTransport(String),

    /// Reconnect attempts exhausted; the round is abandoned.
    #[error("Connection lost after {attempts} reconnect attempts")]
    ConnectionLost { attempts: u32 },

    /// A received audio chunk could not be decoded. The chunk is dropped.
    #[error("Malformed audio data: {0}")]
    MalformedAudioData(String),

    /// A tool call carried missing or mistyped arguments. Acknowledged with a failure result.
    #[error("Invalid tool arguments: {0}")]
    InvalidToolArgs(String),

    /// No usable microphone at round start. Raised before any network connection.
    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LiveError {
    /// Errors the reconnect policy may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, LiveError::TransientTransport(_))
    }

    /// Errors that end the round and force full teardown.
    pub fn is_round_terminating(&self) -> bool {
        matches!(
            self,
            LiveError::ConfigRejected(_)
                | LiveError::ConnectionLost { .. }
                | LiveError::MicrophoneUnavailable(_)
                | LiveError::AudioDevice(_)
                | LiveError::Playback(_)
                | LiveError::Config(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LiveError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        LiveError::TransientTransport(err.to_string())
    }
}

impl From<cpal::DevicesError> for LiveError {
    fn from(err: cpal::DevicesError) -> Self {
        LiveError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for LiveError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        LiveError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for LiveError {
    fn from(err: cpal::BuildStreamError) -> Self {
        LiveError::AudioDevice(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for LiveError {
    fn from(err: cpal::PlayStreamError) -> Self {
        LiveError::AudioDevice(err.to_string())
    }
}
