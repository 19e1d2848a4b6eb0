//! Error types for the trivia game domain

use thiserror::Error;

/// Result type alias for domain operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while preparing a round or touching local persistence
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Question source returned no questions for topic {topic:?}")]
    NoQuestions { topic: String },

    #[error("Malformed question data: {0}")]
    MalformedQuestions(String),

    #[error("Question source request failed: {0}")]
    QuestionSource(String),

    #[error("Unknown host personality: {0}")]
    UnknownHost(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
