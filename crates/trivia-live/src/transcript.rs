//! Transcript tracking and end-of-show detection.
//!
//! Fragments arrive incrementally for both parties. They are accumulated per
//! turn and committed as one entry on turn completion or interruption. The
//! host's running turn text is matched against the end phrases, so a phrase
//! split across fragments is still found.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Host,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Host => write!(f, "host"),
        }
    }
}

/// One committed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TranscriptTracker {
    end_phrases: Vec<String>,
    entries: Vec<TranscriptEntry>,
    user_turn: String,
    host_turn: String,
    end_detected: bool,
}

impl TranscriptTracker {
    pub fn new(end_phrases: &[String]) -> Self {
        Self {
            end_phrases: end_phrases.iter().map(|p| p.to_lowercase()).collect(),
            entries: Vec::new(),
            user_turn: String::new(),
            host_turn: String::new(),
            end_detected: false,
        }
    }

    /// Add a fragment. Returns `true` the first time an end phrase shows up in
    /// the host's speech.
    pub fn append(&mut self, speaker: Speaker, fragment: &str) -> bool {
        match speaker {
            Speaker::User => {
                self.user_turn.push_str(fragment);
                false
            }
            Speaker::Host => {
                self.host_turn.push_str(fragment);
                if self.end_detected {
                    return false;
                }
                let lowered = self.host_turn.to_lowercase();
                if let Some(phrase) = self.end_phrases.iter().find(|p| lowered.contains(p.as_str())) {
                    info!("👋 End of show detected (\"{}\")", phrase);
                    self.end_detected = true;
                    return true;
                }
                false
            }
        }
    }

    /// Commit both running turns. Called on turn complete and on interruption.
    pub fn commit_turn(&mut self) {
        let now = Utc::now();
        for (speaker, buffer) in [
            (Speaker::User, &mut self.user_turn),
            (Speaker::Host, &mut self.host_turn),
        ] {
            let text = buffer.trim().to_string();
            buffer.clear();
            if !text.is_empty() {
                debug!(%speaker, len = text.len(), "turn committed");
                self.entries.push(TranscriptEntry {
                    speaker,
                    text,
                    timestamp: now,
                });
            }
        }
    }

    pub fn end_detected(&self) -> bool {
        self.end_detected
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn host_turn(&self) -> &str {
        &self.host_turn
    }
}
