//! trivia-core: game domain shared by the live session and the front end.
//!
//! Questions and topics, host personalities, round setup (host instructions and
//! tool declarations), the per-round progress state, question generation and
//! local persistence.

mod config;
mod error;
mod hosts;
mod progress;
mod question_source;
mod questions;
mod round;
mod storage;

pub use config::{CoreConfig, DEFAULT_LIVE_ENDPOINT};
pub use error::{CoreError, CoreResult};
pub use hosts::{find_host, preset_hosts, HostPersonality, VoiceName};
pub use progress::{GameProgressState, LiveStats, QuestionResult};
pub use question_source::{parse_questions, GeminiQuestionSource, QuestionSource};
pub use questions::{validate_question_set, Difficulty, TriviaQuestion, OPTIONS_PER_QUESTION, TOPICS};
pub use round::{RoundSetup, END_OF_SHOW_PHRASES, END_SHOW_FN, UPDATE_SCORE_FN};
pub use storage::{
    AppSettings, GameHistoryEntry, GameStore, LeaderboardEntry, LEADERBOARD_SIZE,
};
