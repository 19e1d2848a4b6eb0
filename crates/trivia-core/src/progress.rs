//! Locally owned game progress for one round.
//!
//! Seeded at round start, mutated only through [`GameProgressState::record_answer`]
//! (called by the tool-call bridge), read by everything else.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one scored question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question: String,
    pub correct_answer: String,
    pub user_was_correct: bool,
    pub hint_used: bool,
    /// Milliseconds between the question being presented and the score call.
    pub response_time_ms: u64,
}

/// Summary shown next to the host while a round is running.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStats {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub avg_response_time_ms: u64,
    pub total_questions_answered: usize,
}

/// Score, result log and streak counters of the running round.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameProgressState {
    pub score: i64,
    pub result_log: Vec<QuestionResult>,
    pub current_streak: u32,
    pub longest_streak: u32,
}

impl GameProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one acknowledged score call. The remote host owns the scoring rules,
    /// so the cumulative score is taken as reported.
    pub fn record_answer(
        &mut self,
        question: impl Into<String>,
        correct_answer: impl Into<String>,
        is_correct: bool,
        reported_score: i64,
        hint_used: bool,
        response_time: Duration,
    ) -> &QuestionResult {
        self.score = reported_score;
        if is_correct {
            self.current_streak += 1;
            self.longest_streak = self.longest_streak.max(self.current_streak);
        } else {
            self.current_streak = 0;
        }
        self.result_log.push(QuestionResult {
            question: question.into(),
            correct_answer: correct_answer.into(),
            user_was_correct: is_correct,
            hint_used,
            response_time_ms: u64::try_from(response_time.as_millis()).unwrap_or(u64::MAX),
        });
        &self.result_log[self.result_log.len() - 1]
    }

    pub fn answered(&self) -> usize {
        self.result_log.len()
    }

    pub fn live_stats(&self) -> LiveStats {
        let total = self.result_log.len();
        let avg = if total == 0 {
            0
        } else {
            self.result_log.iter().map(|r| r.response_time_ms).sum::<u64>() / total as u64
        };
        LiveStats {
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            avg_response_time_ms: avg,
            total_questions_answered: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_then_incorrect_resets_streak() {
        let mut state = GameProgressState::new();
        state.record_answer("Q1", "A1", true, 1, false, Duration::from_millis(1200));
        state.record_answer("Q2", "A2", false, 1, false, Duration::from_millis(800));

        assert_eq!(state.result_log.len(), 2);
        assert_eq!(state.score, 1);
        assert_eq!(state.current_streak, 0);
        assert_eq!(state.longest_streak, 1);
    }

    #[test]
    fn live_stats_average_response_time() {
        let mut state = GameProgressState::new();
        assert_eq!(state.live_stats(), LiveStats::default());

        state.record_answer("Q1", "A1", true, 1, true, Duration::from_millis(1000));
        state.record_answer("Q2", "A2", true, 2, false, Duration::from_millis(3000));
        let stats = state.live_stats();
        assert_eq!(stats.avg_response_time_ms, 2000);
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.total_questions_answered, 2);
        assert!(state.result_log[0].hint_used);
    }
}
