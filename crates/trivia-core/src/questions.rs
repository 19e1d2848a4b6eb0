//! Trivia questions, difficulty levels and the topic catalogue.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of answer options every question must carry.
pub const OPTIONS_PER_QUESTION: usize = 4;

/// Themed categories offered at round setup.
pub const TOPICS: &[&str] = &[
    "World History",
    "Science and Nature",
    "Movies and TV",
    "Music",
    "Sports",
    "Space Exploration",
    "90s Pop Culture",
    "Video Game History",
];

/// Difficulty tier requested from the question source and announced by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
        }
    }

    /// What the question source should aim for at this tier.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Easy => "Common knowledge, widely known facts.",
            Self::Medium => "Requires some specific knowledge, not trivial for everyone.",
            Self::Hard => "Challenging, niche details, expert-level knowledge.",
        }
    }

    /// Parse a user-supplied label (case-insensitive).
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriviaQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl TriviaQuestion {
    /// Check the shape the host instructions rely on.
    pub fn validate(&self) -> CoreResult<()> {
        if self.question.trim().is_empty() {
            return Err(CoreError::MalformedQuestions("question text is empty".to_string()));
        }
        if self.answer.trim().is_empty() {
            return Err(CoreError::MalformedQuestions(format!(
                "question {:?} has no answer",
                self.question
            )));
        }
        if self.options.len() != OPTIONS_PER_QUESTION {
            return Err(CoreError::MalformedQuestions(format!(
                "question {:?} has {} options, expected {}",
                self.question,
                self.options.len(),
                OPTIONS_PER_QUESTION
            )));
        }
        Ok(())
    }

    /// Single line used when embedding the question into host instructions.
    pub fn instruction_line(&self, number: usize) -> String {
        format!(
            "{}. Q: {} | Options: {} | A: {} | Explain: {}",
            number,
            self.question,
            self.options.join(", "),
            self.answer,
            self.explanation
        )
    }
}

/// Validate a whole question set. An empty set is fatal to starting a round.
pub fn validate_question_set(topic: &str, questions: &[TriviaQuestion]) -> CoreResult<()> {
    if questions.is_empty() {
        return Err(CoreError::NoQuestions {
            topic: topic.to_string(),
        });
    }
    questions.iter().try_for_each(TriviaQuestion::validate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TriviaQuestion {
        TriviaQuestion {
            question: "How many players are on a soccer team on the field?".to_string(),
            options: vec!["9".into(), "10".into(), "11".into(), "12".into()],
            answer: "11".to_string(),
            explanation: "Ten outfield players plus a goalkeeper.".to_string(),
            source: None,
        }
    }

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!(Difficulty::parse("easy"), Some(Difficulty::Easy));
        assert_eq!(Difficulty::parse(" HARD "), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse("brutal"), None);
        assert_eq!(Difficulty::Medium.to_string(), "Medium");
    }

    #[test]
    fn question_with_three_options_is_rejected() {
        let mut q = sample();
        q.options.pop();
        assert!(matches!(q.validate(), Err(CoreError::MalformedQuestions(_))));
    }

    #[test]
    fn empty_set_is_fatal() {
        let err = validate_question_set("Sports", &[]).unwrap_err();
        assert!(matches!(err, CoreError::NoQuestions { .. }));
        assert!(validate_question_set("Sports", &[sample()]).is_ok());
    }

    #[test]
    fn instruction_line_embeds_answer_and_options() {
        let line = sample().instruction_line(1);
        assert!(line.starts_with("1. Q: How many"));
        assert!(line.contains("Options: 9, 10, 11, 12"));
        assert!(line.contains("A: 11"));
    }
}
