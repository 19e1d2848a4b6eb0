//! Round setup and the host instructions replayed on every connect.

use crate::error::CoreResult;
use crate::hosts::HostPersonality;
use crate::questions::{validate_question_set, Difficulty, TriviaQuestion};
use serde::{Deserialize, Serialize};

/// Name of the scoring function the host calls after every answer.
pub const UPDATE_SCORE_FN: &str = "updateScore";

/// Name of the structured end-of-round function.
pub const END_SHOW_FN: &str = "endShow";

/// Phrases the host is told to use when signing off. Also used by the transcript heuristic.
pub const END_OF_SHOW_PHRASES: &[&str] = &["show has ended", "goodbye"];

/// Everything needed to run one round. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSetup {
    pub topic: String,
    pub difficulty: Difficulty,
    pub host: HostPersonality,
    pub questions: Vec<TriviaQuestion>,
}

impl RoundSetup {
    /// Validates the question set before anything audio-related is touched.
    pub fn new(
        topic: impl Into<String>,
        difficulty: Difficulty,
        host: HostPersonality,
        questions: Vec<TriviaQuestion>,
    ) -> CoreResult<Self> {
        let topic = topic.into();
        validate_question_set(&topic, &questions)?;
        Ok(Self {
            topic,
            difficulty,
            host,
            questions,
        })
    }

    /// Free-text system instructions: persona, game context, full question set and rules.
    pub fn host_instructions(&self) -> String {
        let count = self.questions.len();
        let tone = match self.difficulty {
            Difficulty::Hard => "The player chose Hard: sound impressed, or warningly challenging.",
            Difficulty::Easy => "The player chose Easy: keep it light and fun.",
            Difficulty::Medium => "The player chose Medium: keep a lively, confident pace.",
        };
        let questions = self
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| q.instruction_line(i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{prompt}\n\
             \n\
             GAME CONTEXT:\n\
             Topic: \"{topic}\"\n\
             Difficulty: \"{difficulty}\"\n\
             You are hosting a {count}-question trivia challenge.\n\
             Acknowledge the chosen difficulty level ({difficulty}) in your introduction. {tone}\n\
             \n\
             QUESTIONS TO ASK:\n\
             {questions}\n\
             \n\
             RULES:\n\
             1. Welcome the player warmly in your persona.\n\
             2. Ask questions one by one, in order.\n\
             3. Listen for the user's answer (they might say A, B, C, D or the text of the answer).\n\
             4. Provide immediate, character-appropriate feedback (correct/incorrect) and share the short explanation provided.\n\
             5. After judging every answer, call `{update}` with isCorrect and the cumulative currentScore. Never skip this call.\n\
             6. If the player asks for a hint, give a subtle clue without revealing the answer.\n\
             7. After the last question, announce a grand character-filled summary with the final score, \
             then say \"the show has ended\" and \"goodbye\", and call `{end}`.\n\
             8. If the conversation is restored after a connection drop, continue with the first question that has not been scored yet.\n\
             9. Stay in character consistently!",
            prompt = self.host.prompt,
            topic = self.topic,
            difficulty = self.difficulty,
            count = count,
            tone = tone,
            questions = questions,
            update = UPDATE_SCORE_FN,
            end = END_SHOW_FN,
        )
    }

    /// Function declarations sent in the connect handshake.
    pub fn tool_declarations(&self) -> serde_json::Value {
        serde_json::json!([
            {
                "name": UPDATE_SCORE_FN,
                "description": "Record the player's answer to the current question and the cumulative score.",
                "parameters": {
                    "type": "OBJECT",
                    "properties": {
                        "isCorrect": {
                            "type": "BOOLEAN",
                            "description": "Whether the player's answer was correct."
                        },
                        "currentScore": {
                            "type": "INTEGER",
                            "description": "The player's total score after this answer."
                        }
                    },
                    "required": ["isCorrect", "currentScore"]
                }
            },
            {
                "name": END_SHOW_FN,
                "description": "Signal that the final summary has been delivered and the show is over."
            }
        ])
    }

    /// Text turn sent after a reconnect so the host resumes at the right question.
    pub fn resume_prompt(&self, answered: usize, score: i64) -> String {
        if answered >= self.questions.len() {
            format!(
                "[Connection restored] All {} questions have been answered. Final score: {}. \
                 Deliver the closing summary now.",
                self.questions.len(),
                score
            )
        } else {
            format!(
                "[Connection restored] {} of {} questions have been answered. Current score: {}. \
                 Continue with question {} and do not repeat earlier questions.",
                answered,
                self.questions.len(),
                score,
                answered + 1
            )
        }
    }
}
