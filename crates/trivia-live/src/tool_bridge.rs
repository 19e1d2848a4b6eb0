//! Tool-call bridge: the only writer of the round's [`GameProgressState`].
//!
//! Every inbound function call gets exactly one response carrying its id, even
//! when the arguments are invalid or the function is unknown. A score call is
//! applied at most once per id.

use crate::error::{LiveError, LiveResult};
use crate::protocol::{FunctionCall, FunctionResponse};
use serde_json::{json, Value};
use std::collections::HashSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use trivia_core::{GameProgressState, QuestionResult, TriviaQuestion, END_SHOW_FN, UPDATE_SCORE_FN};

/// Validated `updateScore` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateScoreArgs {
    pub is_correct: bool,
    pub current_score: i64,
}

impl UpdateScoreArgs {
    /// Requires a boolean `isCorrect` and an integer `currentScore`.
    pub fn from_args(args: &Value) -> LiveResult<Self> {
        let is_correct = match args.get("isCorrect") {
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(LiveError::InvalidToolArgs(format!(
                    "isCorrect must be a boolean, got {}",
                    other
                )))
            }
            None => return Err(LiveError::InvalidToolArgs("isCorrect is missing".to_string())),
        };
        let current_score = match args.get("currentScore") {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .ok_or_else(|| {
                    LiveError::InvalidToolArgs(format!("currentScore must be an integer, got {}", n))
                })?,
            Some(other) => {
                return Err(LiveError::InvalidToolArgs(format!(
                    "currentScore must be an integer, got {}",
                    other
                )))
            }
            None => return Err(LiveError::InvalidToolArgs("currentScore is missing".to_string())),
        };
        Ok(Self {
            is_correct,
            current_score,
        })
    }
}

/// What a handled call did to the round.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// A result was appended to the log.
    ScoreRecorded(QuestionResult),
    /// The host signalled the end of the show.
    EndShow,
    /// Invalid arguments; acknowledged with a failure, state untouched.
    Rejected(String),
    /// Unknown function; acknowledged with a failure.
    Unknown(String),
    /// Id already acknowledged; nothing sent, nothing applied.
    Duplicate,
}

pub struct ToolCallBridge {
    questions: Vec<TriviaQuestion>,
    acknowledged: HashSet<String>,
    hint_pending: bool,
    question_presented_at: Instant,
}

impl ToolCallBridge {
    pub fn new(questions: Vec<TriviaQuestion>) -> Self {
        Self {
            questions,
            acknowledged: HashSet::new(),
            hint_pending: false,
            question_presented_at: Instant::now(),
        }
    }

    /// Start the response-latency clock for the current question.
    pub fn mark_question_presented(&mut self, at: Instant) {
        self.question_presented_at = at;
    }

    /// Flag the current question as hinted. Returns `false` if it already was.
    pub fn mark_hint_used(&mut self) -> bool {
        !std::mem::replace(&mut self.hint_pending, true)
    }

    pub fn hint_pending(&self) -> bool {
        self.hint_pending
    }

    pub fn acknowledged_count(&self) -> usize {
        self.acknowledged.len()
    }

    /// Apply one call and build its acknowledgement. `None` means the id was
    /// already answered.
    pub fn handle(
        &mut self,
        call: &FunctionCall,
        state: &mut GameProgressState,
        now: Instant,
    ) -> (Option<FunctionResponse>, ToolOutcome) {
        if !call.id.is_empty() && !self.acknowledged.insert(call.id.clone()) {
            warn!(call_id = %call.id, "duplicate tool call ignored");
            return (None, ToolOutcome::Duplicate);
        }

        let (response, outcome) = match call.name.as_str() {
            UPDATE_SCORE_FN => match UpdateScoreArgs::from_args(&call.args) {
                Ok(args) => {
                    let record = self.apply_score(args, state, now);
                    (
                        json!({ "ok": true, "score": state.score, "streak": state.current_streak }),
                        ToolOutcome::ScoreRecorded(record),
                    )
                }
                Err(e) => {
                    warn!(call_id = %call.id, "rejecting score call: {}", e);
                    (
                        json!({ "ok": false, "error": e.to_string() }),
                        ToolOutcome::Rejected(e.to_string()),
                    )
                }
            },
            END_SHOW_FN => {
                info!("🎬 Host called {}", END_SHOW_FN);
                (json!({ "ok": true }), ToolOutcome::EndShow)
            }
            other => {
                warn!(call_id = %call.id, function = other, "unknown tool call");
                (
                    json!({ "ok": false, "error": "unknown function" }),
                    ToolOutcome::Unknown(other.to_string()),
                )
            }
        };

        let ack = FunctionResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            response,
        };
        (Some(ack), outcome)
    }

    /// Already-applied calls are kept; the service only learns they no longer matter.
    pub fn cancel(&mut self, ids: &[String]) {
        for id in ids {
            if self.acknowledged.contains(id) {
                debug!(call_id = %id, "cancellation for an applied call, keeping result");
            } else {
                debug!(call_id = %id, "cancellation for an unknown call");
            }
        }
    }

    fn apply_score(&mut self, args: UpdateScoreArgs, state: &mut GameProgressState, now: Instant) -> QuestionResult {
        let index = state.answered();
        let (question, answer) = self
            .questions
            .get(index)
            .map(|q| (q.question.clone(), q.answer.clone()))
            .unwrap_or_else(|| (format!("Question {}", index + 1), String::new()));
        let hint_used = std::mem::take(&mut self.hint_pending);
        let latency = now.saturating_duration_since(self.question_presented_at);

        let record = state
            .record_answer(question, answer, args.is_correct, args.current_score, hint_used, latency)
            .clone();
        self.question_presented_at = now;
        info!(
            "📝 Question {} scored: {} (score {}, streak {})",
            index + 1,
            if args.is_correct { "correct" } else { "incorrect" },
            state.score,
            state.current_streak
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn questions() -> Vec<TriviaQuestion> {
        (1..=5)
            .map(|i| TriviaQuestion {
                question: format!("Q{}", i),
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                answer: format!("A{}", i),
                explanation: String::new(),
                source: None,
            })
            .collect()
    }

    fn call(id: &str, name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn sports_easy_scenario() {
        let mut bridge = ToolCallBridge::new(questions());
        let mut state = GameProgressState::new();
        let now = Instant::now();

        let (ack1, _) = bridge.handle(
            &call("c1", UPDATE_SCORE_FN, json!({"isCorrect": true, "currentScore": 1})),
            &mut state,
            now,
        );
        let (ack2, _) = bridge.handle(
            &call("c2", UPDATE_SCORE_FN, json!({"isCorrect": false, "currentScore": 1})),
            &mut state,
            now,
        );

        assert_eq!(state.result_log.len(), 2);
        assert_eq!(state.score, 1);
        assert_eq!(state.current_streak, 0);
        assert_eq!(state.longest_streak, 1);
        assert_eq!(state.result_log[0].question, "Q1");
        assert_eq!(state.result_log[1].correct_answer, "A2");
        assert_eq!(ack1.unwrap().response, json!({"ok": true, "score": 1, "streak": 1}));
        assert_eq!(ack2.unwrap().id, "c2");
    }

    #[test]
    fn n_calls_give_n_results_and_n_unique_acks() {
        let mut bridge = ToolCallBridge::new(questions());
        let mut state = GameProgressState::new();
        let mut ids = HashSet::new();
        for i in 0..7 {
            let (ack, outcome) = bridge.handle(
                &call(&format!("id-{}", i), UPDATE_SCORE_FN, json!({"isCorrect": i % 2 == 0, "currentScore": i})),
                &mut state,
                Instant::now(),
            );
            assert!(matches!(outcome, ToolOutcome::ScoreRecorded(_)));
            assert!(ids.insert(ack.unwrap().id));
        }
        assert_eq!(state.result_log.len(), 7);
        assert_eq!(ids.len(), 7);
        // beyond the question list
        assert_eq!(state.result_log[6].question, "Question 7");
    }

    #[test]
    fn invalid_args_are_acknowledged_without_touching_state() {
        let mut bridge = ToolCallBridge::new(questions());
        let mut state = GameProgressState::new();
        for args in [
            json!({"isCorrect": "yes", "currentScore": 1}),
            json!({"currentScore": 1}),
            json!({"isCorrect": true, "currentScore": 1.5}),
            json!({"isCorrect": true}),
        ] {
            let (ack, outcome) = bridge.handle(&call("", UPDATE_SCORE_FN, args), &mut state, Instant::now());
            assert!(matches!(outcome, ToolOutcome::Rejected(_)));
            assert_eq!(ack.unwrap().response["ok"], false);
        }
        assert_eq!(state, GameProgressState::new());
    }

    #[test]
    fn duplicate_ids_apply_once() {
        let mut bridge = ToolCallBridge::new(questions());
        let mut state = GameProgressState::new();
        let c = call("same", UPDATE_SCORE_FN, json!({"isCorrect": true, "currentScore": 1}));
        assert!(bridge.handle(&c, &mut state, Instant::now()).0.is_some());
        let (ack, outcome) = bridge.handle(&c, &mut state, Instant::now());
        assert!(ack.is_none());
        assert_eq!(outcome, ToolOutcome::Duplicate);
        assert_eq!(state.answered(), 1);
    }

    #[test]
    fn end_show_and_unknown_functions_are_acknowledged() {
        let mut bridge = ToolCallBridge::new(questions());
        let mut state = GameProgressState::new();
        let (ack, outcome) = bridge.handle(&call("e", END_SHOW_FN, Value::Null), &mut state, Instant::now());
        assert_eq!(outcome, ToolOutcome::EndShow);
        assert_eq!(ack.unwrap().response, json!({"ok": true}));

        let (ack, outcome) = bridge.handle(&call("x", "launchRocket", json!({})), &mut state, Instant::now());
        assert_eq!(outcome, ToolOutcome::Unknown("launchRocket".into()));
        assert_eq!(ack.unwrap().response["error"], "unknown function");
    }

    #[test]
    fn hint_flag_and_latency_belong_to_the_next_result() {
        let mut bridge = ToolCallBridge::new(questions());
        let mut state = GameProgressState::new();
        let start = Instant::now();
        bridge.mark_question_presented(start);
        assert!(bridge.mark_hint_used());
        assert!(!bridge.mark_hint_used());

        let score = |id: &str| call(id, UPDATE_SCORE_FN, json!({"isCorrect": true, "currentScore": 1}));
        bridge.handle(&score("a"), &mut state, start + Duration::from_millis(2500));
        bridge.handle(&score("b"), &mut state, start + Duration::from_millis(3000));

        assert!(state.result_log[0].hint_used);
        assert_eq!(state.result_log[0].response_time_ms, 2500);
        assert!(!state.result_log[1].hint_used);
        assert_eq!(state.result_log[1].response_time_ms, 500);
    }
}
