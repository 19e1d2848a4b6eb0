//! Question generation: one request/response call to the content-generation service.
//!
//! Uses Google Search grounding and a JSON response schema. Empty or malformed
//! results are errors and must stop the round before any audio session opens.

use crate::error::{CoreError, CoreResult};
use crate::questions::{validate_question_set, Difficulty, TriviaQuestion};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Anything that can produce a question set for a round.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn generate_questions(
        &self,
        topic: &str,
        difficulty: Difficulty,
    ) -> CoreResult<Vec<TriviaQuestion>>;
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// `generateContent` client for the question set.
pub struct GeminiQuestionSource {
    api_base: String,
    api_key: String,
    model: String,
    count: u32,
    client: reqwest::Client,
}

impl GeminiQuestionSource {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_base: api_base.into(),
            api_key: api_key.into().trim().to_string(),
            model: model.into(),
            count: 5,
            client,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count.max(1);
        self
    }

    fn prompt(&self, topic: &str, difficulty: Difficulty) -> String {
        format!(
            "Generate {count} {difficulty} difficulty trivia questions about \"{topic}\".\n\
             Use Google Search to find current, accurate, and interesting facts that match a {difficulty} difficulty level.\n\
             - Easy: {easy}\n\
             - Medium: {medium}\n\
             - Hard: {hard}\n\
             Each question should have 4 options and a clear correct answer.\n\
             Return the data as a clean JSON array.",
            count = self.count,
            difficulty = difficulty,
            topic = topic,
            easy = Difficulty::Easy.guidance(),
            medium = Difficulty::Medium.guidance(),
            hard = Difficulty::Hard.guidance(),
        )
    }

    fn request_body(&self, topic: &str, difficulty: Difficulty) -> serde_json::Value {
        serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": self.prompt(topic, difficulty) }] }],
            "tools": [{ "googleSearch": {} }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "question": { "type": "STRING" },
                            "answer": { "type": "STRING" },
                            "options": { "type": "ARRAY", "items": { "type": "STRING" } },
                            "explanation": { "type": "STRING" },
                            "source": { "type": "STRING" }
                        },
                        "required": ["question", "answer", "options", "explanation"]
                    }
                }
            }
        })
    }
}

#[async_trait]
impl QuestionSource for GeminiQuestionSource {
    async fn generate_questions(
        &self,
        topic: &str,
        difficulty: Difficulty,
    ) -> CoreResult<Vec<TriviaQuestion>> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        );
        info!(topic, %difficulty, model = %self.model, "requesting trivia questions");

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(topic, difficulty))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(CoreError::QuestionSource(format!(
                "generateContent error {}: {}",
                status, body
            )));
        }

        let body: GenerateResponse = res.json().await?;
        let text = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<String>();
        debug!(len = text.len(), "question payload received");

        let questions = parse_questions(&text)?;
        validate_question_set(topic, &questions)?;
        info!(count = questions.len(), "trivia questions ready");
        Ok(questions)
    }
}

/// Parse the model's JSON array, tolerating a surrounding ```json fence.
pub fn parse_questions(text: &str) -> CoreResult<Vec<TriviaQuestion>> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(body).map_err(|e| CoreError::MalformedQuestions(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"[{"question":"Q?","answer":"B","options":["A","B","C","D"],"explanation":"E"}]"#;

    #[test]
    fn parses_plain_and_fenced_arrays() {
        assert_eq!(parse_questions(PAYLOAD).unwrap().len(), 1);
        let fenced = format!("```json\n{}\n```", PAYLOAD);
        let parsed = parse_questions(&fenced).unwrap();
        assert_eq!(parsed[0].answer, "B");
        assert_eq!(parsed[0].source, None);
    }

    #[test]
    fn garbage_is_malformed_and_blank_is_empty() {
        assert!(matches!(
            parse_questions("not json"),
            Err(CoreError::MalformedQuestions(_))
        ));
        assert!(parse_questions("   ").unwrap().is_empty());
    }

    #[test]
    fn prompt_mentions_count_and_topic() {
        let source = GeminiQuestionSource::new("http://localhost", "key", "model").with_count(7);
        let prompt = source.prompt("Sports", Difficulty::Hard);
        assert!(prompt.starts_with("Generate 7 Hard difficulty trivia questions about \"Sports\""));
        let body = source.request_body("Sports", Difficulty::Hard);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }
}
