//! LLM-as-judge scoring of generated answers.
//!
//! [`JudgeBackend`] is the narrow seam the pipeline talks to. [`LlmJudge`]
//! is the production backend; [`JudgeClient`] applies the skip and
//! fallback policy so a failing call never removes or corrupts a row.

use crate::config::JudgeConfig;
use crate::error::{EvalError, Result};
use crate::llm::{LlmClient, Message, Prompts};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// Highest score on the judge scale.
pub const MAX_SCORE: u8 = 5;

/// Verdict for one answer. Every field is `None` in the placeholder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeScore {
    pub correctness: Option<u8>,
    pub relevance: Option<u8>,
    pub usage_input: Option<u32>,
    pub usage_output: Option<u32>,
}

impl JudgeScore {
    /// Score used whenever the judge is skipped or fails.
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder()
    }
}

/// Something that can score a generated answer against a reference.
#[async_trait]
pub trait JudgeBackend: Send + Sync {
    async fn judge(&self, question: &str, reference: &str, generated: &str) -> Result<JudgeScore>;
}

/// Judge backed by an OpenAI-compatible chat model in JSON mode.
pub struct LlmJudge {
    client: LlmClient,
}

impl LlmJudge {
    /// Create a new judge with the given LLM client.
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// Create from judge config.
    pub fn from_config(config: JudgeConfig) -> Result<Self> {
        Ok(Self::new(LlmClient::new(config)?))
    }

    /// User message carrying the triple to score.
    fn user_payload(question: &str, reference: &str, generated: &str) -> String {
        json!({
            "question": question,
            "reference_answer": reference,
            "generated_answer": generated,
        })
        .to_string()
    }

    /// Parse the model's JSON reply. Missing criteria stay `None`.
    fn parse_scores(response: &str) -> Result<(Option<u8>, Option<u8>)> {
        let json_str = Self::extract_json(response);
        let value: Value = serde_json::from_str(&json_str).map_err(|e| {
            EvalError::LlmParse(format!(
                "Failed to parse judge response: {}. Response: {}",
                e, response
            ))
        })?;

        let object = value.as_object().ok_or_else(|| {
            EvalError::LlmParse(format!("Judge response is not an object: {}", response))
        })?;

        Ok((
            object.get("correctness").and_then(Self::criterion),
            object.get("relevance").and_then(Self::criterion),
        ))
    }

    /// Read one criterion as a 0..=5 integer.
    fn criterion(value: &Value) -> Option<u8> {
        let raw = match value {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };

        if !raw.is_finite() {
            return None;
        }
        Some(raw.round().clamp(0.0, MAX_SCORE as f64) as u8)
    }

    /// Extract JSON from response.
    fn extract_json(response: &str) -> String {
        let response = response.trim();

        if response.starts_with("```") {
            if let Some(end) = response.rfind("```") {
                let start = response.find('\n').map(|n| n + 1).unwrap_or(3);
                if end > start {
                    return response[start..end].trim().to_string();
                }
            }
        }

        response.to_string()
    }
}

#[async_trait]
impl JudgeBackend for LlmJudge {
    async fn judge(&self, question: &str, reference: &str, generated: &str) -> Result<JudgeScore> {
        let messages = vec![
            Message::system(Prompts::judge_instruction()),
            Message::user(Self::user_payload(question, reference, generated)),
        ];

        let response = self.client.chat_json(messages).await?;
        let (correctness, relevance) = Self::parse_scores(&response.content)?;

        Ok(JudgeScore {
            correctness,
            relevance,
            usage_input: response.usage.map(|u| u.prompt_tokens),
            usage_output: response.usage.map(|u| u.completion_tokens),
        })
    }
}

/// Applies the judging policy around a backend.
#[derive(Clone)]
pub struct JudgeClient {
    backend: Arc<dyn JudgeBackend>,
    enabled: bool,
}

impl JudgeClient {
    pub fn new(backend: Arc<dyn JudgeBackend>, enabled: bool) -> Self {
        Self { backend, enabled }
    }

    /// Build the production client from config.
    pub fn from_config(config: &JudgeConfig) -> Result<Self> {
        let backend = LlmJudge::from_config(config.clone())?;
        Ok(Self::new(Arc::new(backend), config.enabled))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Score one answer. Never fails: disabled judging, an empty reference
    /// or answer, and backend errors all yield the placeholder.
    pub async fn score(&self, question: &str, reference: &str, generated: &str) -> JudgeScore {
        if !self.enabled || reference.is_empty() || generated.is_empty() {
            return JudgeScore::placeholder();
        }

        match self.backend.judge(question, reference, generated).await {
            Ok(score) => {
                debug!(?score, "judge verdict");
                score
            }
            Err(e) => {
                warn!(question, error = %e, "judge call failed, using placeholder scores");
                JudgeScore::placeholder()
            }
        }
    }
}
