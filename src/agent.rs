//! LLM agent module for structured generation.
//!
//! [`StructuredGenerator`] is the seam the summary generator talks to; the
//! production implementation uses rstructor against Gemini.

use crate::config::Config;
use async_trait::async_trait;
use rstructor::{GeminiClient, GeminiModel, LLMClient};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("generation request failed: {0}")]
    RequestFailed(String),
    #[error("failed to parse model response: {0}")]
    ParseError(String),
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

/// A request for JSON output constrained by a schema
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Persona and task framing
    pub system: String,
    /// The material to analyze
    pub prompt: String,
    /// JSON schema the response must satisfy
    pub schema: Value,
}

impl GenerationRequest {
    /// Render the single prompt sent to providers without a separate system role
    pub fn render(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.schema).unwrap_or_default();
        format!(
            r#"{}

You MUST respond with valid JSON matching this JSON schema:
{}

Do not include any markdown formatting, code blocks, or explanations. Only output the raw JSON object.

---

{}"#,
            self.system, schema, self.prompt
        )
    }
}

/// Capability to produce schema-shaped JSON from a prompt.
///
/// Implementations only perform the call; timeouts and cancellation are
/// applied by the caller.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, AgentError>;
}

/// Gemini-backed generator
pub struct GeminiGenerator {
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AgentError> {
        let api_key = config.api_key()?;
        Ok(Self::new(api_key, config.agent.model.clone()))
    }
}

#[async_trait]
impl StructuredGenerator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, AgentError> {
        let model = parse_gemini_model(&self.model);

        let client = GeminiClient::new(self.api_key.as_str())
            .map_err(|e| AgentError::RequestFailed(e.to_string()))?
            .model(model);

        tracing::debug!(model = %self.model, "Sending generation request");
        let result = client
            .generate_with_metadata(&request.render())
            .await
            .map_err(|e| AgentError::RequestFailed(e.to_string()))?;

        parse_json_response(&result.text)
    }
}

/// Parse a model response into JSON, tolerating markdown code fences
pub fn parse_json_response(text: &str) -> Result<Value, AgentError> {
    let cleaned = strip_markdown_json(text);
    if cleaned.is_empty() {
        return Err(AgentError::EmptyResponse);
    }
    serde_json::from_str(&cleaned).map_err(|e| AgentError::ParseError(format!("{}: {}", e, cleaned)))
}

/// Strip markdown code block wrappers from JSON response
fn strip_markdown_json(text: &str) -> String {
    let trimmed = text.trim();

    // Remove ```json ... ``` or ``` ... ```
    if let Some(rest) = trimmed.strip_prefix("```") {
        let without_prefix = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end_idx) = without_prefix.rfind("```") {
            return without_prefix[..end_idx].trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Parse a model string into a GeminiModel
fn parse_gemini_model(model: &str) -> GeminiModel {
    match model {
        "gemini-2.0-flash" => GeminiModel::Gemini20Flash,
        "gemini-2.5-flash" => GeminiModel::Gemini25Flash,
        "gemini-2.5-pro" => GeminiModel::Gemini25Pro,
        _ => GeminiModel::Gemini20Flash, // Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_markdown_json() {
        assert_eq!(strip_markdown_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_json("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_json("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_json_response() {
        let value = parse_json_response("```json\n{\"healthScore\": 7}\n```").unwrap();
        assert_eq!(value["healthScore"], 7);

        assert!(matches!(parse_json_response("   "), Err(AgentError::EmptyResponse)));
        assert!(matches!(
            parse_json_response("Sure! Here is the summary"),
            Err(AgentError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_error_mentions_model() {
        // keeps malformed output classified as a retryable generation problem
        let err = parse_json_response("not json").unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn test_render_includes_schema_and_prompt() {
        let request = GenerationRequest {
            system: "You are an analyst.".into(),
            prompt: "Thread: hello".into(),
            schema: json!({"type": "object"}),
        };
        let rendered = request.render();
        assert!(rendered.starts_with("You are an analyst."));
        assert!(rendered.contains("\"type\": \"object\""));
        assert!(rendered.ends_with("Thread: hello"));
    }
}
