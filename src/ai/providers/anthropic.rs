//! Anthropic Claude backend.
//!
//! Differs from the chat-format backends in two ways: the system prompt is
//! a top-level request field rather than a message, and usage arrives as
//! input/output token counts that must be summed for the total.

use serde_json::{json, Value};

use crate::ai::{AiError, GenerateOptions, LlmProvider, LlmResponse, Result, TokenUsage};
use crate::config::Settings;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude backend.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    default_temperature: f32,
    default_max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .anthropic_api_key
            .clone()
            .ok_or(AiError::MissingApiKey {
                key: "ANTHROPIC_API_KEY",
            })?;

        Ok(Self {
            client: super::build_client(60)?,
            api_key,
            base_url: settings.anthropic_base_url.clone(),
            model: settings.anthropic_model.clone(),
            default_temperature: settings.llm_temperature,
            default_max_tokens: settings.llm_max_tokens,
        })
    }

    fn build_body(&self, prompt: &str, opts: &GenerateOptions) -> Value {
        let mut messages = Vec::new();
        for msg in &opts.history {
            messages.push(json!({"role": msg.role.as_str(), "content": msg.content}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": opts.temperature.unwrap_or(self.default_temperature),
            "max_tokens": opts.max_tokens.unwrap_or(self.default_max_tokens),
        });

        // System prompt is a top-level field, not a message. JSON mode has
        // no response_format switch here; the prompt itself must request
        // JSON output, which the callers in `coach` already do.
        if let Some(system) = &opts.system_prompt {
            body["system"] = json!(system);
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<LlmResponse> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::classify_error_response(response).await);
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;
        parse_response(&value)
    }
}

fn parse_response(value: &Value) -> Result<LlmResponse> {
    let content = value["content"]
        .get(0)
        .and_then(|block| block["text"].as_str())
        .ok_or_else(|| AiError::MalformedResponse("missing content block".to_string()))?
        .to_string();

    let input_tokens = value["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32;
    let output_tokens = value["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;

    Ok(LlmResponse {
        content,
        model: value["model"].as_str().unwrap_or_default().to_string(),
        usage: TokenUsage {
            prompt_tokens: input_tokens,
            completion_tokens: output_tokens,
            total_tokens: input_tokens + output_tokens,
        },
        finish_reason: value["stop_reason"].as_str().unwrap_or("end_turn").to_string(),
    })
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<LlmResponse> {
        let body = self.build_body(prompt, opts);
        super::with_retry("anthropic generate", || self.send(&body)).await
    }
}
