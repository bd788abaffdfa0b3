//! OpenAI chat-completions backend.
//!
//! Groq speaks the same wire format, so the request body construction and
//! response parsing here are shared with the Groq backend.

use serde_json::{json, Value};

use crate::ai::{AiError, GenerateOptions, LlmProvider, LlmResponse, Result, TokenUsage};
use crate::config::Settings;

/// Defaults a chat-format backend falls back to when a call does not
/// override them.
#[derive(Debug, Clone)]
pub(super) struct GenerationDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationDefaults {
    pub(super) fn from_settings(settings: &Settings) -> Self {
        Self {
            temperature: settings.llm_temperature,
            max_tokens: settings.llm_max_tokens,
        }
    }
}

/// Build an OpenAI-format chat completions body. The system prompt rides in
/// the message list, followed by history, then the current prompt.
pub(super) fn build_chat_body(
    model: &str,
    prompt: &str,
    opts: &GenerateOptions,
    defaults: &GenerationDefaults,
) -> Value {
    let mut messages = Vec::new();

    if let Some(system) = &opts.system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    for msg in &opts.history {
        messages.push(json!({"role": msg.role.as_str(), "content": msg.content}));
    }
    messages.push(json!({"role": "user", "content": prompt}));

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": opts.temperature.unwrap_or(defaults.temperature),
        "max_tokens": opts.max_tokens.unwrap_or(defaults.max_tokens),
    });

    if opts.json_mode {
        body["response_format"] = json!({"type": "json_object"});
    }

    body
}

/// Parse an OpenAI-format chat completions response.
pub(super) fn parse_chat_response(value: &Value) -> Result<LlmResponse> {
    let choice = value["choices"]
        .get(0)
        .ok_or_else(|| AiError::MalformedResponse("no choices in response".to_string()))?;

    let content = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| AiError::MalformedResponse("missing message content".to_string()))?
        .to_string();

    let usage = TokenUsage {
        prompt_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        total_tokens: value["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32,
    };

    Ok(LlmResponse {
        content,
        model: value["model"].as_str().unwrap_or_default().to_string(),
        usage,
        finish_reason: choice["finish_reason"].as_str().unwrap_or("stop").to_string(),
    })
}

/// Send one chat-format request and parse the reply. Shared by the OpenAI
/// and Groq backends; the retry loop lives in each backend's `generate`.
pub(super) async fn send_chat_request(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    body: &Value,
) -> Result<LlmResponse> {
    let response = client
        .post(format!("{}/chat/completions", base_url))
        .bearer_auth(api_key)
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
    parse_chat_response(&value)
}

/// OpenAI GPT backend.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    defaults: GenerationDefaults,
}

impl OpenAiProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .openai_api_key
            .clone()
            .ok_or(AiError::MissingApiKey {
                key: "OPENAI_API_KEY",
            })?;

        Ok(Self {
            client: super::build_client(60)?,
            api_key,
            base_url: settings.openai_base_url.clone(),
            model: settings.openai_model.clone(),
            defaults: GenerationDefaults::from_settings(settings),
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<LlmResponse> {
        let body = build_chat_body(&self.model, prompt, opts, &self.defaults);
        super::with_retry("openai generate", || {
            send_chat_request(&self.client, &self.base_url, &self.api_key, &body)
        })
        .await
    }
}
