//! Groq backend.
//!
//! Groq exposes an OpenAI-compatible chat completions API, so this backend
//! reuses the OpenAI request/response plumbing with its own endpoint, key,
//! and model.

use crate::ai::{AiError, GenerateOptions, LlmProvider, LlmResponse, Result};
use crate::config::Settings;

use super::openai::{build_chat_body, send_chat_request, GenerationDefaults};

/// Groq fast-inference backend.
pub struct GroqProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    defaults: GenerationDefaults,
}

impl GroqProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.groq_api_key.clone().ok_or(AiError::MissingApiKey {
            key: "GROQ_API_KEY",
        })?;

        Ok(Self {
            client: super::build_client(60)?,
            api_key,
            base_url: settings.groq_base_url.clone(),
            model: settings.groq_model.clone(),
            defaults: GenerationDefaults::from_settings(settings),
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for GroqProvider {
    fn name(&self) -> &'static str {
        "groq"
    }

    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<LlmResponse> {
        let body = build_chat_body(&self.model, prompt, opts, &self.defaults);
        super::with_retry("groq generate", || {
            send_chat_request(&self.client, &self.base_url, &self.api_key, &body)
        })
        .await
    }
}
