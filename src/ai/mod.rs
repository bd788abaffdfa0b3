//! Generation Gateway
//!
//! One request/response contract over multiple LLM backends (OpenAI, Groq,
//! Anthropic). The backend is selected once at startup from `Settings` and is
//! immutable for the process lifetime. Each backend retries transient
//! failures with bounded exponential backoff before surfacing an error.

pub mod providers;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ProviderKind, Settings};

/// Errors from the generation gateway.
///
/// Quota, rate-limit, and auth failures are distinct variants so the server
/// layer can map them to 402/429/401 rather than a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("provider quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("provider authentication failed: {0}")]
    Authentication(String),

    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("invalid JSON in model output: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("{key} is not configured")]
    MissingApiKey { key: &'static str },
}

impl AiError {
    /// Whether a retry could plausibly succeed. Quota and auth failures are
    /// terminal; rate limits and server-side errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::RateLimited(_) | AiError::Network(_) => true,
            AiError::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for generation operations
pub type Result<T> = std::result::Result<T, AiError>;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Options for a single generation call.
///
/// Every recognized knob is enumerated here; unset fields fall back to the
/// process-wide defaults the provider was constructed with.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub system_prompt: Option<String>,
    pub history: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
}

impl GenerateOptions {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting for one generation call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Standard response from any backend.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: String,
}

/// Backend contract. One implementation per provider; all of them retry
/// transient failures internally before returning.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name as it appears in config and logs.
    fn name(&self) -> &'static str;

    /// Generate a completion for `prompt` under `opts`.
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<LlmResponse>;
}

/// Process-wide generation client. Dispatches to the single provider chosen
/// at construction; there is no runtime hot-swap.
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Build the client for the provider selected in `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let provider: Arc<dyn LlmProvider> = match settings.llm_provider {
            ProviderKind::OpenAi => Arc::new(providers::OpenAiProvider::new(settings)?),
            ProviderKind::Groq => Arc::new(providers::GroqProvider::new(settings)?),
            ProviderKind::Anthropic => Arc::new(providers::AnthropicProvider::new(settings)?),
        };
        Ok(Self { provider })
    }

    /// Wrap an existing provider. Used by tests to inject stubs.
    pub fn with_provider(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<LlmResponse> {
        self.provider.generate(prompt, opts).await
    }

    /// Generate with JSON mode forced on and parse the output.
    ///
    /// A parse failure is `AiError::InvalidJson`, distinct from provider
    /// errors, so callers can degrade instead of surfacing a 5xx.
    pub async fn generate_json(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<serde_json::Value> {
        let mut opts = opts.clone();
        opts.json_mode = true;
        let response = self.provider.generate(prompt, &opts).await?;
        let value = serde_json::from_str(&response.content)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        reply: String,
    }

    #[async_trait::async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn generate(&self, _prompt: &str, _opts: &GenerateOptions) -> Result<LlmResponse> {
            Ok(LlmResponse {
                content: self.reply.clone(),
                model: "fixed-1".to_string(),
                usage: TokenUsage::default(),
                finish_reason: "stop".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_generate_json_parses_output() {
        let client = LlmClient::with_provider(Arc::new(FixedProvider {
            reply: r#"{"summary": "pricing advice"}"#.to_string(),
        }));
        let value = client
            .generate_json("extract", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(value["summary"], "pricing advice");
    }

    #[tokio::test]
    async fn test_generate_json_parse_failure_is_distinct() {
        let client = LlmClient::with_provider(Arc::new(FixedProvider {
            reply: "not json at all".to_string(),
        }));
        let err = client
            .generate_json("extract", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::InvalidJson(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AiError::RateLimited("slow down".into()).is_transient());
        assert!(AiError::Provider {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!AiError::QuotaExceeded("billing".into()).is_transient());
        assert!(!AiError::Authentication("bad key".into()).is_transient());
        assert!(!AiError::Provider {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
    }
}
