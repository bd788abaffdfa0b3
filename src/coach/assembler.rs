//! Context Assembler
//!
//! The per-turn core: pick the right context (explicit history, session
//! cache, or pair cache), fold vector memories into the system prompt,
//! generate the reply, then fan out best-effort writes to both stores.
//!
//! Context selection is strict priority, first match wins. Vector memories
//! never enter the turn-taking history; they are appended to the system
//! prompt as a prefixed block. All post-response writes are isolated: a
//! failed write is logged at warn and the turn still succeeds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::ai::{AiError, ChatMessage, GenerateOptions, LlmClient, LlmResponse, Role};
use crate::cache::ContextCache;
use crate::config::Settings;
use crate::memory::{LogEntry, MemoryKind, MemoryStore};
use crate::sessions::TranscriptTurn;

use super::personas::{persona_for, Persona};

/// One turn request.
#[derive(Debug, Clone, Deserialize)]
pub struct RespondRequest {
    pub user_id: i64,
    pub coach_id: i64,
    pub text: String,
    #[serde(default)]
    pub context: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_include_memory")]
    pub include_memory: bool,
}

fn default_include_memory() -> bool {
    true
}

/// An action item surfaced from a reply or a notes run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub description: String,
    pub priority: String,
    #[serde(default)]
    pub due_suggestion: Option<String>,
}

/// Metadata derived from one turn by a second, JSON-mode model call.
/// Extraction failure degrades to the default, never a user-visible error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnMeta {
    #[serde(default)]
    pub actions: Vec<ActionItem>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
}

/// The assembled outcome of one turn.
#[derive(Debug, Clone, Serialize)]
pub struct RespondOutcome {
    pub reply_text: String,
    pub meta: TurnMeta,
    pub model: String,
    pub tokens_used: u32,
}

/// Per-turn orchestrator over the generation client and both stores.
pub struct Assembler {
    llm: Arc<LlmClient>,
    memory: Arc<dyn MemoryStore>,
    cache: Arc<dyn ContextCache>,
    session_history_limit: usize,
}

impl std::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler")
            .field("session_history_limit", &self.session_history_limit)
            .finish_non_exhaustive()
    }
}

impl Assembler {
    pub fn new(
        llm: Arc<LlmClient>,
        memory: Arc<dyn MemoryStore>,
        cache: Arc<dyn ContextCache>,
        settings: &Settings,
    ) -> Self {
        Self {
            llm,
            memory,
            cache,
            session_history_limit: settings.session_history_limit,
        }
    }

    /// Persona lookup, preferring a cached override when one is set.
    pub async fn resolve_persona(&self, coach_id: i64) -> Persona {
        match self.cache.persona_override(coach_id).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(persona) => persona,
                Err(e) => {
                    warn!(coach_id, error = %e, "ignoring unparseable persona override");
                    persona_for(coach_id)
                }
            },
            Ok(None) => persona_for(coach_id),
            Err(e) => {
                warn!(coach_id, error = %e, "persona override lookup failed");
                persona_for(coach_id)
            }
        }
    }

    /// Run one coaching turn end to end.
    pub async fn respond(&self, request: &RespondRequest) -> Result<RespondOutcome, AiError> {
        let persona = self.resolve_persona(request.coach_id).await;

        let history = self.select_history(request).await;
        let memory_block = if request.include_memory {
            self.recall_memories(request).await
        } else {
            String::new()
        };

        let system_prompt = build_system_prompt(&persona, &memory_block);
        let opts = GenerateOptions::default()
            .with_system_prompt(system_prompt)
            .with_history(history);

        let response = self.llm.generate(&request.text, &opts).await?;

        let meta = self
            .extract_turn_meta(&request.text, &response.content)
            .await;

        self.persist_turn(request, &response.content, &meta, &persona)
            .await;

        Ok(RespondOutcome {
            reply_text: response.content,
            meta,
            model: response.model,
            tokens_used: response.usage.total_tokens,
        })
    }

    /// Generate a reply for a live voice/realtime turn: persona prompt plus
    /// the tail of the session transcript as history.
    pub async fn session_reply(
        &self,
        coach_id: i64,
        transcript_tail: &[TranscriptTurn],
        text: &str,
    ) -> Result<LlmResponse, AiError> {
        let persona = self.resolve_persona(coach_id).await;

        let mut history = Vec::with_capacity(transcript_tail.len() * 2);
        for turn in transcript_tail {
            history.push(ChatMessage::user(turn.user_text.clone()));
            history.push(ChatMessage::assistant(turn.coach_text.clone()));
        }

        let system_prompt = format!(
            "{}\n\nKeep your reply short and conversational; it will be spoken aloud.",
            persona.system_prompt
        );
        let opts = GenerateOptions::default()
            .with_system_prompt(system_prompt)
            .with_history(history);

        self.llm.generate(text, &opts).await
    }

    /// One short in-character greeting. An empty model reply falls back to a
    /// canned line; provider errors propagate.
    pub async fn greeting(&self, coach_id: i64) -> Result<String, AiError> {
        let persona = self.resolve_persona(coach_id).await;

        let opts = GenerateOptions::default()
            .with_system_prompt(persona.system_prompt.clone())
            .with_max_tokens(50);
        let response = self
            .llm
            .generate(
                "Greet the user warmly in one or two short sentences and invite them to share what they want to work on today.",
                &opts,
            )
            .await?;

        let text = response.content.trim();
        if text.is_empty() {
            Ok(fallback_greeting(&persona))
        } else {
            Ok(text.to_string())
        }
    }

    /// Context selection, strict priority: explicit history, then session
    /// cache, then pair cache. Cache failures degrade to empty history.
    async fn select_history(&self, request: &RespondRequest) -> Vec<ChatMessage> {
        if let Some(context) = &request.context {
            if !context.is_empty() {
                return context.clone();
            }
        }

        if let Some(session_id) = &request.session_id {
            match self
                .cache
                .recent_session_messages(session_id, self.session_history_limit)
                .await
            {
                Ok(messages) => return messages,
                Err(e) => {
                    warn!(session_id, error = %e, "session context read failed");
                    return Vec::new();
                }
            }
        }

        match self
            .cache
            .pair_context(request.user_id, request.coach_id)
            .await
        {
            Ok(Some(messages)) => messages,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(
                    user_id = request.user_id,
                    coach_id = request.coach_id,
                    error = %e,
                    "pair context read failed"
                );
                Vec::new()
            }
        }
    }

    /// Vector recall for the system prompt. Failure degrades to no block.
    async fn recall_memories(&self, request: &RespondRequest) -> String {
        match self
            .memory
            .search(
                request.user_id,
                request.coach_id,
                &request.text,
                &Default::default(),
            )
            .await
        {
            Ok(matches) => build_memory_block(
                &matches.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
            ),
            Err(e) => {
                warn!(
                    user_id = request.user_id,
                    coach_id = request.coach_id,
                    error = %e,
                    "memory recall failed"
                );
                String::new()
            }
        }
    }

    /// Second model call extracting {actions, summary, topics, sentiment}.
    async fn extract_turn_meta(&self, user_message: &str, coach_response: &str) -> TurnMeta {
        let prompt = build_extraction_prompt(user_message, coach_response);
        let opts = GenerateOptions::default()
            .with_system_prompt("You are a precise metadata extractor. Return only valid JSON.");

        match self.llm.generate_json(&prompt, &opts).await {
            Ok(value) => TurnMeta {
                actions: parse_action_items(&value["actions"]),
                summary: value["summary"].as_str().map(str::to_string),
                topics: parse_string_array(&value["topics"]),
                sentiment: value["sentiment"].as_str().map(str::to_string),
            },
            Err(e) => {
                warn!(error = %e, "metadata extraction failed, using empty metadata");
                TurnMeta::default()
            }
        }
    }

    /// The post-response writes: cache (user then assistant), one
    /// conversation memory, an optional insight memory, and the relational
    /// conversation log. Each is independent and best effort.
    async fn persist_turn(
        &self,
        request: &RespondRequest,
        reply: &str,
        meta: &TurnMeta,
        persona: &Persona,
    ) {
        if let Some(session_id) = &request.session_id {
            for (role, content) in [(Role::User, request.text.as_str()), (Role::Assistant, reply)]
            {
                if let Err(e) = self
                    .cache
                    .append_session_message(
                        session_id,
                        request.user_id,
                        request.coach_id,
                        role,
                        content,
                    )
                    .await
                {
                    warn!(session_id, error = %e, "session cache write failed");
                }
            }
        } else {
            for (role, content) in [(Role::User, request.text.as_str()), (Role::Assistant, reply)]
            {
                if let Err(e) = self
                    .cache
                    .append_pair_message(request.user_id, request.coach_id, role, content)
                    .await
                {
                    warn!(
                        user_id = request.user_id,
                        coach_id = request.coach_id,
                        error = %e,
                        "pair cache write failed"
                    );
                }
            }
        }

        if let Err(e) = self
            .memory
            .store(
                &format!("User asked: {}", request.text),
                request.user_id,
                request.coach_id,
                MemoryKind::Conversation,
                request.session_id.as_deref(),
            )
            .await
        {
            warn!(user_id = request.user_id, error = %e, "conversation memory write failed");
        }

        if let Some(summary) = &meta.summary {
            if let Err(e) = self
                .memory
                .store(
                    &format!("Coach {} advised: {}", persona.name, summary),
                    request.user_id,
                    request.coach_id,
                    MemoryKind::Insight,
                    request.session_id.as_deref(),
                )
                .await
            {
                warn!(user_id = request.user_id, error = %e, "insight memory write failed");
            }
        }

        let entries = [
            LogEntry {
                role: "user".to_string(),
                content: request.text.clone(),
                meta: None,
            },
            LogEntry {
                role: "assistant".to_string(),
                content: reply.to_string(),
                meta: serde_json::to_value(meta).ok(),
            },
        ];
        if let Err(e) = self
            .memory
            .log_turn(
                request.user_id,
                request.coach_id,
                request.session_id.as_deref(),
                &entries,
            )
            .await
        {
            warn!(user_id = request.user_id, error = %e, "conversation log write failed");
        }
    }
}

/// Persona prompt, optional memory block, then the response guidance.
pub(crate) fn build_system_prompt(persona: &Persona, memory_block: &str) -> String {
    format!(
        "{}\n\n{}\n\nWhen responding:\n\
         1. Be helpful and provide actionable advice\n\
         2. If you identify specific action items, mention them clearly\n\
         3. Stay in character as {}\n\
         4. Reference the user's context when relevant",
        persona.system_prompt, memory_block, persona.name
    )
}

/// Memory texts rendered for the system prompt. Empty input → empty block.
pub(crate) fn build_memory_block(texts: &[&str]) -> String {
    if texts.is_empty() {
        return String::new();
    }
    let mut block = String::from("\n\nRelevant context from previous conversations:\n");
    for text in texts {
        block.push_str("- ");
        block.push_str(text);
        block.push('\n');
    }
    block
}

pub(crate) fn build_extraction_prompt(user_message: &str, coach_response: &str) -> String {
    format!(
        "Analyze this coaching conversation and extract metadata.\n\n\
         User message: {user_message}\n\n\
         Coach response: {coach_response}\n\n\
         Return a JSON object with:\n\
         - \"actions\": array of action items, each with \"description\", \"priority\" (low/medium/high/urgent), \"due_suggestion\"\n\
         - \"summary\": brief one-sentence summary of the response\n\
         - \"topics\": array of topic keywords\n\
         - \"sentiment\": user's apparent sentiment (curious, frustrated, motivated, confused, etc.)\n\n\
         Only include actions that were explicitly or implicitly suggested. Be concise."
    )
}

fn fallback_greeting(persona: &Persona) -> String {
    format!(
        "Hey there! I'm {}, your business coach. What's on your mind today?",
        persona.first_name()
    )
}

/// Action items from model JSON; entries without a description are dropped
/// and priority defaults to medium.
pub(crate) fn parse_action_items(value: &Value) -> Vec<ActionItem> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let description = item["description"].as_str()?.trim();
            if description.is_empty() {
                return None;
            }
            Some(ActionItem {
                description: description.to_string(),
                priority: item["priority"].as_str().unwrap_or("medium").to_string(),
                due_suggestion: item["due_suggestion"].as_str().map(str::to_string),
            })
        })
        .collect()
}

pub(crate) fn parse_string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{LlmProvider, TokenUsage};
    use crate::cache::{
        CacheError, CachedMessage, RateLimitDecision, RateLimitStatus, SessionContext,
    };
    use crate::memory::{MemoryError, MemoryMatch, MemoryRecord, SearchOptions};
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
        seen_opts: Mutex<Vec<GenerateOptions>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                seen_opts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(
            &self,
            _prompt: &str,
            opts: &GenerateOptions,
        ) -> crate::ai::Result<LlmResponse> {
            self.seen_opts.lock().push(opts.clone());
            let content = self.replies.lock().pop_front().unwrap_or_default();
            Ok(LlmResponse {
                content,
                model: "scripted-1".to_string(),
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
                finish_reason: "stop".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingMemory {
        matches: Vec<MemoryMatch>,
        stored: Mutex<Vec<(String, MemoryKind)>>,
        logged: Mutex<Vec<LogEntry>>,
    }

    #[async_trait::async_trait]
    impl MemoryStore for RecordingMemory {
        async fn store(
            &self,
            text: &str,
            user_id: i64,
            coach_id: i64,
            kind: MemoryKind,
            session_id: Option<&str>,
        ) -> Result<MemoryRecord, MemoryError> {
            self.stored.lock().push((text.to_string(), kind));
            Ok(MemoryRecord {
                id: 1,
                user_id,
                coach_id,
                text: text.to_string(),
                memory_type: kind.as_str().to_string(),
                session_id: session_id.map(str::to_string),
                created_at: Utc::now(),
            })
        }

        async fn search(
            &self,
            _user_id: i64,
            _coach_id: i64,
            _query: &str,
            _opts: &SearchOptions,
        ) -> Result<Vec<MemoryMatch>, MemoryError> {
            Ok(self.matches.clone())
        }

        async fn recent(
            &self,
            _user_id: i64,
            _coach_id: i64,
            _limit: usize,
        ) -> Result<Vec<MemoryRecord>, MemoryError> {
            Ok(Vec::new())
        }

        async fn purge(&self, _user_id: i64, _coach_id: Option<i64>) -> Result<u64, MemoryError> {
            Ok(0)
        }

        async fn log_turn(
            &self,
            _user_id: i64,
            _coach_id: i64,
            _session_id: Option<&str>,
            entries: &[LogEntry],
        ) -> Result<(), MemoryError> {
            self.logged.lock().extend(entries.iter().cloned());
            Ok(())
        }

        async fn ping(&self) -> Result<(), MemoryError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCache {
        sessions: Mutex<HashMap<String, Vec<CachedMessage>>>,
        pairs: Mutex<HashMap<(i64, i64), Vec<ChatMessage>>>,
    }

    #[async_trait::async_trait]
    impl ContextCache for FakeCache {
        async fn session_context(
            &self,
            session_id: &str,
        ) -> Result<Option<SessionContext>, CacheError> {
            Ok(self.sessions.lock().get(session_id).map(|messages| {
                SessionContext {
                    session_id: session_id.to_string(),
                    user_id: 0,
                    coach_id: 0,
                    messages: messages.clone(),
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                }
            }))
        }

        async fn set_session_context(
            &self,
            session_id: &str,
            _user_id: i64,
            _coach_id: i64,
            messages: Vec<CachedMessage>,
        ) -> Result<(), CacheError> {
            self.sessions.lock().insert(session_id.to_string(), messages);
            Ok(())
        }

        async fn append_session_message(
            &self,
            session_id: &str,
            _user_id: i64,
            _coach_id: i64,
            role: Role,
            content: &str,
        ) -> Result<(), CacheError> {
            self.sessions
                .lock()
                .entry(session_id.to_string())
                .or_default()
                .push(CachedMessage::new(role, content));
            Ok(())
        }

        async fn recent_session_messages(
            &self,
            session_id: &str,
            limit: usize,
        ) -> Result<Vec<ChatMessage>, CacheError> {
            let sessions = self.sessions.lock();
            let messages = sessions.get(session_id).cloned().unwrap_or_default();
            let start = messages.len().saturating_sub(limit);
            Ok(messages[start..].iter().map(ChatMessage::from).collect())
        }

        async fn clear_session_context(&self, session_id: &str) -> Result<(), CacheError> {
            self.sessions.lock().remove(session_id);
            Ok(())
        }

        async fn pair_context(
            &self,
            user_id: i64,
            coach_id: i64,
        ) -> Result<Option<Vec<ChatMessage>>, CacheError> {
            Ok(self.pairs.lock().get(&(user_id, coach_id)).cloned())
        }

        async fn set_pair_context(
            &self,
            user_id: i64,
            coach_id: i64,
            messages: Vec<ChatMessage>,
        ) -> Result<(), CacheError> {
            self.pairs.lock().insert((user_id, coach_id), messages);
            Ok(())
        }

        async fn append_pair_message(
            &self,
            user_id: i64,
            coach_id: i64,
            role: Role,
            content: &str,
        ) -> Result<(), CacheError> {
            self.pairs
                .lock()
                .entry((user_id, coach_id))
                .or_default()
                .push(ChatMessage {
                    role,
                    content: content.to_string(),
                });
            Ok(())
        }

        async fn last_session(&self, _user_id: i64) -> Result<Option<String>, CacheError> {
            Ok(None)
        }

        async fn set_last_session(
            &self,
            _user_id: i64,
            _session_id: &str,
        ) -> Result<(), CacheError> {
            Ok(())
        }

        async fn check_rate_limit(
            &self,
            _user_id: i64,
            _endpoint: &str,
        ) -> Result<RateLimitDecision, CacheError> {
            Ok(RateLimitDecision {
                allowed: true,
                remaining: -1,
            })
        }

        async fn rate_limit_status(
            &self,
            _user_id: i64,
            _endpoint: &str,
        ) -> Result<RateLimitStatus, CacheError> {
            Ok(RateLimitStatus {
                limit: 60,
                remaining: 60,
                reset_in: 0,
            })
        }

        async fn persona_override(&self, _coach_id: i64) -> Result<Option<String>, CacheError> {
            Ok(None)
        }

        async fn set_persona_override(
            &self,
            _coach_id: i64,
            _persona: &str,
        ) -> Result<(), CacheError> {
            Ok(())
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), CacheError> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }

        async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Ok(false)
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    fn assembler(
        provider: Arc<ScriptedProvider>,
        memory: Arc<RecordingMemory>,
        cache: Arc<FakeCache>,
    ) -> Assembler {
        Assembler::new(
            Arc::new(LlmClient::with_provider(provider)),
            memory,
            cache,
            &Settings::default(),
        )
    }

    #[tokio::test]
    async fn test_respond_stores_conversation_and_orders_pair_cache() {
        let provider = ScriptedProvider::new(&[
            "Price on value, not cost.",
            r#"{"actions": [], "summary": null, "topics": ["pricing"], "sentiment": "curious"}"#,
        ]);
        let memory = Arc::new(RecordingMemory::default());
        let cache = Arc::new(FakeCache::default());
        let assembler = assembler(provider, memory.clone(), cache.clone());

        let request = RespondRequest {
            user_id: 1,
            coach_id: 1,
            text: "How do I price my product?".to_string(),
            context: None,
            session_id: None,
            include_memory: false,
        };
        let outcome = assembler.respond(&request).await.unwrap();

        assert!(!outcome.reply_text.is_empty());
        assert_eq!(outcome.tokens_used, 15);

        let stored = memory.stored.lock();
        let conversations: Vec<_> = stored
            .iter()
            .filter(|(_, kind)| *kind == MemoryKind::Conversation)
            .collect();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].0, "User asked: How do I price my product?");

        let pairs = cache.pairs.lock();
        let messages = &pairs[&(1, 1)];
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "How do I price my product?");
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_summary_adds_insight_memory() {
        let provider = ScriptedProvider::new(&[
            "Focus on your niche.",
            r#"{"actions": [], "summary": "Advised focusing on a niche", "topics": [], "sentiment": null}"#,
        ]);
        let memory = Arc::new(RecordingMemory::default());
        let cache = Arc::new(FakeCache::default());
        let assembler = assembler(provider, memory.clone(), cache);

        let request = RespondRequest {
            user_id: 2,
            coach_id: 1,
            text: "Where should I focus?".to_string(),
            context: None,
            session_id: None,
            include_memory: false,
        };
        assembler.respond(&request).await.unwrap();

        let stored = memory.stored.lock();
        let insights: Vec<_> = stored
            .iter()
            .filter(|(_, kind)| *kind == MemoryKind::Insight)
            .collect();
        assert_eq!(insights.len(), 1);
        assert_eq!(
            insights[0].0,
            "Coach Alan Wozniak advised: Advised focusing on a niche"
        );
    }

    #[tokio::test]
    async fn test_memories_land_in_system_prompt_not_history() {
        let provider = ScriptedProvider::new(&["Reply.", "{}"]);
        let memory = Arc::new(RecordingMemory {
            matches: vec![MemoryMatch {
                id: 1,
                text: "User asked: How do I hire?".to_string(),
                similarity: 0.9,
                memory_type: "conversation".to_string(),
                created_at: Utc::now(),
            }],
            ..Default::default()
        });
        let cache = Arc::new(FakeCache::default());
        let assembler = assembler(provider.clone(), memory, cache);

        let request = RespondRequest {
            user_id: 1,
            coach_id: 1,
            text: "Any hiring advice?".to_string(),
            context: None,
            session_id: None,
            include_memory: true,
        };
        assembler.respond(&request).await.unwrap();

        let opts = provider.seen_opts.lock();
        let system = opts[0].system_prompt.as_deref().unwrap();
        assert!(system.contains("Relevant context from previous conversations:"));
        assert!(system.contains("- User asked: How do I hire?"));
        assert!(opts[0].history.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_history_wins_over_session_cache() {
        let provider = ScriptedProvider::new(&["Reply.", "{}"]);
        let memory = Arc::new(RecordingMemory::default());
        let cache = Arc::new(FakeCache::default());
        cache
            .append_session_message("s-1", 1, 1, Role::User, "cached turn")
            .await
            .unwrap();
        let assembler = assembler(provider.clone(), memory, cache);

        let request = RespondRequest {
            user_id: 1,
            coach_id: 1,
            text: "Next question".to_string(),
            context: Some(vec![ChatMessage::user("explicit turn")]),
            session_id: Some("s-1".to_string()),
            include_memory: false,
        };
        assembler.respond(&request).await.unwrap();

        let opts = provider.seen_opts.lock();
        assert_eq!(opts[0].history.len(), 1);
        assert_eq!(opts[0].history[0].content, "explicit turn");
    }

    #[tokio::test]
    async fn test_metadata_extraction_failure_degrades_to_default() {
        let provider = ScriptedProvider::new(&["Reply.", "this is not json"]);
        let memory = Arc::new(RecordingMemory::default());
        let cache = Arc::new(FakeCache::default());
        let assembler = assembler(provider, memory, cache);

        let request = RespondRequest {
            user_id: 1,
            coach_id: 1,
            text: "hello".to_string(),
            context: None,
            session_id: None,
            include_memory: false,
        };
        let outcome = assembler.respond(&request).await.unwrap();

        assert!(outcome.meta.actions.is_empty());
        assert!(outcome.meta.summary.is_none());
        assert!(outcome.meta.topics.is_empty());
    }

    #[tokio::test]
    async fn test_greeting_falls_back_on_empty_reply() {
        let provider = ScriptedProvider::new(&["   "]);
        let memory = Arc::new(RecordingMemory::default());
        let cache = Arc::new(FakeCache::default());
        let assembler = assembler(provider, memory, cache);

        let greeting = assembler.greeting(1).await.unwrap();
        assert_eq!(
            greeting,
            "Hey there! I'm Alan, your business coach. What's on your mind today?"
        );
    }

    #[test]
    fn test_parse_action_items_drops_empty_descriptions() {
        let value = serde_json::json!([
            {"description": "Draft a pricing sheet", "priority": "high", "due_suggestion": "this week"},
            {"description": "", "priority": "low"},
            {"priority": "urgent"},
        ]);
        let actions = parse_action_items(&value);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].description, "Draft a pricing sheet");
        assert_eq!(actions[0].priority, "high");
        assert_eq!(actions[0].due_suggestion.as_deref(), Some("this week"));
    }

    #[test]
    fn test_system_prompt_shape() {
        let persona = Persona {
            name: "Testy McTest".to_string(),
            specialty: "Testing".to_string(),
            personality: "Thorough".to_string(),
            system_prompt: "You are Testy, a test coach.".to_string(),
        };
        let block = build_memory_block(&["first memory", "second memory"]);
        let prompt = build_system_prompt(&persona, &block);
        insta::assert_snapshot!(prompt, @r"
You are Testy, a test coach.



Relevant context from previous conversations:
- first memory
- second memory


When responding:
1. Be helpful and provide actionable advice
2. If you identify specific action items, mention them clearly
3. Stay in character as Testy McTest
4. Reference the user's context when relevant
");
    }

    #[test]
    fn test_empty_memory_block_is_empty_string() {
        assert_eq!(build_memory_block(&[]), "");
    }
}
