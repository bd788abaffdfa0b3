//! Recency Cache
//!
//! Redis-backed bounded, expiring lists of recent conversation turns, plus
//! the rate-limit counters and small pointers that share the same client.
//! Values are keyed either by session id or by (user, coach) pair.
//!
//! Appends are read-modify-write: read current (absent = empty), push, trim
//! to the cap from the front, rewrite with the TTL reset. Two concurrent
//! appends to the same key can lose one update; that is accepted behavior
//! for a recency hint, not a defect (the durable record is the vector
//! store, which is written independently every turn).

pub mod redis;

pub use redis::{CacheConfig, RedisCache};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::{ChatMessage, Role};

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("corrupt cache value at {key}: {message}")]
    Corrupt { key: String, message: String },
}

/// Key builders for every namespace this service uses.
pub mod keys {
    pub fn session_context(session_id: &str) -> String {
        format!("session:{}:context", session_id)
    }

    pub fn user_last_session(user_id: i64) -> String {
        format!("user:{}:last_session", user_id)
    }

    pub fn user_coach_context(user_id: i64, coach_id: i64) -> String {
        format!("user:{}:coach:{}:context", user_id, coach_id)
    }

    pub fn rate_limit(user_id: i64, endpoint: &str) -> String {
        format!("ratelimit:{}:{}", user_id, endpoint)
    }

    pub fn coach_persona(coach_id: i64) -> String {
        format!("coach:{}:persona", coach_id)
    }
}

/// One role-tagged message in a cached context list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl CachedMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

impl From<&CachedMessage> for ChatMessage {
    fn from(msg: &CachedMessage) -> Self {
        ChatMessage {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

/// Session-keyed context as stored in Redis. `created_at` survives rewrites;
/// `updated_at` moves with every append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: i64,
    pub coach_id: i64,
    pub messages: Vec<CachedMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a rate-limit check. `remaining` is -1 when limiting is
/// disabled.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: i64,
}

/// Point-in-time rate-limit accounting for one (user, endpoint).
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: i64,
    pub reset_in: i64,
}

/// Client contract for the recency cache.
#[async_trait::async_trait]
pub trait ContextCache: Send + Sync {
    // Session-keyed context

    async fn session_context(&self, session_id: &str)
        -> Result<Option<SessionContext>, CacheError>;

    /// Replace the session's context. Also refreshes the owner's
    /// last-session pointer.
    async fn set_session_context(
        &self,
        session_id: &str,
        user_id: i64,
        coach_id: i64,
        messages: Vec<CachedMessage>,
    ) -> Result<(), CacheError>;

    /// Append one message; absent key behaves as an empty-list base case.
    /// Like `set_session_context`, refreshes the last-session pointer.
    async fn append_session_message(
        &self,
        session_id: &str,
        user_id: i64,
        coach_id: i64,
        role: Role,
        content: &str,
    ) -> Result<(), CacheError>;

    /// Last `limit` messages in chronological order, shaped for LLM history.
    async fn recent_session_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CacheError>;

    async fn clear_session_context(&self, session_id: &str) -> Result<(), CacheError>;

    // Pair-keyed context

    async fn pair_context(
        &self,
        user_id: i64,
        coach_id: i64,
    ) -> Result<Option<Vec<ChatMessage>>, CacheError>;

    async fn set_pair_context(
        &self,
        user_id: i64,
        coach_id: i64,
        messages: Vec<ChatMessage>,
    ) -> Result<(), CacheError>;

    async fn append_pair_message(
        &self,
        user_id: i64,
        coach_id: i64,
        role: Role,
        content: &str,
    ) -> Result<(), CacheError>;

    // Last-session pointer (best effort, survives restarts)

    async fn last_session(&self, user_id: i64) -> Result<Option<String>, CacheError>;

    async fn set_last_session(&self, user_id: i64, session_id: &str) -> Result<(), CacheError>;

    // Rate limiting

    async fn check_rate_limit(
        &self,
        user_id: i64,
        endpoint: &str,
    ) -> Result<RateLimitDecision, CacheError>;

    async fn rate_limit_status(
        &self,
        user_id: i64,
        endpoint: &str,
    ) -> Result<RateLimitStatus, CacheError>;

    // Persona overrides

    async fn persona_override(&self, coach_id: i64) -> Result<Option<String>, CacheError>;

    async fn set_persona_override(&self, coach_id: i64, persona: &str)
        -> Result<(), CacheError>;

    // Generic key-value access

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Append `message` and trim to `cap` from the front. This is the whole
/// eviction policy: length never exceeds the cap, oldest entries go first.
pub fn merge_and_cap<T>(mut existing: Vec<T>, message: T, cap: usize) -> Vec<T> {
    existing.push(message);
    if existing.len() > cap {
        let excess = existing.len() - cap;
        existing.drain(..excess);
    }
    existing
}
