//! Vector Memory
//!
//! Long-term semantic recall for coach conversations. Each record ties a
//! piece of text and its embedding to a (user, coach) pair; retrieval is
//! cosine-similarity search above a configurable threshold.

pub mod embeddings;
pub mod store;

pub use embeddings::{EmbeddingProvider, OpenAiEmbeddings};
pub use store::PgMemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::AiError;

/// Memory errors
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("memory text must not be empty")]
    EmptyText,
}

/// Embedding errors
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding provider error: {0}")]
    Provider(#[from] AiError),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Classification of a memory record. Stored as text, so the set can grow
/// without a schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Conversation,
    Insight,
    Action,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Conversation => "conversation",
            MemoryKind::Insight => "insight",
            MemoryKind::Action => "action",
        }
    }
}

impl Default for MemoryKind {
    fn default() -> Self {
        MemoryKind::Conversation
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable memory record as stored in `coach_memories`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub user_id: i64,
    pub coach_id: i64,
    pub text: String,
    pub memory_type: String,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One search hit: a record plus its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMatch {
    pub id: i64,
    pub text: String,
    pub similarity: f32,
    pub memory_type: String,
    pub created_at: DateTime<Utc>,
}

/// Per-call overrides for `search`. Unset fields use the store's
/// process-wide defaults.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    pub kinds: Option<Vec<MemoryKind>>,
}

/// Role/content/metadata for one conversation-log row.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub role: String,
    pub content: String,
    pub meta: Option<serde_json::Value>,
}

/// Client contract for the vector memory store.
///
/// `log_turn` covers the plain relational conversation log, which shares a
/// database (but not a table) with the vector records.
#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    /// Embed `text` and persist a new record for the (user, coach) pair.
    async fn store(
        &self,
        text: &str,
        user_id: i64,
        coach_id: i64,
        kind: MemoryKind,
        session_id: Option<&str>,
    ) -> Result<MemoryRecord, MemoryError>;

    /// Similarity search scoped to the pair; similarity descending, capped
    /// at the limit, filtered to at-or-above the threshold.
    async fn search(
        &self,
        user_id: i64,
        coach_id: i64,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<MemoryMatch>, MemoryError>;

    /// The plain most-recent-N records by creation time, oldest first.
    /// No embedding call is made.
    async fn recent(
        &self,
        user_id: i64,
        coach_id: i64,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Delete all records for a user, optionally scoped to one coach.
    /// Irreversible.
    async fn purge(&self, user_id: i64, coach_id: Option<i64>) -> Result<u64, MemoryError>;

    /// Append rows to the relational conversation log.
    async fn log_turn(
        &self,
        user_id: i64,
        coach_id: i64,
        session_id: Option<&str>,
        entries: &[LogEntry],
    ) -> Result<(), MemoryError>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<(), MemoryError>;
}

/// Cosine similarity between two vectors, in [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
