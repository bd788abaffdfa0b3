//! Postgres + pgvector store
//!
//! Persists memory records in `coach_memories` and answers similarity
//! queries with pgvector's cosine distance operator. Similarity is
//! `1 - (embedding <=> query)`, so higher is closer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{PgPool, Row};

use super::{
    EmbeddingProvider, LogEntry, MemoryError, MemoryKind, MemoryMatch, MemoryRecord, MemoryStore,
    SearchOptions,
};

/// Process-wide search defaults, overridable per call.
#[derive(Debug, Clone, Copy)]
pub struct SearchDefaults {
    pub limit: usize,
    pub threshold: f32,
}

impl SearchDefaults {
    /// Effective (limit, threshold) for one call: per-call overrides win,
    /// unset options fall back to these defaults.
    pub fn resolve(&self, opts: &SearchOptions) -> (usize, f32) {
        (
            opts.limit.unwrap_or(self.limit),
            opts.threshold.unwrap_or(self.threshold),
        )
    }
}

/// Vector memory store backed by Postgres.
pub struct PgMemoryStore {
    pool: PgPool,
    embedder: Arc<dyn EmbeddingProvider>,
    defaults: SearchDefaults,
}

impl std::fmt::Debug for PgMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgMemoryStore")
            .field("defaults", &self.defaults)
            .field("dimension", &self.embedder.dimensions())
            .finish_non_exhaustive()
    }
}

impl PgMemoryStore {
    pub fn new(pool: PgPool, embedder: Arc<dyn EmbeddingProvider>, defaults: SearchDefaults) -> Self {
        Self {
            pool,
            embedder,
            defaults,
        }
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> MemoryRecord {
        MemoryRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            coach_id: row.get("coach_id"),
            text: row.get("text"),
            memory_type: row.get("memory_type"),
            session_id: row.get("session_id"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        }
    }
}

#[async_trait::async_trait]
impl MemoryStore for PgMemoryStore {
    async fn store(
        &self,
        text: &str,
        user_id: i64,
        coach_id: i64,
        kind: MemoryKind,
        session_id: Option<&str>,
    ) -> Result<MemoryRecord, MemoryError> {
        if text.trim().is_empty() {
            return Err(MemoryError::EmptyText);
        }

        let embedding = self.embedder.embed(text).await?;

        let row = sqlx::query(
            r#"
            INSERT INTO coach_memories (user_id, coach_id, text, embedding, memory_type, session_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, coach_id, text, memory_type, session_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(coach_id)
        .bind(text)
        .bind(Vector::from(embedding))
        .bind(kind.as_str())
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::record_from_row(&row))
    }

    async fn search(
        &self,
        user_id: i64,
        coach_id: i64,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<MemoryMatch>, MemoryError> {
        let (limit, threshold) = self.defaults.resolve(opts);

        let query_embedding = Vector::from(self.embedder.embed(query).await?);

        // Ties in similarity fall back to the store's row order, which is
        // stable enough for this use.
        let mut sql = String::from(
            r#"
            SELECT id, text, memory_type, created_at,
                   1 - (embedding <=> $1) AS similarity
            FROM coach_memories
            WHERE user_id = $2
              AND coach_id = $3
              AND 1 - (embedding <=> $1) >= $4
            "#,
        );
        if opts.kinds.is_some() {
            sql.push_str(" AND memory_type = ANY($6)");
        }
        sql.push_str(" ORDER BY similarity DESC LIMIT $5");

        let mut db_query = sqlx::query(&sql)
            .bind(&query_embedding)
            .bind(user_id)
            .bind(coach_id)
            .bind(threshold as f64)
            .bind(limit as i64);

        if let Some(kinds) = &opts.kinds {
            let names: Vec<&str> = kinds.iter().map(MemoryKind::as_str).collect();
            db_query = db_query.bind(names);
        }

        let rows = db_query.fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| MemoryMatch {
                id: row.get("id"),
                text: row.get("text"),
                similarity: row.get::<f64, _>("similarity") as f32,
                memory_type: row.get("memory_type"),
                created_at: row.get::<DateTime<Utc>, _>("created_at"),
            })
            .collect())
    }

    async fn recent(
        &self,
        user_id: i64,
        coach_id: i64,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, coach_id, text, memory_type, session_id, created_at
            FROM coach_memories
            WHERE user_id = $1 AND coach_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(coach_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        // Fetched newest-first for the LIMIT; returned oldest-first.
        let mut records: Vec<MemoryRecord> = rows.iter().map(Self::record_from_row).collect();
        records.reverse();
        Ok(records)
    }

    async fn purge(&self, user_id: i64, coach_id: Option<i64>) -> Result<u64, MemoryError> {
        let result = match coach_id {
            Some(coach_id) => {
                sqlx::query("DELETE FROM coach_memories WHERE user_id = $1 AND coach_id = $2")
                    .bind(user_id)
                    .bind(coach_id)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM coach_memories WHERE user_id = $1")
                    .bind(user_id)
                    .execute(&self.pool)
                    .await?
            }
        };

        Ok(result.rows_affected())
    }

    async fn log_turn(
        &self,
        user_id: i64,
        coach_id: i64,
        session_id: Option<&str>,
        entries: &[LogEntry],
    ) -> Result<(), MemoryError> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO conversation_history (user_id, coach_id, session_id, role, content, meta)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(user_id)
            .bind(coach_id)
            .bind(session_id)
            .bind(&entry.role)
            .bind(&entry.content)
            .bind(&entry.meta)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), MemoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::EmbeddingError;

    #[test]
    fn test_search_overrides_beat_defaults() {
        let defaults = SearchDefaults {
            limit: 5,
            threshold: 0.2,
        };
        let opts = SearchOptions {
            limit: Some(3),
            threshold: Some(1.01),
            kinds: None,
        };
        assert_eq!(defaults.resolve(&opts), (3, 1.01));
    }

    #[test]
    fn test_search_defaults_fill_unset_options() {
        let defaults = SearchDefaults {
            limit: 5,
            threshold: 0.2,
        };
        assert_eq!(defaults.resolve(&SearchOptions::default()), (5, 0.2));
    }

    struct FlatEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for FlatEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.1; 1536])
        }

        fn dimensions(&self) -> usize {
            1536
        }
    }

    #[tokio::test]
    #[ignore = "needs Postgres with pgvector; set DATABASE_URL"]
    async fn test_impossible_threshold_returns_empty_not_error() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        crate::migrations::MigrationRunner::new(crate::migrations::default_migrations_dir())
            .run(&pool)
            .await
            .unwrap();

        let store = PgMemoryStore::new(
            pool,
            Arc::new(FlatEmbedder),
            SearchDefaults {
                limit: 5,
                threshold: 0.2,
            },
        );
        let user_id = 990_002;
        store
            .store(
                "quarterly revenue plan",
                user_id,
                1,
                MemoryKind::Conversation,
                None,
            )
            .await
            .unwrap();

        // Cosine similarity tops out at 1.0, so nothing clears 1.01. The
        // answer is an empty list, not an error.
        let opts = SearchOptions {
            threshold: Some(1.01),
            ..Default::default()
        };
        let matches = store
            .search(user_id, 1, "quarterly revenue plan", &opts)
            .await
            .unwrap();
        assert!(matches.is_empty());

        store.purge(user_id, None).await.unwrap();
    }
}
