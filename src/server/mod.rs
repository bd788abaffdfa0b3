//! HTTP server
//!
//! Router assembly, shared state, and startup wiring. All collaborators are
//! constructed once at startup and injected through `AppState`; handlers
//! never reach for globals.

pub mod coach;
pub mod error;
pub mod health;
pub mod middleware;
pub mod realtime;

pub use error::ApiError;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::ai::{AiError, LlmClient};
use crate::cache::{CacheError, ContextCache, RedisCache};
use crate::coach::{Assembler, NotesGenerator};
use crate::config::{ConfigError, Settings};
use crate::memory::store::SearchDefaults;
use crate::memory::{EmbeddingError, MemoryStore, OpenAiEmbeddings, PgMemoryStore};
use crate::migrations::{default_migrations_dir, MigrationError, MigrationRunner};
use crate::sessions::SessionRegistry;
use crate::speech::{OpenAiSpeech, OpenAiWhisper, SpeechError, SpeechToText, TextToSpeech};

/// Startup errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("provider error: {0}")]
    Provider(#[from] AiError),

    #[error("embedding setup error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("speech setup error: {0}")]
    Speech(#[from] SpeechError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared handler state. Everything is behind an `Arc`; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub llm: Arc<LlmClient>,
    pub memory: Arc<dyn MemoryStore>,
    pub cache: Arc<dyn ContextCache>,
    pub sessions: Arc<SessionRegistry>,
    pub assembler: Arc<Assembler>,
    pub notes: Arc<NotesGenerator>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("provider", &self.llm.provider_name())
            .finish_non_exhaustive()
    }
}

/// The full route table with the rate-limit layer applied.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::service_root))
        .route("/health", get(health::health))
        .route("/health/db", get(health::health_db))
        .route("/health/redis", get(health::health_redis))
        .route("/health/llm", get(health::health_llm))
        .route("/health/all", get(health::health_all))
        .route("/ai/coach/respond", post(coach::respond))
        .route("/ai/coach/notes", post(coach::notes))
        .route(
            "/ai/coach/memory/{user_id}/{coach_id}",
            get(coach::get_memories).delete(coach::delete_memories),
        )
        .route("/ai/coach/voice-turn", post(coach::voice_turn))
        .route("/ai/coach/greeting", post(coach::greeting))
        .route("/realtime/sessions", post(realtime::create_session))
        .route("/realtime/sessions/{session_id}", get(realtime::session_status))
        .route("/realtime/sessions/{session_id}/end", post(realtime::end_session))
        .route("/realtime/sessions/{session_id}/turn", post(realtime::turn))
        .route("/realtime/stats", get(realtime::stats))
        .route("/realtime/cleanup", post(realtime::cleanup))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .with_state(state)
}

/// Connect the stores, apply migrations, build all collaborators, and serve
/// until the process is stopped.
pub async fn serve(settings: Settings) -> Result<(), ServerError> {
    settings.validate()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await?;
    MigrationRunner::new(default_migrations_dir()).run(&pool).await?;

    let cache: Arc<dyn ContextCache> = Arc::new(RedisCache::connect(&settings).await?);
    let llm = Arc::new(LlmClient::from_settings(&settings)?);
    let embedder = Arc::new(OpenAiEmbeddings::from_settings(&settings)?);
    let memory: Arc<dyn MemoryStore> = Arc::new(PgMemoryStore::new(
        pool,
        embedder,
        SearchDefaults {
            limit: settings.max_context_results,
            threshold: settings.similarity_threshold,
        },
    ));
    let stt: Arc<dyn SpeechToText> = Arc::new(OpenAiWhisper::from_settings(&settings)?);
    let tts: Arc<dyn TextToSpeech> = Arc::new(OpenAiSpeech::from_settings(&settings)?);

    let assembler = Arc::new(Assembler::new(
        llm.clone(),
        memory.clone(),
        cache.clone(),
        &settings,
    ));
    let notes = Arc::new(NotesGenerator::new(llm.clone(), memory.clone()));

    let addr = format!("{}:{}", settings.host, settings.port);
    let state = AppState {
        settings: Arc::new(settings),
        llm,
        memory,
        cache,
        sessions: Arc::new(SessionRegistry::new()),
        assembler,
        notes,
        stt,
        tts,
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, provider = state.llm.provider_name(), "server listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
