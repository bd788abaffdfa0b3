//! Realtime endpoints
//!
//! Turn-based session management over HTTP. Sessions live in the in-process
//! registry; only the last-session pointer is cached.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::coach::{ActionItem, NotesRequest, RespondRequest};
use crate::sessions::{RegistryStats, SessionError};

use super::error::ApiError;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: i64,
    pub coach_id: i64,
    #[serde(default = "default_transport")]
    pub transport: String,
}

fn default_transport() -> String {
    "http".to_string()
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub user_id: i64,
    pub coach_id: i64,
    pub transport: String,
    pub created_at: DateTime<Utc>,
    pub endpoints: Value,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Json<CreateSessionResponse> {
    let session = state
        .sessions
        .create(request.user_id, request.coach_id, &request.transport);

    if let Err(e) = state
        .cache
        .set_last_session(request.user_id, &session.id)
        .await
    {
        warn!(user_id = request.user_id, error = %e, "last-session pointer write failed");
    }

    let endpoints = json!({
        "turn": format!("/realtime/sessions/{}/turn", session.id),
        "status": format!("/realtime/sessions/{}", session.id),
        "end": format!("/realtime/sessions/{}/end", session.id),
    });

    Json(CreateSessionResponse {
        session_id: session.id,
        user_id: session.user_id,
        coach_id: session.coach_id,
        transport: request.transport,
        created_at: session.created_at,
        endpoints,
    })
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub is_active: bool,
    pub is_processing: bool,
    pub user_id: i64,
    pub coach_id: i64,
    pub turn_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .map_err(|e| ApiError::from_session(e, "session lookup"))?;

    Ok(Json(SessionStatusResponse {
        session_id: session.id,
        is_active: session.is_active,
        is_processing: session.is_processing,
        user_id: session.user_id,
        coach_id: session.coach_id,
        turn_count: session.turn_count,
        created_at: session.created_at,
        last_activity: session.last_activity,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct EndSessionRequest {
    #[serde(default)]
    pub generate_notes: bool,
}

#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub session_id: String,
    pub duration_seconds: f64,
    pub turn_count: u64,
    pub notes_generated: bool,
    pub notes_id: Option<String>,
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<EndSessionRequest>,
) -> Result<Json<EndSessionResponse>, ApiError> {
    let session = state
        .sessions
        .end(&session_id)
        .map_err(|e| ApiError::from_session(e, "session end"))?;

    let duration_seconds = (Utc::now() - session.created_at).num_milliseconds() as f64 / 1000.0;

    // Notes are best effort at session end; a generation failure still ends
    // the session cleanly.
    let mut notes_id = None;
    if request.generate_notes && !session.transcript.is_empty() {
        let transcript = session
            .transcript
            .iter()
            .map(|turn| format!("User: {}\nCoach: {}", turn.user_text, turn.coach_text))
            .collect::<Vec<_>>()
            .join("\n");
        let notes_request = NotesRequest {
            user_id: session.user_id,
            coach_id: session.coach_id,
            session_id: Some(session_id.clone()),
            transcript,
        };
        match state.notes.generate(&notes_request).await {
            Ok(_) => notes_id = Some(Uuid::new_v4().to_string()),
            Err(e) => warn!(session_id, error = %e, "end-of-session notes generation failed"),
        }
    }

    Ok(Json(EndSessionResponse {
        session_id,
        duration_seconds,
        turn_count: session.turn_count,
        notes_generated: notes_id.is_some(),
        notes_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub message_id: String,
    pub reply_text: String,
    pub turn_number: u64,
    pub actions: Vec<ActionItem>,
    pub summary: Option<String>,
    pub processing_time_ms: u64,
    pub tokens_used: Option<u32>,
}

/// One text turn in a live session. Runs the same assembly pipeline as the
/// coach respond endpoint, keyed to the session's pair context.
pub async fn turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    let started = Instant::now();

    let session = state
        .sessions
        .get(&session_id)
        .map_err(|e| ApiError::from_session(e, "session turn"))?;
    if !session.is_active {
        return Err(ApiError::from_session(
            SessionError::Ended(session_id),
            "session turn",
        ));
    }

    let _ = state.sessions.set_processing(&session.id, true);

    let respond_request = RespondRequest {
        user_id: session.user_id,
        coach_id: session.coach_id,
        text: request.text.clone(),
        context: None,
        session_id: None,
        include_memory: false,
    };
    let outcome = state.assembler.respond(&respond_request).await;

    let _ = state.sessions.set_processing(&session.id, false);
    let outcome = outcome.map_err(|e| ApiError::from_ai(e, "coach response generation"))?;

    let updated = state
        .sessions
        .add_turn(&session.id, &request.text, &outcome.reply_text)
        .map_err(|e| ApiError::from_session(e, "session turn"))?;

    Ok(Json(TurnResponse {
        session_id: updated.id,
        message_id: Uuid::new_v4().to_string(),
        reply_text: outcome.reply_text,
        turn_number: updated.turn_count,
        actions: outcome.meta.actions,
        summary: outcome.meta.summary,
        processing_time_ms: started.elapsed().as_millis() as u64,
        tokens_used: Some(outcome.tokens_used),
    }))
}

pub async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.sessions.stats())
}

#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    #[serde(default = "default_max_idle")]
    pub max_idle_minutes: i64,
}

fn default_max_idle() -> i64 {
    60
}

pub async fn cleanup(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> Json<Value> {
    let cleaned = state.sessions.cleanup_stale(query.max_idle_minutes);
    Json(json!({
        "cleaned_sessions": cleaned,
        "max_idle_minutes": query.max_idle_minutes,
    }))
}
