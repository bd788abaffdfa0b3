//! Coach endpoints
//!
//! Text turns, session notes, memory access, and the voice pipeline.

use axum::extract::{Path, Query, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::coach::{NotesRequest, RespondOutcome, RespondRequest};

use super::error::ApiError;
use super::AppState;

pub async fn respond(
    State(state): State<AppState>,
    Json(request): Json<RespondRequest>,
) -> Result<Json<RespondOutcome>, ApiError> {
    let outcome = state
        .assembler
        .respond(&request)
        .await
        .map_err(|e| ApiError::from_ai(e, "coach response generation"))?;
    Ok(Json(outcome))
}

pub async fn notes(
    State(state): State<AppState>,
    Json(request): Json<NotesRequest>,
) -> Result<Json<Value>, ApiError> {
    let report = state
        .notes
        .generate(&request)
        .await
        .map_err(|e| ApiError::from_ai(e, "coaching notes generation"))?;
    Ok(Json(serde_json::to_value(&report).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
pub struct MemoryQuery {
    #[serde(default = "default_memory_limit")]
    pub limit: usize,
}

fn default_memory_limit() -> usize {
    20
}

pub async fn get_memories(
    State(state): State<AppState>,
    Path((user_id, coach_id)): Path<(i64, i64)>,
    Query(query): Query<MemoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let memories = state
        .memory
        .recent(user_id, coach_id, query.limit)
        .await
        .map_err(|e| ApiError::from_memory(e, "memory retrieval"))?;
    Ok(Json(json!({ "memories": memories })))
}

pub async fn delete_memories(
    State(state): State<AppState>,
    Path((user_id, coach_id)): Path<(i64, i64)>,
) -> Result<Json<Value>, ApiError> {
    state
        .memory
        .purge(user_id, Some(coach_id))
        .await
        .map_err(|e| ApiError::from_memory(e, "memory deletion"))?;
    Ok(Json(json!({ "message": "Memories cleared successfully" })))
}

#[derive(Debug, Deserialize)]
pub struct VoiceTurnRequest {
    pub session_id: String,
    pub audio_base64: String,
    #[serde(default = "default_audio_mime")]
    pub mime_type: String,
}

fn default_audio_mime() -> String {
    "audio/webm".to_string()
}

#[derive(Debug, Serialize)]
pub struct VoiceTurnResponse {
    pub user_text: String,
    pub coach_text: String,
    pub audio_base64: String,
    pub mime_type: &'static str,
}

/// One spoken turn: decode, transcribe, generate, synthesize. Each stage
/// failure carries its own operation label.
pub async fn voice_turn(
    State(state): State<AppState>,
    Json(request): Json<VoiceTurnRequest>,
) -> Result<Json<VoiceTurnResponse>, ApiError> {
    let audio = BASE64
        .decode(&request.audio_base64)
        .map_err(|e| ApiError::bad_request(format!("invalid base64 audio: {e}"), "audio transcription"))?;

    let session = state
        .sessions
        .get(&request.session_id)
        .map_err(|e| ApiError::from_session(e, "session lookup"))?;

    let _ = state.sessions.set_processing(&request.session_id, true);

    let result = run_voice_pipeline(&state, &session, &audio, &request.mime_type).await;

    let _ = state.sessions.set_processing(&request.session_id, false);
    result.map(Json)
}

async fn run_voice_pipeline(
    state: &AppState,
    session: &crate::sessions::Session,
    audio: &[u8],
    mime_type: &str,
) -> Result<VoiceTurnResponse, ApiError> {
    let user_text = state
        .stt
        .transcribe(audio, mime_type)
        .await
        .map_err(|e| ApiError::from_speech(e, "audio transcription"))?;
    if user_text.is_empty() {
        return Err(ApiError::bad_request(
            "No speech detected in the audio",
            "audio transcription",
        ));
    }

    let reply = state
        .assembler
        .session_reply(session.coach_id, session.transcript_tail(2), &user_text)
        .await
        .map_err(|e| ApiError::from_ai(e, "coach response generation"))?;

    let speech = state
        .tts
        .synthesize(&reply.content)
        .await
        .map_err(|e| ApiError::from_speech(e, "speech synthesis"))?;

    let _ = state.sessions.add_turn(&session.id, &user_text, &reply.content);

    Ok(VoiceTurnResponse {
        user_text,
        coach_text: reply.content,
        audio_base64: BASE64.encode(&speech.bytes),
        mime_type: speech.mime_type,
    })
}

#[derive(Debug, Deserialize)]
pub struct GreetingRequest {
    pub coach_id: i64,
}

#[derive(Debug, Serialize)]
pub struct GreetingResponse {
    pub coach_text: String,
    pub audio_base64: String,
    pub mime_type: &'static str,
}

/// Short persona-voiced greeting, synthesized to audio.
pub async fn greeting(
    State(state): State<AppState>,
    Json(request): Json<GreetingRequest>,
) -> Result<Json<GreetingResponse>, ApiError> {
    let coach_text = state
        .assembler
        .greeting(request.coach_id)
        .await
        .map_err(|e| ApiError::from_ai(e, "coach response generation"))?;

    let speech = state
        .tts
        .synthesize(&coach_text)
        .await
        .map_err(|e| ApiError::from_speech(e, "speech synthesis"))?;

    Ok(Json(GreetingResponse {
        coach_text,
        audio_base64: BASE64.encode(&speech.bytes),
        mime_type: speech.mime_type,
    }))
}
