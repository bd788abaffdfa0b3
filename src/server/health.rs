//! Health endpoints
//!
//! Per-component probes plus an aggregate. The base `/health` never touches
//! a dependency, so load balancers can poll it cheaply.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

pub async fn service_root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": state.settings.app_name,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "llm_provider": state.settings.llm_provider.to_string(),
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": state.settings.app_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health_db(State(state): State<AppState>) -> Json<Value> {
    match state.memory.ping().await {
        Ok(()) => Json(json!({ "status": "healthy", "database": "connected" })),
        Err(e) => Json(json!({
            "status": "unhealthy",
            "database": "disconnected",
            "error": e.to_string(),
        })),
    }
}

pub async fn health_redis(State(state): State<AppState>) -> Json<Value> {
    match state.cache.ping().await {
        Ok(()) => Json(json!({ "status": "healthy", "redis": "connected" })),
        Err(e) => Json(json!({
            "status": "unhealthy",
            "redis": "disconnected",
            "error": e.to_string(),
        })),
    }
}

/// Configuration probe only; no generation call is made.
pub async fn health_llm(State(state): State<AppState>) -> Json<Value> {
    let configured = state.settings.active_api_key().is_some();
    Json(json!({
        "status": if configured { "healthy" } else { "unhealthy" },
        "provider": state.settings.llm_provider.to_string(),
        "model": state.settings.active_model(),
        "configured": configured,
    }))
}

pub async fn health_all(State(state): State<AppState>) -> Json<Value> {
    let mut status = "healthy";
    let mut components = serde_json::Map::new();

    match state.memory.ping().await {
        Ok(()) => {
            components.insert("database".to_string(), json!("healthy"));
        }
        Err(e) => {
            components.insert("database".to_string(), json!(format!("unhealthy: {e}")));
            status = "degraded";
        }
    }

    match state.cache.ping().await {
        Ok(()) => {
            components.insert("redis".to_string(), json!("healthy"));
        }
        Err(e) => {
            components.insert("redis".to_string(), json!(format!("unhealthy: {e}")));
            status = "degraded";
        }
    }

    components.insert(
        "llm".to_string(),
        json!({
            "provider": state.settings.llm_provider.to_string(),
            "configured": state.settings.active_api_key().is_some(),
        }),
    );

    Json(json!({
        "status": status,
        "service": state.settings.app_name,
        "version": env!("CARGO_PKG_VERSION"),
        "components": components,
    }))
}
