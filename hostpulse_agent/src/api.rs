//! Point-query facade: synchronous request/response reads that go straight
//! through the provider and builder, bypassing the cache so results are
//! always fresh.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::error::AgentError;
use crate::snapshot::{
    build_cpu, build_memory, build_snapshot, now_millis, CpuSnapshot, MemorySnapshot,
    SystemSnapshot,
};
use crate::state::AppState;
use crate::ws::ws_handler;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: u64,
}

/// GET /health. Liveness only: never consults the provider, never fails.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: now_millis(),
    })
}

/// GET /api/cpu
pub async fn cpu(State(state): State<AppState>) -> Result<Json<CpuSnapshot>, AgentError> {
    let raw = state.provider.read_cpu().await?;
    Ok(Json(build_cpu(raw)))
}

/// GET /api/memory
pub async fn memory(State(state): State<AppState>) -> Result<Json<MemorySnapshot>, AgentError> {
    let raw = state.provider.read_memory().await?;
    Ok(Json(build_memory(raw)))
}

/// GET /api/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<SystemSnapshot>, AgentError> {
    let raw_cpu = state.provider.read_cpu().await?;
    let raw_memory = state.provider.read_memory().await?;
    Ok(Json(build_snapshot(raw_cpu, raw_memory)))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/cpu", get(cpu))
        .route("/api/memory", get(memory))
        .route("/api/stats", get(stats))
        .route("/ws/stats", get(ws_handler))
        .with_state(state)
}
