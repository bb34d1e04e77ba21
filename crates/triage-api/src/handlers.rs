//! Route handlers for all API endpoints.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::sse::{KeepAlive, KeepAliveStream, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use triage_core::types::{Submission, WorkflowRecord};
use triage_pipeline::{AgentInfo, AgentStatus, MemoryState};

use crate::error::ApiError;
use crate::state::AppState;
use crate::stream::ConnectionStream;

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Reply to a submission. Failures use the shared error body instead.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearMemoryResponse {
    pub success: bool,
    pub memory: MemoryState,
}

#[derive(Debug, Serialize)]
pub struct AgentCallResponse {
    pub success: bool,
    pub method: String,
    pub result: Value,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// POST /api/process - run one error message through the pipeline.
///
/// A body without an `error` field is treated as empty input.
pub async fn process(
    State(state): State<AppState>,
    payload: Result<Json<Submission>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(submission) = payload?;
    let outcome = state.agent.process(submission).await?;

    Ok(Json(SubmitResponse {
        success: true,
        workflow: Some(outcome.workflow),
        memory: Some(outcome.memory),
        agent: Some(state.agent.info()),
        error: None,
    }))
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Json<AgentStatus> {
    Json(state.agent.status())
}

/// GET /api/events - server-sent event stream of pipeline events.
pub async fn events(State(state): State<AppState>) -> Sse<KeepAliveStream<ConnectionStream>> {
    let stream = ConnectionStream::open(state.bus(), state.config.stream.buffer_size);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.config.stream.keepalive_secs.max(1)))
            .text("keepalive"),
    )
}

/// GET /api/memory
pub async fn get_memory(State(state): State<AppState>) -> Json<MemoryState> {
    Json(state.agent.memory_snapshot())
}

/// DELETE /api/memory
pub async fn clear_memory(State(state): State<AppState>) -> Json<ClearMemoryResponse> {
    Json(ClearMemoryResponse {
        success: true,
        memory: state.agent.clear_memory(),
    })
}

/// POST /api/agent/{method} - dispatch through the capability table.
///
/// The body, if any, is the JSON argument object.
pub async fn agent_call(
    State(state): State<AppState>,
    Path(method): Path<String>,
    body: Bytes,
) -> Result<Json<AgentCallResponse>, ApiError> {
    let args = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON arguments: {}", e)))?
    };

    let result = state.agent.call(&method, args).await?;
    Ok(Json(AgentCallResponse {
        success: true,
        method,
        result,
    }))
}
