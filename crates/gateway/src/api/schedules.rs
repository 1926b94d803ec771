//! Schedule CRUD + pause/resume/run-now control-plane API.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use agentmesh_domain::{ActiveHours, Schedule, ScheduleState, Signal, SignalKind};

use crate::state::AppState;

use super::admin::AdminGuard;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/schedules
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_schedules(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_schedules().await {
        Ok(schedules) => {
            let count = schedules.len();
            Json(serde_json::json!({ "schedules": schedules, "count": count })).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/schedules/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_schedule(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.get_schedule(id).await {
        Ok(Some(schedule)) => Json(serde_json::json!({ "schedule": schedule })).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "schedule not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/schedules
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub agent_id: String,
    pub interval_ms: u64,
    #[serde(default)]
    pub active_hours: Option<ActiveHours>,
    #[serde(default = "d_true")]
    pub pub_dashboard: bool,
    #[serde(default = "d_true")]
    pub pub_events: bool,
}

fn d_true() -> bool {
    true
}

pub async fn create_schedule(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> impl IntoResponse {
    if let Ok(Some(_)) = state.store.get_schedule_by_agent(&req.agent_id).await {
        return api_error(
            StatusCode::CONFLICT,
            format!("a schedule for agent '{}' already exists", req.agent_id),
        );
    }

    let mut schedule = match Schedule::new(req.agent_id, req.interval_ms) {
        Ok(s) => s,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()),
    };
    schedule.active_hours = req.active_hours;
    schedule.pub_dashboard = req.pub_dashboard;
    schedule.pub_events = req.pub_events;

    match state.store.create_schedule(schedule).await {
        Ok(created) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "schedule": created })),
        )
            .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/schedules/:id/pause, /resume, /run-now
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn enqueue_signal(
    state: &AppState,
    id: Uuid,
    kind: SignalKind,
) -> Result<(), Response> {
    match state.store.get_schedule(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(api_error(StatusCode::NOT_FOUND, "schedule not found")),
        Err(e) => return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }

    state
        .store
        .enqueue_signal(Signal::new(id, kind, None))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

pub async fn pause_schedule(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(resp) = enqueue_signal(&state, id, SignalKind::Pause).await {
        return resp;
    }
    if let Err(e) = state.store.set_schedule_state(id, ScheduleState::Paused).await {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    state.scheduler.cancel_schedule(id);
    Json(serde_json::json!({ "schedule_id": id, "state": "paused" })).into_response()
}

pub async fn resume_schedule(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(resp) = enqueue_signal(&state, id, SignalKind::Resume).await {
        return resp;
    }
    if let Err(e) = state.store.set_schedule_state(id, ScheduleState::Active).await {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    if let Err(e) = state.store.set_next_run_at(id, Some(Utc::now())).await {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    Json(serde_json::json!({ "schedule_id": id, "state": "active" })).into_response()
}

pub async fn run_schedule_now(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(resp) = enqueue_signal(&state, id, SignalKind::RunNow).await {
        return resp;
    }
    Json(serde_json::json!({ "schedule_id": id, "message": "run-now signal queued" })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /v1/schedules/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete_schedule(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.set_schedule_state(id, ScheduleState::Disabled).await {
        Ok(()) => {
            state.scheduler.cancel_schedule(id);
            Json(serde_json::json!({ "deleted": true })).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
