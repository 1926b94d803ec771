//! Run history query API.
//!
//! - `GET /v1/runs`     — list runs, filterable by schedule_id/agent_id/status
//! - `GET /v1/runs/:id` — get a single run
//!
//! A `Run` is a flat, append-only row — one per fired heartbeat, no
//! step/node trace attached. Schedule-status changes are observable on
//! the bus's `schedule-status` topic instead of a per-run SSE stream.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use agentmesh_domain::RunStatus;
use agentmesh_store::RunFilter;

use crate::state::AppState;

use super::admin::AdminGuard;

const MAX_LIMIT: u32 = 200;
const DEFAULT_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default)]
    pub schedule_id: Option<Uuid>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

fn parse_status(s: &str) -> Option<RunStatus> {
    match s {
        "ok" => Some(RunStatus::Ok),
        "ok_empty" => Some(RunStatus::OkEmpty),
        "ok_token" => Some(RunStatus::OkToken),
        "alert" => Some(RunStatus::Alert),
        "skipped" => Some(RunStatus::Skipped),
        "error" => Some(RunStatus::Error),
        "pending" => Some(RunStatus::Pending),
        _ => None,
    }
}

pub async fn list_runs(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Query(q): Query<ListRunsQuery>,
) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let filter = RunFilter {
        schedule_id: q.schedule_id,
        agent_id: q.agent_id,
        status: q.status.as_deref().and_then(parse_status),
        limit,
    };

    match state.store.list_runs(filter).await {
        Ok(runs) => {
            let total = runs.len();
            Json(serde_json::json!({ "runs": runs, "total": total, "limit": limit })).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn get_run(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let runs = match state
        .store
        .list_runs(RunFilter {
            limit: MAX_LIMIT,
            ..Default::default()
        })
        .await
    {
        Ok(runs) => runs,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    };

    match runs.into_iter().find(|r| r.id == id) {
        Some(run) => Json(serde_json::json!({ "run": run })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "run not found" })),
        )
            .into_response(),
    }
}
