//! Analytics query API.
//!
//! - `GET /v1/analytics/:agent_id?range=1h|24h|7d|30d` — rolled-up run
//!   counts, error/alert counts, and duration percentiles for an agent.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use agentmesh_analytics::AnalyticsRange;

use crate::state::AppState;

use super::admin::AdminGuard;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default)]
    pub range: Option<String>,
}

fn parse_range(s: &str) -> Option<AnalyticsRange> {
    match s {
        "1h" => Some(AnalyticsRange::OneHour),
        "24h" => Some(AnalyticsRange::OneDay),
        "7d" => Some(AnalyticsRange::SevenDays),
        "30d" => Some(AnalyticsRange::ThirtyDays),
        _ => None,
    }
}

pub async fn get_analytics(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(q): Query<AnalyticsQuery>,
) -> impl IntoResponse {
    let range = match q.range.as_deref().map(parse_range) {
        None => AnalyticsRange::OneDay,
        Some(Some(r)) => r,
        Some(None) => {
            return Json(serde_json::json!({
                "error": "invalid range, expected one of: 1h, 24h, 7d, 30d",
            }))
            .into_response()
        }
    };

    let summary = state.analytics.get_analytics(&agent_id, range);
    Json(serde_json::json!({ "analytics": summary })).into_response()
}
