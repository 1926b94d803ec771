pub mod admin;
pub mod analytics;
pub mod runs;
pub mod schedules;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// `/v1/health` is the only unauthenticated route — everything else is
/// gated behind [`admin::AdminGuard`], since this control surface has a
/// single admin-token tier rather than a separate public/protected split.
pub fn router(_state: AppState) -> Router<AppState> {
    Router::new()
        // Health probe (public, no auth)
        .route("/v1/health", get(admin::health))
        // Metrics & admin
        .route("/v1/metrics", get(admin::metrics))
        .route("/v1/admin/info", get(admin::system_info))
        .route("/v1/admin/config", put(admin::save_config))
        .route("/v1/admin/restart", post(admin::restart))
        // Schedules
        .route(
            "/v1/schedules",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/v1/schedules/:id",
            get(schedules::get_schedule).delete(schedules::delete_schedule),
        )
        .route("/v1/schedules/:id/pause", post(schedules::pause_schedule))
        .route("/v1/schedules/:id/resume", post(schedules::resume_schedule))
        .route(
            "/v1/schedules/:id/run-now",
            post(schedules::run_schedule_now),
        )
        // Runs
        .route("/v1/runs", get(runs::list_runs))
        .route("/v1/runs/:id", get(runs::get_run))
        // Analytics
        .route("/v1/analytics/:agent_id", get(analytics::get_analytics))
}
