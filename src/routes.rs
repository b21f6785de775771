use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::scheduler::JobRun;
use crate::{AppState, account, auth, reports};

/// All API routes. Session and CORS layers are added by the caller.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/account/deletion",
            post(account::mark_for_deletion).delete(account::cancel_deletion),
        )
        .route("/transactions/stats", get(reports::transaction_stats))
        .route("/transactions/budget", get(reports::transaction_budget))
        .route("/categories/stats", get(reports::category_stats))
        .route("/health/jobs", get(job_health))
}

/// `GET /health/jobs`: the last recorded run of each scheduled job.
async fn job_health(State(app_state): State<AppState>) -> Json<Vec<JobRun>> {
    Json(app_state.job_health.snapshot().await)
}
