use api_state::ApiState;
use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use routes::{
    chat::chat,
    evaluation::{get_evaluation, list_evaluations, start_evaluation},
    ingestion::{job_status, list_jobs, start_job, start_single_file},
    liveness::live,
    readiness::ready,
    retrieve::retrieve,
    sessions::{get_session, list_sessions},
};

pub mod api_state;
pub mod error;
pub mod routes;

/// Router for the retrieval/ingestion/evaluation HTTP surface (§6). This is a boundary only —
/// every handler delegates to a collaborator crate and contains no core logic itself.
pub fn api_routes_v1<S>(_app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/chat", post(chat))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions", get(list_sessions))
        .route("/retrieve", post(retrieve))
        .route("/ingestion/start_job", post(start_job))
        .route("/ingestion/start_single_file", post(start_single_file))
        .route("/ingestion/status/{job_id}", get(job_status))
        .route("/ingestion/jobs", get(list_jobs))
        .route("/evaluation/start", post(start_evaluation))
        .route("/evaluation/{id}", get(get_evaluation))
        .route("/evaluations", get(list_evaluations))
}
