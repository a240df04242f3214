use axum::{extract::State, Json};
use common::storage::types::ingestion_job::PipelineType;
use retrieval_pipeline::RetrievalResult;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub use_query_enhancer: bool,
    #[serde(default)]
    pub use_reranking: bool,
    /// Accepted for API-shape parity with ingestion requests. The vector store is shared
    /// across pipeline types, so it has no effect on which nodes are searched.
    #[serde(default)]
    pub pipeline_type: Option<PipelineType>,
}

fn default_top_k() -> usize {
    5
}

/// One-shot retrieval without chat synthesis (§6 `/retrieve`).
pub async fn retrieve(
    State(state): State<ApiState>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<Vec<RetrievalResult>>, ApiError> {
    let results = state
        .retrieval_engine
        .retrieve(
            &request.query,
            request.top_k,
            request.use_query_enhancer,
            request.use_reranking,
        )
        .await?;
    Ok(Json(results))
}
