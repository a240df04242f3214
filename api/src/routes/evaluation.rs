use axum::{
    extract::{Path, Query, State},
    Json,
};
use common::storage::types::evaluation::Evaluation;
use evaluation_engine::EvaluationRequest;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct StartEvaluationRequest {
    pub folder_path: String,
    pub top_k: usize,
    #[serde(default)]
    pub use_query_enhancer: bool,
    #[serde(default)]
    pub use_reranking: bool,
    pub num_questions_per_doc: usize,
    #[serde(default)]
    pub source_evaluation_id: Option<String>,
    #[serde(default)]
    pub question_group_id: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct StartEvaluationResponse {
    pub evaluation_id: String,
}

pub async fn start_evaluation(
    State(state): State<ApiState>,
    Json(request): Json<StartEvaluationRequest>,
) -> Result<Json<StartEvaluationResponse>, ApiError> {
    let evaluation_id = state
        .evaluation_engine
        .start_evaluation(EvaluationRequest {
            folder_path: request.folder_path,
            top_k: request.top_k,
            use_query_enhancer: request.use_query_enhancer,
            use_reranking: request.use_reranking,
            num_questions_per_doc: request.num_questions_per_doc,
            source_evaluation_id: request.source_evaluation_id,
            question_group_id: request.question_group_id,
        })
        .await?;
    Ok(Json(StartEvaluationResponse { evaluation_id }))
}

pub async fn get_evaluation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Evaluation>, ApiError> {
    let evaluation = state
        .db
        .get_item::<Evaluation>(&id)
        .await?
        .ok_or_else(|| common::error::AppError::NotFound(format!("evaluation {id} not found")))?;
    Ok(Json(evaluation))
}

#[derive(Debug, Deserialize)]
pub struct ListEvaluationsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_evaluations(
    State(state): State<ApiState>,
    Query(query): Query<ListEvaluationsQuery>,
) -> Result<Json<Vec<Evaluation>>, ApiError> {
    let evaluations = state
        .db
        .find_all_sorted_desc::<Evaluation>(query.limit)
        .await?;
    Ok(Json(evaluations))
}
