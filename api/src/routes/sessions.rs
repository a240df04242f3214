use axum::{
    extract::{Path, Query, State},
    Json,
};
use common::storage::types::session::Session;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

pub async fn get_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let session = state.session_store.get_or_create(Some(id)).await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_sessions(
    State(state): State<ApiState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let sessions = state.session_store.list_all(query.limit).await?;
    Ok(Json(sessions))
}
