use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
use evaluation_engine::EvaluationEngine;
use ingestion_pipeline::{JobScheduler, ProgressTracker};
use retrieval_pipeline::RetrievalEngine;
use session_store::SessionStore;

/// Shared, cloneable handle to every collaborator an HTTP route needs. Routes never touch a
/// gateway directly; they go through one of these (§6 "boundary only, not part of the core").
#[derive(Clone)]
pub struct ApiState {
    pub config: AppConfig,
    pub db: Arc<SurrealDbClient>,
    pub chat_client: Arc<Client<OpenAIConfig>>,
    pub session_store: Arc<SessionStore>,
    pub retrieval_engine: Arc<RetrievalEngine>,
    pub job_scheduler: Arc<JobScheduler>,
    pub progress: Arc<ProgressTracker>,
    pub evaluation_engine: Arc<EvaluationEngine>,
}
