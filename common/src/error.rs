use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Core internal error type shared by every crate in the workspace.
///
/// Each external collaborator (§1 of the spec: vector DB, KV store, document
/// store, LLM) gets one `#[from]` variant so call sites can use `?` without
/// hand-rolled conversions. Domain variants cover the taxonomy from §7:
/// input errors are surfaced as `Validation`/`NotFound`, extraction/processing
/// failures as `Processing`, and anything that degrades best-effort (query
/// enhancer, reranker, question generator) is swallowed before it becomes one
/// of these at all.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("KV store error: {0}")]
    Kv(#[from] redis::RedisError),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Processing error: {0}")]
    Processing(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// True when the failure is a caller input problem, not a runtime fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}
