use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::storage::types::ingestion_job::PipelineType;

/// Which `EmbeddingProvider` backend to construct at startup (§C.5 of `SPEC_FULL.md`).
/// `Hashed` is deterministic and model-weight-free, used by the test suite and by any
/// deployment that wants to defer downloading real weights.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    Hashed,
    FastEmbed,
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::FastEmbed
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_pipeline_type() -> PipelineType {
    PipelineType::RecursiveOverlap
}

/// One `AppConfig` struct deserialized from layered `config`+`Environment` sources, grounded
/// on the teacher's `common/src/utils/config.rs`. Extended per `SPEC_FULL.md` §B with the KV
/// store's connection fields, the vector collection name, session TTLs, and chunker tuning.
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,

    #[serde(default = "default_vector_collection")]
    pub vector_collection: String,

    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default)]
    pub redis_db: i64,
    #[serde(default)]
    pub redis_password: Option<String>,

    pub http_port: u16,

    #[serde(default = "default_session_expiry_minutes")]
    pub session_expiry_minutes: u64,
    #[serde(default = "default_session_migration_interval_minutes")]
    pub session_migration_interval_minutes: u64,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap_ratio")]
    pub chunk_overlap_ratio: f64,
    #[serde(default = "default_pipeline_type")]
    pub default_pipeline_type: PipelineType,
    #[serde(default = "default_semantic_buffer_size")]
    pub semantic_buffer_size: usize,
    #[serde(default = "default_semantic_breakpoint_percentile")]
    pub semantic_breakpoint_percentile: f64,

    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    #[serde(default = "default_reranker_candidate_cap")]
    pub reranker_candidate_cap: usize,
    #[serde(default = "default_reranker_doc_truncate_chars")]
    pub reranker_doc_truncate_chars: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Model used for every LLM-backed collaborator (§4.7 QueryEnhancer, §4.8 Reranker, §4.11
/// question generation, and the semantic chunker's propositionizer).
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_vector_collection() -> String {
    "node".to_string()
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_session_expiry_minutes() -> u64 {
    2
}

fn default_session_migration_interval_minutes() -> u64 {
    1
}

/// Characters per chunk, derived from the embedder's max-token capacity times ~3.5
/// characters/token (§4.1). 512 tokens * 3.5 ≈ 1800; rounded for readability.
fn default_chunk_size() -> usize {
    1800
}

fn default_chunk_overlap_ratio() -> f64 {
    0.1
}

fn default_semantic_buffer_size() -> usize {
    1
}

fn default_semantic_breakpoint_percentile() -> f64 {
    85.0
}

fn default_job_ttl_secs() -> u64 {
    3600
}

fn default_reranker_candidate_cap() -> usize {
    20
}

fn default_reranker_doc_truncate_chars() -> usize {
    500
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        assert_eq!(default_session_expiry_minutes(), 2);
        assert_eq!(default_session_migration_interval_minutes(), 1);
        assert_eq!(default_job_ttl_secs(), 3600);
        assert_eq!(default_reranker_candidate_cap(), 20);
        assert_eq!(default_reranker_doc_truncate_chars(), 500);
        assert!((default_semantic_breakpoint_percentile() - 85.0).abs() < f64::EPSILON);
    }
}
