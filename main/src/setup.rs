//! Shared collaborator wiring for the `server` and `worker` binaries, grounded on the
//! teacher's per-binary setup blocks in `main.rs`/`server.rs`/`worker.rs` (construct every
//! gateway from `AppConfig`, then hand the `Arc`s to whichever binary needs them).

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use chunker::{Chunker, LlmPropositionizer, RecursiveOverlapChunker, SemanticChunker};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        kv::{KvStore, RedisKvStore},
        types::ingestion_job::PipelineType,
        vector_store::{SurrealVectorStore, VectorStoreGateway},
    },
    utils::{
        config::AppConfig,
        embedding::{build_embedding_provider, EmbeddingProvider},
    },
};
use evaluation_engine::EvaluationEngine;
use ingestion_pipeline::{IngestionPipeline, PdfExtractTextExtractor, PipelineRegistry, ProgressTracker};
use retrieval_pipeline::{QueryEnhancer, Reranker, RetrievalEngine};
use session_store::SessionStore;

pub struct Resources {
    pub db: Arc<SurrealDbClient>,
    pub kv: Arc<dyn KvStore>,
    pub openai_client: Arc<Client<OpenAIConfig>>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector_store: Arc<dyn VectorStoreGateway>,
    pub pipelines: PipelineRegistry,
    pub progress: Arc<ProgressTracker>,
    pub session_store: Arc<SessionStore>,
    pub retrieval_engine: Arc<RetrievalEngine>,
    pub evaluation_engine: Arc<EvaluationEngine>,
}

/// Builds every collaborator from `config`. Called once per process; the result is cheap to
/// clone (everything inside is `Arc`) and shared across the HTTP router and the worker loop.
pub async fn build_resources(config: &AppConfig) -> Result<Resources, AppError> {
    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let kv: Arc<dyn KvStore> = Arc::new(
        RedisKvStore::connect(
            &config.redis_host,
            config.redis_port,
            config.redis_db,
            config.redis_password.as_deref(),
        )
        .await?,
    );

    let openai_client = Arc::new(Client::with_config(
        OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedder = build_embedding_provider(config.embedding_backend, config.embedding_dimension).await?;

    let vector_store: Arc<dyn VectorStoreGateway> =
        Arc::new(SurrealVectorStore::new(db.clone(), config.vector_collection.clone()));
    vector_store.ensure_collection(embedder.dimension()).await?;

    let extractor = Arc::new(PdfExtractTextExtractor);

    let recursive_chunker: Arc<dyn Chunker> = Arc::new(RecursiveOverlapChunker::new(
        config.chunk_size,
        config.chunk_overlap_ratio,
    ));
    let semantic_chunker: Arc<dyn Chunker> = Arc::new(SemanticChunker::new(
        Arc::new(LlmPropositionizer::new(
            openai_client.clone(),
            config.chat_model.clone(),
        )),
        embedder.clone(),
        config.semantic_buffer_size,
        config.semantic_breakpoint_percentile,
    ));

    let mut pipelines = PipelineRegistry::new();
    pipelines.insert(
        PipelineType::RecursiveOverlap,
        Arc::new(IngestionPipeline::new(
            extractor.clone(),
            recursive_chunker,
            embedder.clone(),
            vector_store.clone(),
        )),
    );
    pipelines.insert(
        PipelineType::Semantic,
        Arc::new(IngestionPipeline::new(
            extractor.clone(),
            semantic_chunker,
            embedder.clone(),
            vector_store.clone(),
        )),
    );

    let progress = Arc::new(ProgressTracker::new(kv.clone(), config.job_ttl_secs));

    let session_store = Arc::new(SessionStore::new(
        kv.clone(),
        db.clone(),
        config.session_expiry_minutes * 60,
    ));

    let query_enhancer = Arc::new(QueryEnhancer::new(openai_client.clone(), config.chat_model.clone()));
    let reranker = Arc::new(Reranker::new(openai_client.clone(), config.chat_model.clone()));
    let retrieval_engine = Arc::new(RetrievalEngine::new(
        vector_store.clone(),
        embedder.clone(),
        query_enhancer,
        reranker,
    ));

    let evaluation_engine = Arc::new(EvaluationEngine::new(
        db.clone(),
        extractor,
        retrieval_engine.clone(),
        openai_client.clone(),
        config.chat_model.clone(),
    ));

    Ok(Resources {
        db,
        kv,
        openai_client,
        embedder,
        vector_store,
        pipelines,
        progress,
        session_store,
        retrieval_engine,
        evaluation_engine,
    })
}
