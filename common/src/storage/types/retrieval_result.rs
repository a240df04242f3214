use serde::{Deserialize, Serialize};

/// Metadata recorded on every retrieval result describing how it was produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RetrievalResultMetadata {
    pub enhanced: bool,
    pub reranked: bool,
}

/// One chunk returned from `RetrievalEngine::retrieve`. `score` is `None` once reranking has
/// reordered the pool, since the upstream similarity score no longer reflects the final order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub text: String,
    pub source: String,
    pub score: Option<f32>,
    pub metadata: RetrievalResultMetadata,
}
