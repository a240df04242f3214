//! Multi-query retrieval with optional enhancement and reranking (§4.9).

use std::sync::Arc;

use common::{
    error::AppError,
    storage::{types::retrieval_result::RetrievalResultMetadata, vector_store::VectorStoreGateway},
    utils::embedding::EmbeddingProvider,
};
use tracing::warn;

use crate::{query_enhancer::QueryExpander, reranker::DocumentReranker};

pub use common::storage::types::retrieval_result::RetrievalResult;

/// At most this many query variants are ever embedded and searched, even if the expander
/// returns more (§4.9 "original plus up to two enhancements").
const MAX_QUERIES: usize = 3;

pub struct RetrievalEngine {
    vector_store: Arc<dyn VectorStoreGateway>,
    embedder: Arc<dyn EmbeddingProvider>,
    query_expander: Arc<dyn QueryExpander>,
    reranker: Arc<dyn DocumentReranker>,
}

impl RetrievalEngine {
    #[must_use]
    pub fn new(
        vector_store: Arc<dyn VectorStoreGateway>,
        embedder: Arc<dyn EmbeddingProvider>,
        query_expander: Arc<dyn QueryExpander>,
        reranker: Arc<dyn DocumentReranker>,
    ) -> Self {
        Self {
            vector_store,
            embedder,
            query_expander,
            reranker,
        }
    }

    /// Runs one retrieval for `question`. When `use_query_enhancer` is set, searches run
    /// against the original question plus up to two LLM-generated variants, each at a reduced
    /// per-query `k`, and results are deduplicated by exact chunk text before the pool is
    /// truncated (or reranked) down to `top_k` (§4.9).
    #[tracing::instrument(skip(self))]
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        use_query_enhancer: bool,
        use_reranking: bool,
    ) -> Result<Vec<RetrievalResult>, AppError> {
        let queries = if use_query_enhancer {
            let mut variants = self.query_expander.enhance(question).await;
            variants.truncate(MAX_QUERIES);
            variants
        } else {
            vec![question.to_string()]
        };

        let per_query_k = per_query_k(top_k, queries.len(), use_reranking);

        let mut pool_docs = Vec::new();
        let mut pool_sources = Vec::new();
        let mut pool_scores = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for query in &queries {
            let hits = match self.search_one(query, per_query_k).await {
                Ok(hits) => hits,
                Err(err) => {
                    warn!(query, error = %err, "retrieval query failed; skipping");
                    continue;
                }
            };
            for hit in hits {
                if seen.insert(hit.text.clone()) {
                    pool_docs.push(hit.text);
                    pool_sources.push(hit.source);
                    pool_scores.push(hit.score);
                }
            }
        }

        let enhanced = use_query_enhancer;

        if pool_docs.is_empty() {
            return Ok(Vec::new());
        }

        if use_reranking {
            let (docs, sources) = self
                .reranker
                .rerank(question, &pool_docs, &pool_sources, top_k)
                .await;
            return Ok(docs
                .into_iter()
                .zip(sources)
                .map(|(text, source)| RetrievalResult {
                    text,
                    source,
                    score: None,
                    metadata: RetrievalResultMetadata {
                        enhanced,
                        reranked: true,
                    },
                })
                .collect());
        }

        let k = top_k.min(pool_docs.len());
        let score_is_meaningful = queries.len() == 1;
        Ok((0..k)
            .map(|i| RetrievalResult {
                text: pool_docs[i].clone(),
                source: pool_sources[i].clone(),
                score: score_is_meaningful.then_some(pool_scores[i]),
                metadata: RetrievalResultMetadata {
                    enhanced,
                    reranked: false,
                },
            })
            .collect())
    }

    async fn search_one(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<common::storage::vector_store::SearchHit>, AppError> {
        let vector = self.embedder.embed(query).await?;
        self.vector_store.search(&vector, k).await
    }
}

/// Per-query `k` so that a multi-query fan-out still yields roughly `top_k` candidates after
/// dedup, generous enough to survive reranking's need for a wider pool (§4.9).
fn per_query_k(top_k: usize, num_queries: usize, use_reranking: bool) -> usize {
    let num_queries = num_queries.max(1);
    if use_reranking {
        (top_k / num_queries * 2).max(4)
    } else {
        (top_k / num_queries).max(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_enhancer::fake::FixedExpander;
    use crate::reranker::fake::ReversingReranker;
    use common::storage::types::node::{Node, NodeMetadata};
    use common::storage::vector_store::fake::FakeVectorStore;
    use common::utils::embedding::HashedEmbeddingProvider;
    use uuid::Uuid;

    async fn seeded_store() -> Arc<FakeVectorStore> {
        let store = Arc::new(FakeVectorStore::new());
        let embedder = HashedEmbeddingProvider::new(16);
        let mut nodes = Vec::new();
        for (text, source) in [
            ("alpha clause about liability", "doc-a.pdf"),
            ("beta clause about indemnification", "doc-b.pdf"),
            ("gamma clause about termination", "doc-c.pdf"),
        ] {
            let parent_id = Uuid::new_v4();
            let node = Node::new(
                parent_id,
                text.to_string(),
                NodeMetadata {
                    source: source.to_string(),
                    chunk_index: 0,
                    length_chars: text.len(),
                },
            );
            let vector = embedder.embed(text).await.unwrap();
            nodes.push((node, vector));
        }
        store.upsert(&nodes).await.unwrap();
        store
    }

    fn engine(store: Arc<FakeVectorStore>) -> RetrievalEngine {
        RetrievalEngine::new(
            store,
            Arc::new(HashedEmbeddingProvider::new(16)),
            Arc::new(FixedExpander::identity()),
            Arc::new(ReversingReranker),
        )
    }

    #[tokio::test]
    async fn plain_retrieval_keeps_scores_and_marks_metadata_false() {
        let store = seeded_store().await;
        let engine = engine(store);
        let results = engine.retrieve("liability clause", 2, false, false).await.unwrap();
        assert!(!results.is_empty());
        for r in &results {
            assert!(r.score.is_some());
            assert!(!r.metadata.enhanced);
            assert!(!r.metadata.reranked);
        }
    }

    #[tokio::test]
    async fn reranking_clears_scores_and_marks_metadata_true() {
        let store = seeded_store().await;
        let engine = engine(store);
        let results = engine.retrieve("termination clause", 2, false, true).await.unwrap();
        assert!(!results.is_empty());
        for r in &results {
            assert!(r.score.is_none());
            assert!(r.metadata.reranked);
        }
    }

    #[tokio::test]
    async fn enhancement_marks_metadata_enhanced() {
        let store = seeded_store().await;
        let vector_store = store.clone();
        let engine = RetrievalEngine::new(
            vector_store,
            Arc::new(HashedEmbeddingProvider::new(16)),
            Arc::new(FixedExpander::new(vec!["indemnification".to_string()])),
            Arc::new(ReversingReranker),
        );
        let results = engine.retrieve("liability", 3, true, false).await.unwrap();
        assert!(!results.is_empty());
        for r in &results {
            assert!(r.metadata.enhanced);
        }
    }

    #[tokio::test]
    async fn empty_store_returns_empty_results() {
        let store = Arc::new(FakeVectorStore::new());
        let engine = engine(store);
        let results = engine.retrieve("anything", 5, false, false).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn per_query_k_never_drops_below_floor() {
        assert_eq!(per_query_k(5, 3, false), 2);
        assert_eq!(per_query_k(5, 3, true), 4);
        assert_eq!(per_query_k(20, 2, true), 20);
    }
}
