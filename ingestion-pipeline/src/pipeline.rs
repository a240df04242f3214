//! Per-document ingestion: extract -> chunk -> build nodes -> embed -> upsert (§4.4).

use std::{collections::HashMap, path::Path, sync::Arc};

use chunker::{ChunkRequest, Chunker};
use common::{
    error::AppError,
    storage::{types::node::Node, vector_store::VectorStoreGateway},
    utils::embedding::EmbeddingProvider,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{node_builder::build_nodes, pdf_extraction::PdfExtractor};

/// Outcome of ingesting one document (§4.4). A failure at any step returns `success: false`
/// with `error` populated and the remaining steps skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionResult {
    pub success: bool,
    pub file_path: String,
    pub character_count: usize,
    pub chunk_count: usize,
    pub node_count: usize,
    pub error: Option<String>,
}

impl IngestionResult {
    fn failure(file_path: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            file_path: file_path.to_string(),
            character_count: 0,
            chunk_count: 0,
            node_count: 0,
            error: Some(error.into()),
        }
    }
}

pub struct IngestionPipeline {
    extractor: Arc<dyn PdfExtractor>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStoreGateway>,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStoreGateway>,
    ) -> Self {
        Self {
            extractor,
            chunker,
            embedder,
            vector_store,
        }
    }

    #[tracing::instrument(skip(self), fields(file = %file_path.display()))]
    pub async fn ingest_file(&self, file_path: &Path) -> IngestionResult {
        let path_str = file_path.to_string_lossy().to_string();

        let text = match self.extractor.extract_text(file_path).await {
            Ok(text) => text,
            Err(err) => {
                warn!(file = %path_str, error = %err, phase = "extract", "ingestion failed");
                return IngestionResult::failure(&path_str, format!("extract: {err}"));
            }
        };

        if text.trim().is_empty() {
            return IngestionResult::failure(&path_str, "no content");
        }
        let character_count = text.chars().count();

        let chunk_response = match self
            .chunker
            .chunk(ChunkRequest {
                source: path_str.clone(),
                text: text.clone(),
            })
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(file = %path_str, error = %err, phase = "chunk", "ingestion failed");
                return IngestionResult::failure(&path_str, format!("chunk: {err}"));
            }
        };
        let chunk_count = chunk_response.chunks.len();

        let mut full_text_by_source = HashMap::new();
        full_text_by_source.insert(path_str.clone(), text);
        let (nodes, _parents) = build_nodes(chunk_response.chunks, &full_text_by_source);

        let embedded = match self.embed_nodes(nodes).await {
            Ok(embedded) => embedded,
            Err(err) => {
                warn!(file = %path_str, error = %err, phase = "embed", "ingestion failed");
                return IngestionResult::failure(&path_str, format!("embed: {err}"));
            }
        };
        let node_count = embedded.len();

        if let Err(err) = self.vector_store.upsert(&embedded).await {
            warn!(file = %path_str, error = %err, phase = "upsert", "ingestion failed");
            return IngestionResult::failure(&path_str, format!("upsert: {err}"));
        }

        info!(file = %path_str, chunk_count, node_count, "ingested document");
        IngestionResult {
            success: true,
            file_path: path_str,
            character_count,
            chunk_count,
            node_count,
            error: None,
        }
    }

    async fn embed_nodes(&self, nodes: Vec<Node>) -> Result<Vec<(Node, Vec<f32>)>, AppError> {
        let texts: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        Ok(nodes.into_iter().zip(vectors).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunker::RecursiveOverlapChunker;
    use common::{storage::vector_store::fake::FakeVectorStore, utils::embedding::HashedEmbeddingProvider};
    use std::path::PathBuf;

    use crate::pdf_extraction::fake::FakePdfExtractor;

    fn pipeline(
        extractor: Arc<FakePdfExtractor>,
        vector_store: Arc<FakeVectorStore>,
    ) -> IngestionPipeline {
        IngestionPipeline::new(
            extractor,
            Arc::new(RecursiveOverlapChunker::new(200, 0.1)),
            Arc::new(HashedEmbeddingProvider::new(16)),
            vector_store,
        )
    }

    #[tokio::test]
    async fn empty_extraction_is_a_no_content_failure() {
        let extractor = Arc::new(FakePdfExtractor::new());
        extractor.seed("empty.pdf", "   ");
        let pipeline = pipeline(extractor, Arc::new(FakeVectorStore::new()));

        let result = pipeline.ingest_file(&PathBuf::from("empty.pdf")).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("no content"));
    }

    #[tokio::test]
    async fn successful_ingest_reports_counts() {
        let extractor = Arc::new(FakePdfExtractor::new());
        extractor.seed(
            "doc.pdf",
            "Clause one establishes obligations.\n\nClause two establishes remedies.",
        );
        let vector_store = Arc::new(FakeVectorStore::new());
        let pipeline = pipeline(extractor, vector_store.clone());

        let result = pipeline.ingest_file(&PathBuf::from("doc.pdf")).await;
        assert!(result.success);
        assert!(result.chunk_count > 0);
        assert_eq!(result.node_count, result.chunk_count);
        assert!(result.character_count > 0);
        assert_eq!(vector_store.count().await.unwrap() as usize, result.node_count);
    }
}
