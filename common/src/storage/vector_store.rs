use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{db::SurrealDbClient, types::node::Node};
use crate::error::AppError;

/// One hit from `VectorStoreGateway::search`, ordered highest-score first (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub node_id: Uuid,
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// A thin contract over the external vector DB with a single configured collection (§4.3).
/// Implementations must tolerate concurrent writers and return fewer than `top_k` results
/// when the store holds fewer vectors than requested.
#[async_trait]
pub trait VectorStoreGateway: Send + Sync {
    /// Idempotent: safe to call on every process start.
    async fn ensure_collection(&self, dimension: usize) -> Result<(), AppError>;

    /// Writes (id, vector, payload) tuples. Nodes sharing a `source` were produced by the
    /// same `NodeBuilder` call and carry its `parent_id`.
    async fn upsert(&self, nodes: &[(Node, Vec<f32>)]) -> Result<(), AppError>;

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, AppError>;

    async fn count(&self) -> Result<u64, AppError>;
}

/// Row shape actually persisted in SurrealDB's `node` table: the `Node` payload plus its
/// embedding, flattened so the HNSW index can sit directly on the `embedding` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRow {
    id: String,
    parent_id: String,
    text: String,
    source: String,
    chunk_index: usize,
    length_chars: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ScoredRow {
    id: surrealdb::sql::Thing,
    text: String,
    source: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: u64,
}

/// SurrealDB-backed `VectorStoreGateway`, grounded on the teacher's HNSW usage in
/// `common/src/storage/types/text_chunk.rs` (`DEFINE INDEX ... HNSW DIMENSION` plus the
/// `vector::similarity::cosine` operator), generalized to the `node` table this spec uses.
pub struct SurrealVectorStore {
    db: Arc<SurrealDbClient>,
    table: String,
    index_name: String,
}

impl SurrealVectorStore {
    pub fn new(db: Arc<SurrealDbClient>, collection: impl Into<String>) -> Self {
        let table = collection.into();
        let index_name = format!("idx_{table}_embedding");
        Self {
            db,
            table,
            index_name,
        }
    }
}

#[async_trait]
impl VectorStoreGateway for SurrealVectorStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), AppError> {
        let query = format!(
            "DEFINE INDEX IF NOT EXISTS {idx} ON TABLE {table} FIELDS embedding HNSW DIMENSION {dimension} DIST COSINE",
            idx = self.index_name,
            table = self.table,
        );
        self.db.client.query(query).await?;
        Ok(())
    }

    async fn upsert(&self, nodes: &[(Node, Vec<f32>)]) -> Result<(), AppError> {
        for (node, embedding) in nodes {
            let row = NodeRow {
                id: node.id.to_string(),
                parent_id: node.parent_id.to_string(),
                text: node.text.clone(),
                source: node.metadata.source.clone(),
                chunk_index: node.metadata.chunk_index,
                length_chars: node.metadata.length_chars,
                embedding: embedding.clone(),
            };
            self.db
                .client
                .upsert((self.table.as_str(), node.id.to_string()))
                .content(row)
                .await?;
        }
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, AppError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT id, text, source, vector::similarity::cosine(embedding, $qv) AS score \
             FROM {table} WHERE embedding <|{top_k},40|> $qv ORDER BY score DESC LIMIT $limit",
            table = self.table,
        );
        let mut response = self
            .db
            .client
            .query(query)
            .bind(("qv", query_vector.to_vec()))
            .bind(("limit", top_k as i64))
            .await?;
        let rows: Vec<ScoredRow> = response.take(0)?;
        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                node_id: Uuid::parse_str(&row.id.id.to_raw()).unwrap_or_else(|_| Uuid::nil()),
                text: row.text,
                source: row.source,
                score: row.score,
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, AppError> {
        let query = format!("SELECT count() FROM {table} GROUP ALL", table = self.table);
        let mut response = self.db.client.query(query).await?;
        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map(|r| r.count).unwrap_or(0))
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::{AppError, Node, SearchHit, VectorStoreGateway};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// In-memory, brute-force cosine-similarity store for unit tests that exercise
    /// `RetrievalEngine`/`IngestionPipeline` without a real SurrealDB instance.
    #[derive(Default)]
    pub struct FakeVectorStore {
        rows: Mutex<Vec<(Node, Vec<f32>)>>,
    }

    impl FakeVectorStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }

    #[async_trait]
    impl VectorStoreGateway for FakeVectorStore {
        async fn ensure_collection(&self, _dimension: usize) -> Result<(), AppError> {
            Ok(())
        }

        async fn upsert(&self, nodes: &[(Node, Vec<f32>)]) -> Result<(), AppError> {
            let mut rows = self.rows.lock().await;
            rows.extend(nodes.iter().cloned());
            Ok(())
        }

        async fn search(
            &self,
            query_vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<SearchHit>, AppError> {
            let rows = self.rows.lock().await;
            let mut scored: Vec<SearchHit> = rows
                .iter()
                .map(|(node, vector)| SearchHit {
                    node_id: node.id,
                    text: node.text.clone(),
                    source: node.metadata.source.clone(),
                    score: cosine(query_vector, vector),
                })
                .collect();
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(top_k);
            Ok(scored)
        }

        async fn count(&self) -> Result<u64, AppError> {
            Ok(self.rows.lock().await.len() as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeVectorStore;
    use super::*;
    use crate::storage::types::node::NodeMetadata;

    #[tokio::test]
    async fn fake_store_returns_top_k_by_cosine() {
        let store = FakeVectorStore::new();
        let make_node = |text: &str| {
            Node::new(
                Uuid::new_v4(),
                text.to_string(),
                NodeMetadata {
                    source: "doc.pdf".to_string(),
                    chunk_index: 0,
                    length_chars: text.len(),
                },
            )
        };

        store
            .upsert(&[
                (make_node("a"), vec![1.0, 0.0]),
                (make_node("b"), vec![0.0, 1.0]),
                (make_node("c"), vec![0.9, 0.1]),
            ])
            .await
            .expect("upsert failed");

        let hits = store.search(&[1.0, 0.0], 2).await.expect("search failed");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn fake_store_count_tracks_upserts() {
        let store = FakeVectorStore::new();
        assert_eq!(store.count().await.unwrap(), 0);
        let node = Node::new(
            Uuid::new_v4(),
            "text".to_string(),
            NodeMetadata {
                source: "doc.pdf".to_string(),
                chunk_index: 0,
                length_chars: 4,
            },
        );
        store.upsert(&[(node, vec![1.0])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
