//! LLM-backed reranking (§4.8). The model scores a pool of already-retrieved passages against
//! the original question; anything the model can't parse degrades to the input order,
//! truncated to `top_k`, same as `QueryEnhancer`'s degrade policy.

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use common::error::AppError;
use common::utils::llm_json::chat_json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

/// Seam between `RetrievalEngine` and reranking, so tests can swap in a fixed reorder
/// instead of exercising the real LLM call.
#[async_trait]
pub trait DocumentReranker: Send + Sync {
    async fn rerank(
        &self,
        question: &str,
        docs: &[String],
        sources: &[String],
        top_k: usize,
    ) -> (Vec<String>, Vec<String>);
}

/// Reranking never looks at more than this many candidates in one call (§4.8).
const MAX_CANDIDATES: usize = 20;
/// Each candidate's text is truncated to this many characters before being placed in the
/// prompt, to keep the reranking call's token cost bounded (§4.8).
const MAX_DOC_CHARS: usize = 500;

const SYSTEM_MESSAGE: &str = "You rerank passages retrieved from a legal-document corpus by \
their relevance to a question. Score every passage from 0.0 (irrelevant) to 1.0 (directly \
answers the question). Return every input index exactly once.";

#[derive(Debug, Deserialize)]
struct RankedDocument {
    index: usize,
    relevance_score: f32,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    ranked_documents: Vec<RankedDocument>,
}

pub struct Reranker {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl Reranker {
    #[must_use]
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    /// Reranks `(doc, source)` pairs against `question`, returning the top `top_k` in
    /// descending relevance order. Candidates beyond `MAX_CANDIDATES` are dropped before
    /// scoring, not after (§4.8 "cap the candidate pool").
    pub async fn rerank(
        &self,
        question: &str,
        docs: &[String],
        sources: &[String],
        top_k: usize,
    ) -> (Vec<String>, Vec<String>) {
        let n = docs.len().min(sources.len()).min(MAX_CANDIDATES);
        let docs = &docs[..n];
        let sources = &sources[..n];

        match self.try_rerank(question, docs).await {
            Ok(order) => {
                let mut out_docs = Vec::with_capacity(top_k);
                let mut out_sources = Vec::with_capacity(top_k);
                for idx in order.into_iter().take(top_k) {
                    if let (Some(d), Some(s)) = (docs.get(idx), sources.get(idx)) {
                        out_docs.push(d.clone());
                        out_sources.push(s.clone());
                    }
                }
                (out_docs, out_sources)
            }
            Err(err) => {
                warn!(error = %err, "reranking failed; falling back to retrieval order");
                let k = top_k.min(n);
                (docs[..k].to_vec(), sources[..k].to_vec())
            }
        }
    }

    /// Returns the indices into `docs`, sorted by descending LLM-assigned relevance score.
    async fn try_rerank(&self, question: &str, docs: &[String]) -> Result<Vec<usize>, AppError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let mut prompt = format!("Question: {question}\n\nPassages:\n");
        for (idx, doc) in docs.iter().enumerate() {
            let truncated: String = doc.chars().take(MAX_DOC_CHARS).collect();
            prompt.push_str(&format!("[{idx}] {truncated}\n\n"));
        }

        let schema = json!({
            "type": "object",
            "properties": {
                "ranked_documents": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "index": { "type": "integer" },
                            "relevance_score": { "type": "number" },
                            "reasoning": { "type": "string" }
                        },
                        "required": ["index", "relevance_score"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["ranked_documents"],
            "additionalProperties": false
        });

        let value = chat_json(
            &self.client,
            &self.model,
            SYSTEM_MESSAGE,
            &prompt,
            "ranked_documents",
            schema,
        )
        .await?;

        let mut response: RerankResponse = serde_json::from_value(value)
            .map_err(|err| AppError::LLMParsing(format!("ranked_documents shape: {err}")))?;

        response
            .ranked_documents
            .sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

        Ok(response
            .ranked_documents
            .into_iter()
            .map(|r| r.index)
            .filter(|idx| *idx < docs.len())
            .collect())
    }
}

#[async_trait]
impl DocumentReranker for Reranker {
    async fn rerank(
        &self,
        question: &str,
        docs: &[String],
        sources: &[String],
        top_k: usize,
    ) -> (Vec<String>, Vec<String>) {
        self.rerank(question, docs, sources, top_k).await
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::DocumentReranker;
    use async_trait::async_trait;

    /// Reverses the input order, so tests can tell reranked output apart from pass-through
    /// retrieval order.
    pub struct ReversingReranker;

    #[async_trait]
    impl DocumentReranker for ReversingReranker {
        async fn rerank(
            &self,
            _question: &str,
            docs: &[String],
            sources: &[String],
            top_k: usize,
        ) -> (Vec<String>, Vec<String>) {
            let mut docs = docs.to_vec();
            let mut sources = sources.to_vec();
            docs.reverse();
            sources.reverse();
            docs.truncate(top_k);
            sources.truncate(top_k);
            (docs, sources)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::ReversingReranker;
    use super::DocumentReranker;

    #[tokio::test]
    async fn reversing_reranker_respects_top_k() {
        let reranker = ReversingReranker;
        let docs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let sources = vec!["sa".to_string(), "sb".to_string(), "sc".to_string()];
        let (out_docs, out_sources) = reranker.rerank("q", &docs, &sources, 2).await;
        assert_eq!(out_docs, vec!["c", "b"]);
        assert_eq!(out_sources, vec!["sc", "sb"]);
    }
}
