use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use common::{error::AppError, utils::embedding::EmbeddingProvider, utils::llm_json::chat_json};
use serde_json::json;
use tracing::warn;

use crate::{Chunk, ChunkRequest, ChunkResponse, Chunker};

const PROPOSITIONIZER_SYSTEM_MESSAGE: &str = "Decompose the user's text into a list of \
atomic, self-contained factual statements (propositions). Preserve the original wording where \
possible. Return them in reading order.";

/// Decomposes a document's text into atomic statements (§4.1 semantic chunker). Implemented
/// as an external seq-to-seq model call; unparseable outputs are a soft failure (the caller
/// falls back to sentence-splitting the raw text).
#[async_trait]
pub trait Propositionizer: Send + Sync {
    async fn propositionize(&self, text: &str) -> Result<Vec<String>, AppError>;
}

/// LLM-backed propositionizer, grounded on the structured-JSON pattern every other
/// LLM-backed collaborator in this workspace uses (`common::utils::llm_json::chat_json`).
pub struct LlmPropositionizer {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl LlmPropositionizer {
    #[must_use]
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl Propositionizer for LlmPropositionizer {
    async fn propositionize(&self, text: &str) -> Result<Vec<String>, AppError> {
        let schema = json!({
            "type": "object",
            "properties": {
                "propositions": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["propositions"],
            "additionalProperties": false
        });

        let value = chat_json(
            &self.client,
            &self.model,
            PROPOSITIONIZER_SYSTEM_MESSAGE,
            text,
            "propositions",
            schema,
        )
        .await?;

        let propositions = value
            .get("propositions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AppError::LLMParsing("propositions field missing".to_string()))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        Ok(propositions)
    }
}

/// Splits a block of text into sentences on `.`/`?`/`!` followed by whitespace. Deliberately
/// simple: the propositionizer has already normalized the text into short factual statements,
/// so this only needs to separate statements that still contain more than one sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '?' | '!') {
            let next_is_boundary = chars.peek().map_or(true, |c| c.is_whitespace());
            if next_is_boundary {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }
    }
    let trailing = current.trim();
    if !trailing.is_empty() {
        sentences.push(trailing.to_string());
    }
    sentences
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    1.0 - (dot / (norm_a * norm_b))
}

/// Linear-interpolated percentile over a copy of `values` (nearest-rank would also satisfy
/// §4.1; interpolation is the more common definition and matches what "85th percentile"
/// usually means to a reader).
fn percentile(values: &[f32], pct: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower.min(sorted.len() - 1)];
    }
    let frac = (rank - lower as f64) as f32;
    let lower_val = sorted[lower.min(sorted.len() - 1)];
    let upper_val = sorted[upper.min(sorted.len() - 1)];
    lower_val + (upper_val - lower_val) * frac
}

/// Breakpoint-based chunker (§4.1). Decomposes text into atomic statements via an external
/// propositionizer, splits those into sentences, embeds a sliding window around each
/// sentence, and cuts wherever the cosine distance between adjacent windows exceeds a
/// percentile threshold over the whole document.
pub struct SemanticChunker {
    propositionizer: Arc<dyn Propositionizer>,
    embedder: Arc<dyn EmbeddingProvider>,
    buffer_size: usize,
    breakpoint_percentile: f64,
}

impl SemanticChunker {
    #[must_use]
    pub fn new(
        propositionizer: Arc<dyn Propositionizer>,
        embedder: Arc<dyn EmbeddingProvider>,
        buffer_size: usize,
        breakpoint_percentile: f64,
    ) -> Self {
        Self {
            propositionizer,
            embedder,
            buffer_size: buffer_size.max(1),
            breakpoint_percentile: breakpoint_percentile.clamp(0.0, 100.0),
        }
    }

    fn window(&self, sentences: &[String], index: usize) -> String {
        let start = index.saturating_sub(self.buffer_size);
        let end = (index + self.buffer_size + 1).min(sentences.len());
        sentences[start..end].join(" ")
    }
}

#[async_trait]
impl Chunker for SemanticChunker {
    async fn chunk(&self, request: ChunkRequest) -> Result<ChunkResponse, AppError> {
        let trimmed = request.text.trim();
        if trimmed.is_empty() {
            return Ok(ChunkResponse::default());
        }

        let propositions = match self.propositionizer.propositionize(trimmed).await {
            Ok(propositions) if !propositions.is_empty() => propositions,
            Ok(_) => vec![trimmed.to_string()],
            Err(err) => {
                warn!(error = %err, "propositionizer failed; falling back to raw text");
                vec![trimmed.to_string()]
            }
        };

        let sentences: Vec<String> = propositions
            .iter()
            .flat_map(|p| split_sentences(p))
            .collect();

        if sentences.len() <= 1 {
            return Ok(ChunkResponse {
                chunks: sentences
                    .into_iter()
                    .map(|s| Chunk::new(request.source.clone(), s))
                    .collect(),
            });
        }

        let mut windows = Vec::with_capacity(sentences.len());
        for idx in 0..sentences.len() {
            windows.push(self.window(&sentences, idx));
        }

        let embeddings = self.embedder.embed_batch(&windows).await?;

        let distances: Vec<f32> = embeddings
            .windows(2)
            .map(|pair| cosine_distance(&pair[0], &pair[1]))
            .collect();

        let threshold = percentile(&distances, self.breakpoint_percentile);

        let mut breakpoints: Vec<usize> = distances
            .iter()
            .enumerate()
            .filter_map(|(idx, &dist)| (dist > threshold).then_some(idx))
            .collect();
        breakpoints.push(sentences.len() - 1);

        let mut chunks = Vec::new();
        let mut start = 0;
        for &end in &breakpoints {
            let text = sentences[start..=end].join(" ");
            if !text.trim().is_empty() {
                chunks.push(Chunk::new(request.source.clone(), text));
            }
            start = end + 1;
        }

        Ok(ChunkResponse { chunks })
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::{AppError, Propositionizer};
    use async_trait::async_trait;

    /// Splits on sentence punctuation without calling any model; used by tests that exercise
    /// `SemanticChunker`'s windowing/breakpoint logic without a live LLM.
    #[derive(Default)]
    pub struct PassthroughPropositionizer;

    #[async_trait]
    impl Propositionizer for PassthroughPropositionizer {
        async fn propositionize(&self, text: &str) -> Result<Vec<String>, AppError> {
            Ok(vec![text.to_string()])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{fake::PassthroughPropositionizer, *};
    use common::utils::embedding::HashedEmbeddingProvider;

    #[tokio::test]
    async fn empty_input_yields_empty_response() {
        let chunker = SemanticChunker::new(
            Arc::new(PassthroughPropositionizer),
            Arc::new(HashedEmbeddingProvider::new(8)),
            1,
            85.0,
        );
        let response = chunker
            .chunk(ChunkRequest {
                source: "doc.pdf".to_string(),
                text: "   ".to_string(),
            })
            .await
            .unwrap();
        assert!(response.chunks.is_empty());
    }

    #[tokio::test]
    async fn single_sentence_yields_single_chunk() {
        let chunker = SemanticChunker::new(
            Arc::new(PassthroughPropositionizer),
            Arc::new(HashedEmbeddingProvider::new(8)),
            1,
            85.0,
        );
        let response = chunker
            .chunk(ChunkRequest {
                source: "doc.pdf".to_string(),
                text: "Only one sentence here.".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.chunks.len(), 1);
    }

    #[tokio::test]
    async fn multi_sentence_input_produces_nonempty_chunks_covering_all_sentences() {
        let chunker = SemanticChunker::new(
            Arc::new(PassthroughPropositionizer),
            Arc::new(HashedEmbeddingProvider::new(8)),
            1,
            50.0,
        );
        let text = "Contracts require signatures. Parties must be of legal age. \
                     The weather today is sunny and warm. Clouds may arrive by evening.";
        let response = chunker
            .chunk(ChunkRequest {
                source: "doc.pdf".to_string(),
                text: text.to_string(),
            })
            .await
            .unwrap();

        assert!(!response.chunks.is_empty());
        for chunk in &response.chunks {
            assert!(!chunk.text.trim().is_empty());
        }
    }

    #[test]
    fn percentile_of_uniform_values_is_that_value() {
        let values = vec![1.0, 1.0, 1.0];
        assert!((percentile(&values, 85.0) - 1.0).abs() < f32::EPSILON);
    }
}
