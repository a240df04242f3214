//! Splits a document's text into retrieval-sized pieces (§4.1).
//!
//! Two interchangeable strategies share one `Chunker` trait, dispatched per ingestion job
//! (§9 "Polymorphism over chunker / pipeline" — a closed sum type chosen per job, not an
//! inheritance hierarchy).

mod recursive;
mod semantic;

pub use recursive::RecursiveOverlapChunker;
pub use semantic::{LlmPropositionizer, Propositionizer, SemanticChunker};

use async_trait::async_trait;
use common::error::AppError;

/// Input to a chunking pass: one document's extracted text and the source path it came from.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub source: String,
    pub text: String,
}

/// One retrieval-sized fragment. Invariant: `length_chars == text.chars().count()` and `text`
/// is non-empty after trimming (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source: String,
    pub length_chars: usize,
    pub text: String,
}

impl Chunk {
    #[must_use]
    pub fn new(source: String, text: String) -> Self {
        let length_chars = text.chars().count();
        Self {
            source,
            length_chars,
            text,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChunkResponse {
    pub chunks: Vec<Chunk>,
}

/// Implemented by both chunking strategies. Empty input yields an empty response, never an
/// error (§4.1 "Failure modes").
#[async_trait]
pub trait Chunker: Send + Sync {
    async fn chunk(&self, request: ChunkRequest) -> Result<ChunkResponse, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_new_computes_length_from_char_count() {
        let chunk = Chunk::new("doc.pdf".to_string(), "héllo".to_string());
        assert_eq!(chunk.length_chars, 5);
    }
}
