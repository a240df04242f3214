use async_trait::async_trait;
use common::error::AppError;

use crate::{Chunk, ChunkRequest, ChunkResponse, Chunker};

/// Separator hierarchy tried from coarsest to finest (§4.1).
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Default chunker. Recursively tries the separator hierarchy, greedily packing pieces into
/// a buffer until it would exceed `chunk_size`, then flushes. A piece that alone exceeds
/// `chunk_size` is recursed into the next separator level; at the deepest level text is
/// hard-sliced at `chunk_size`. Overlap is applied as a second pass over the base chunks.
pub struct RecursiveOverlapChunker {
    chunk_size: usize,
    chunk_overlap_ratio: f64,
}

impl RecursiveOverlapChunker {
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap_ratio: f64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap_ratio: chunk_overlap_ratio.clamp(0.0, 0.999),
        }
    }

    fn overlap_chars(&self) -> usize {
        (self.chunk_size as f64 * self.chunk_overlap_ratio).floor() as usize
    }

    /// Produces the base chunks (no overlap yet) for one document's text.
    fn base_chunks(&self, text: &str) -> Vec<String> {
        split_level(text, self.chunk_size, 0)
    }

    /// Prepends the tail of each preceding *final* chunk to the next one, per §4.1.
    fn apply_overlap(&self, base: Vec<String>) -> Vec<String> {
        let overlap = self.overlap_chars();
        if overlap == 0 || base.len() < 2 {
            return base;
        }

        let mut result: Vec<String> = Vec::with_capacity(base.len());
        for (idx, piece) in base.into_iter().enumerate() {
            if idx == 0 {
                result.push(piece);
                continue;
            }
            let Some(previous) = result.last() else {
                result.push(piece);
                continue;
            };
            let mut combined = take_last_chars(previous, overlap);
            combined.push_str(&piece);
            if combined.chars().count() > self.chunk_size {
                combined = take_last_chars(&combined, self.chunk_size);
            }
            result.push(combined);
        }
        result
    }
}

#[async_trait]
impl Chunker for RecursiveOverlapChunker {
    async fn chunk(&self, request: ChunkRequest) -> Result<ChunkResponse, AppError> {
        let trimmed = request.text.trim();
        if trimmed.is_empty() {
            return Ok(ChunkResponse::default());
        }

        let base = self.base_chunks(trimmed);
        let overlapped = self.apply_overlap(base);

        let chunks = overlapped
            .into_iter()
            .filter(|piece| !piece.trim().is_empty())
            .map(|piece| Chunk::new(request.source.clone(), piece))
            .collect();

        Ok(ChunkResponse { chunks })
    }
}

fn split_level(text: &str, chunk_size: usize, separator_idx: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() <= chunk_size {
        return vec![trimmed.to_string()];
    }
    let Some(separator) = SEPARATORS.get(separator_idx) else {
        return hard_slice(trimmed, chunk_size);
    };

    let pieces: Vec<&str> = trimmed.split(separator).collect();
    let mut output = Vec::new();
    let mut buffer = String::new();

    for piece in pieces {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }

        let candidate_len = if buffer.is_empty() {
            piece.chars().count()
        } else {
            buffer.chars().count() + separator.chars().count() + piece.chars().count()
        };

        if candidate_len <= chunk_size {
            if !buffer.is_empty() {
                buffer.push_str(separator);
            }
            buffer.push_str(piece);
            continue;
        }

        if !buffer.is_empty() {
            output.push(std::mem::take(&mut buffer));
        }

        if piece.chars().count() > chunk_size {
            output.extend(split_level(piece, chunk_size, separator_idx + 1));
        } else {
            buffer = piece.to_string();
        }
    }

    if !buffer.is_empty() {
        output.push(buffer);
    }

    output
}

fn hard_slice(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size.max(1))
        .map(|slice| slice.iter().collect())
        .collect()
}

fn take_last_chars(text: &str, n: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= n {
        return text.to_string();
    }
    text.chars().skip(char_count - n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_input_yields_empty_response() {
        let chunker = RecursiveOverlapChunker::new(100, 0.1);
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
    async fn every_chunk_is_within_bounds() {
        let chunker = RecursiveOverlapChunker::new(50, 0.1);
        let text = "Paragraph one is here.\n\nParagraph two follows with more words to pad it out nicely.\n\nAnd a third paragraph rounds things off.".repeat(3);
        let response = chunker
            .chunk(ChunkRequest {
                source: "doc.pdf".to_string(),
                text,
            })
            .await
            .unwrap();

        assert!(!response.chunks.is_empty());
        for chunk in &response.chunks {
            assert!(!chunk.text.is_empty());
            assert!(chunk.length_chars <= 50);
            assert_eq!(chunk.length_chars, chunk.text.chars().count());
        }
    }

    #[tokio::test]
    async fn zero_overlap_chunks_are_a_subsequence_of_input() {
        let chunker = RecursiveOverlapChunker::new(20, 0.0);
        let text = "one two three four five six seven eight nine ten";
        let response = chunker
            .chunk(ChunkRequest {
                source: "doc.pdf".to_string(),
                text: text.to_string(),
            })
            .await
            .unwrap();

        let reconstructed: String = response
            .chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let stripped: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let reconstructed_stripped: String =
            reconstructed.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(stripped, reconstructed_stripped);
    }

    #[tokio::test]
    async fn hard_slice_handles_single_long_token() {
        let chunker = RecursiveOverlapChunker::new(10, 0.0);
        let text = "a".repeat(35);
        let response = chunker
            .chunk(ChunkRequest {
                source: "doc.pdf".to_string(),
                text,
            })
            .await
            .unwrap();

        assert_eq!(response.chunks.len(), 4);
        for chunk in &response.chunks {
            assert!(chunk.length_chars <= 10);
        }
    }

    #[tokio::test]
    async fn overlap_prepends_previous_tail() {
        let chunker = RecursiveOverlapChunker::new(10, 0.5);
        let text = "aaaaaaaaaa bbbbbbbbbb";
        let response = chunker
            .chunk(ChunkRequest {
                source: "doc.pdf".to_string(),
                text: text.to_string(),
            })
            .await
            .unwrap();

        assert!(response.chunks.len() >= 2);
        assert!(response.chunks[1].text.starts_with('a'));
    }
}
