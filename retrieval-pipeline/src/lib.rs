//! QueryEnhancer -> multi-query vector search -> optional Reranker (§4.7–§4.9).

pub mod engine;
pub mod query_enhancer;
pub mod reranker;

pub use engine::{RetrievalEngine, RetrievalResult};
pub use query_enhancer::QueryEnhancer;
pub use reranker::Reranker;
