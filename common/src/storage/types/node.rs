use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata carried through from the source document, unchanged by chunking or embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeMetadata {
    pub source: String,
    pub chunk_index: usize,
    pub length_chars: usize,
}

/// A leaf in the vector store: one embedded chunk plus a reference to its parent document.
/// All nodes sharing a `source` share the same `parent_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub text: String,
    pub metadata: NodeMetadata,
}

impl Node {
    #[must_use]
    pub fn new(parent_id: Uuid, text: String, metadata: NodeMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id,
            text,
            metadata,
        }
    }
}
