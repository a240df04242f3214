//! Assigns stable identifiers and attaches source metadata to chunks (§4.2).

use std::collections::HashMap;

use chunker::Chunk;
use common::storage::types::{
    node::{Node, NodeMetadata},
    parent_document::ParentDocument,
};
use uuid::Uuid;

/// Builds leaf nodes and parent documents from ordered chunks plus a `source -> full text`
/// map. One UUID per unique source (the parent), one UUID per chunk (the leaf); every node
/// sharing a source shares that parent's id (§3 invariant).
#[must_use]
pub fn build_nodes(
    chunks: Vec<Chunk>,
    full_text_by_source: &HashMap<String, String>,
) -> (Vec<Node>, Vec<ParentDocument>) {
    let mut parent_ids: HashMap<String, Uuid> = HashMap::new();
    let mut parents = Vec::new();

    let mut nodes = Vec::with_capacity(chunks.len());
    let mut next_index: HashMap<String, usize> = HashMap::new();

    for chunk in chunks {
        let parent_id = *parent_ids.entry(chunk.source.clone()).or_insert_with(|| {
            let id = Uuid::new_v4();
            let text = full_text_by_source
                .get(&chunk.source)
                .cloned()
                .unwrap_or_default();
            parents.push(ParentDocument {
                id,
                source: chunk.source.clone(),
                text,
            });
            id
        });

        let chunk_index = next_index.entry(chunk.source.clone()).or_insert(0);
        let metadata = NodeMetadata {
            source: chunk.source.clone(),
            chunk_index: *chunk_index,
            length_chars: chunk.length_chars,
        };
        *chunk_index += 1;

        nodes.push(Node::new(parent_id, chunk.text, metadata));
    }

    (nodes, parents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_sharing_a_source_share_a_parent_id() {
        let chunks = vec![
            Chunk::new("a.pdf".to_string(), "first".to_string()),
            Chunk::new("a.pdf".to_string(), "second".to_string()),
            Chunk::new("b.pdf".to_string(), "third".to_string()),
        ];
        let mut full_text = HashMap::new();
        full_text.insert("a.pdf".to_string(), "first second".to_string());
        full_text.insert("b.pdf".to_string(), "third".to_string());

        let (nodes, parents) = build_nodes(chunks, &full_text);

        assert_eq!(nodes.len(), 3);
        assert_eq!(parents.len(), 2);
        assert_eq!(nodes[0].parent_id, nodes[1].parent_id);
        assert_ne!(nodes[0].parent_id, nodes[2].parent_id);
    }

    #[test]
    fn leaf_ids_are_unique_and_chunk_index_is_per_source() {
        let chunks = vec![
            Chunk::new("a.pdf".to_string(), "first".to_string()),
            Chunk::new("a.pdf".to_string(), "second".to_string()),
        ];
        let full_text = HashMap::new();
        let (nodes, _) = build_nodes(chunks, &full_text);

        assert_ne!(nodes[0].id, nodes[1].id);
        assert_eq!(nodes[0].metadata.chunk_index, 0);
        assert_eq!(nodes[1].metadata.chunk_index, 1);
    }

    #[test]
    fn two_builds_of_the_same_input_produce_different_ids() {
        let chunks = || vec![Chunk::new("a.pdf".to_string(), "text".to_string())];
        let full_text = HashMap::new();
        let (first, _) = build_nodes(chunks(), &full_text);
        let (second, _) = build_nodes(chunks(), &full_text);
        assert_ne!(first[0].id, second[0].id);
    }
}
