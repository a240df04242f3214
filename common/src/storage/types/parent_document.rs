use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The full text of one ingested source. One per unique source path; held only long enough
/// to build nodes unless explicitly persisted for future hierarchical retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParentDocument {
    pub id: Uuid,
    pub source: String,
    pub text: String,
}

impl ParentDocument {
    #[must_use]
    pub fn new(source: String, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            text,
        }
    }
}
