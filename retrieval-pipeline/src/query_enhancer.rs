//! LLM-backed query expansion (§4.7). Best-effort: any call or parse failure degrades to
//! `[original_query]` rather than raising to the caller (§7 "QueryEnhancer ... designed to be
//! best-effort").

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use common::utils::llm_json::chat_json;
use serde_json::json;
use tracing::warn;

/// Seam between `RetrievalEngine` and query expansion, so tests can swap in a fixed expander
/// instead of exercising the real LLM call (§9 "polymorphism at the gateway boundary").
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn enhance(&self, original_query: &str) -> Vec<String>;
}

const MAX_VARIANTS: usize = 5;

const SYSTEM_MESSAGE: &str = "You help a legal-document search system find more relevant \
results. Given a user's question about a legal document corpus, produce up to 4 alternative \
phrasings that preserve the original meaning but vary terminology, specificity, or phrasing \
a lawyer might use. Do not include the original question in your output.";

pub struct QueryEnhancer {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl QueryEnhancer {
    #[must_use]
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    /// Returns the original query first, followed by up to 4 LLM-generated variants
    /// (≤5 total). Never fails: any error degrades to `[original_query]`.
    pub async fn enhance(&self, original_query: &str) -> Vec<String> {
        match self.try_enhance(original_query).await {
            Ok(mut variants) => {
                variants.truncate(MAX_VARIANTS - 1);
                let mut result = vec![original_query.to_string()];
                result.extend(variants.into_iter().filter(|v| v != original_query));
                result.truncate(MAX_VARIANTS);
                result
            }
            Err(err) => {
                warn!(error = %err, "query enhancement failed; using original query only");
                vec![original_query.to_string()]
            }
        }
    }

    async fn try_enhance(
        &self,
        original_query: &str,
    ) -> Result<Vec<String>, common::error::AppError> {
        let schema = json!({
            "type": "object",
            "properties": {
                "enhanced_queries": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["enhanced_queries"],
            "additionalProperties": false
        });

        let value = chat_json(
            &self.client,
            &self.model,
            SYSTEM_MESSAGE,
            original_query,
            "enhanced_queries",
            schema,
        )
        .await?;

        let queries = value
            .get("enhanced_queries")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                common::error::AppError::LLMParsing("enhanced_queries field missing".to_string())
            })?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        Ok(queries)
    }
}

#[async_trait]
impl QueryExpander for QueryEnhancer {
    async fn enhance(&self, original_query: &str) -> Vec<String> {
        self.enhance(original_query).await
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::QueryExpander;
    use async_trait::async_trait;

    /// Returns `original_query` plus `extra_variants`, verbatim, for every call.
    pub struct FixedExpander {
        extra_variants: Vec<String>,
    }

    impl FixedExpander {
        #[must_use]
        pub fn new(extra_variants: Vec<String>) -> Self {
            Self { extra_variants }
        }

        #[must_use]
        pub fn identity() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl QueryExpander for FixedExpander {
        async fn enhance(&self, original_query: &str) -> Vec<String> {
            let mut out = vec![original_query.to_string()];
            out.extend(self.extra_variants.clone());
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FixedExpander;
    use super::QueryExpander;

    #[tokio::test]
    async fn fixed_expander_puts_original_first() {
        let expander = FixedExpander::new(vec!["alt phrasing".to_string()]);
        let variants = expander.enhance("what is a tort").await;
        assert_eq!(variants, vec!["what is a tort", "alt phrasing"]);
    }
}
