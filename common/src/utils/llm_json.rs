//! Shared helper for the "structured JSON via chat completion" pattern used by every
//! LLM-backed collaborator in this workspace (query enhancement, reranking, question
//! generation, semantic-chunking propositionization). Grounded on the teacher's
//! `IngestionEnricher::perform_analysis` (`ingestion-pipeline/src/enricher.rs`): build a
//! system+user message pair, request a named JSON schema, and parse the first choice's
//! content as JSON. Callers decide what "soft failure" means for their own contract (§9 "LLM
//! structured outputs" — degrade, never raise to the caller).

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use serde_json::Value;

use crate::error::AppError;

/// Issues one chat completion requesting `schema_name`/`schema` as a strict JSON response and
/// returns the parsed body. Any transport, API, or parse failure is returned as `AppError` —
/// callers that need "degrade instead of fail" semantics (QueryEnhancer, Reranker, question
/// generation) catch this and fall back rather than propagating it.
pub async fn chat_json(
    client: &Client<OpenAIConfig>,
    model: &str,
    system_message: &str,
    user_message: &str,
    schema_name: &str,
    schema: Value,
) -> Result<Value, AppError> {
    let response_format = ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: None,
            name: schema_name.to_string(),
            schema: Some(schema),
            strict: Some(true),
        },
    };

    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(system_message).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ])
        .response_format(response_format)
        .build()?;

    let response = client.chat().create(request).await?;

    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_ref())
        .ok_or_else(|| AppError::LLMParsing("empty chat completion response".to_string()))?;

    serde_json::from_str(content)
        .map_err(|err| AppError::LLMParsing(format!("failed to parse LLM JSON: {err}")))
}
