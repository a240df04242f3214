use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use axum::{extract::State, Json};
use common::{error::AppError, storage::types::session::MessageRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{api_state::ApiState, error::ApiError};

const SYSTEM_MESSAGE: &str = "You are a legal-document assistant. Answer the user's question \
using only the provided sources. If the sources do not contain the answer, say so plainly.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub use_query_enhancer: bool,
    #[serde(default)]
    pub use_reranking: bool,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub session_id: String,
    pub sources: Vec<String>,
}

/// Appends the user turn, retrieves supporting passages, synthesizes an answer from them via
/// the chat model, and appends the assistant turn (§6 `/chat`).
pub async fn chat(
    State(state): State<ApiState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = state
        .session_store
        .get_or_create(request.session_id.clone())
        .await?
        .id;
    let session = state
        .session_store
        .append_message(&session_id, MessageRole::User, request.message.clone(), Value::Null)
        .await?;

    let results = state
        .retrieval_engine
        .retrieve(
            &request.message,
            request.top_k,
            request.use_query_enhancer,
            request.use_reranking,
        )
        .await?;

    let sources: Vec<String> = results.iter().map(|r| r.source.clone()).collect();
    let answer = synthesize_answer(&state, &request.message, &results).await?;

    state
        .session_store
        .append_message(&session.id, MessageRole::Assistant, answer.clone(), Value::Null)
        .await?;

    Ok(Json(ChatResponse {
        answer,
        session_id: session.id,
        sources,
    }))
}

async fn synthesize_answer(
    state: &ApiState,
    question: &str,
    results: &[retrieval_pipeline::RetrievalResult],
) -> Result<String, AppError> {
    if results.is_empty() {
        return Ok(
            "I could not find any relevant passages in the document corpus for this question."
                .to_string(),
        );
    }

    let mut context = String::new();
    for (idx, result) in results.iter().enumerate() {
        context.push_str(&format!("[{idx}] ({}) {}\n\n", result.source, result.text));
    }
    let user_message = format!("Question: {question}\n\nSources:\n{context}");

    let request = CreateChatCompletionRequestArgs::default()
        .model(&state.config.chat_model)
        .messages([
            ChatCompletionRequestSystemMessage::from(SYSTEM_MESSAGE).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ])
        .build()?;

    let response = state.chat_client.chat().create(request).await?;
    let answer = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .ok_or_else(|| AppError::LLMParsing("empty chat completion response".to_string()))?;

    Ok(answer)
}
