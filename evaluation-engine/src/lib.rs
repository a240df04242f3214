//! Question generation against a folder of documents, retrieval replay, and hit/rank scoring
//! against the ground-truth source path (§4.11).

use std::{path::Path, sync::Arc};

use async_openai::{config::OpenAIConfig, Client};
use chrono::Utc;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            evaluation::{Evaluation, EvaluationStatus, ResultsSummary},
            evaluation_result::EvaluationResult,
            question::Question,
        },
    },
    utils::llm_json::chat_json,
};
use ingestion_pipeline::{enumerate_files, PdfExtractor};
use retrieval_pipeline::RetrievalEngine;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

const SYSTEM_MESSAGE: &str = "You write evaluation questions for a legal-document retrieval \
system. Given the full text of one document, produce the requested number of (fact, question) \
pairs: `fact` is a short verbatim-adjacent statement drawn from the text, `question` is a \
natural-language question whose answer is that fact. Questions should be answerable only by \
reading this document.";

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    fact: String,
    question: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestions {
    questions: Vec<GeneratedQuestion>,
}

/// Matching `retrieval_pipeline::RetrievalEngine::retrieve`'s positional flags, threaded
/// through `start_evaluation` (§4.11).
pub struct EvaluationRequest {
    pub folder_path: String,
    pub top_k: usize,
    pub use_query_enhancer: bool,
    pub use_reranking: bool,
    pub num_questions_per_doc: usize,
    pub source_evaluation_id: Option<String>,
    pub question_group_id: Option<String>,
}

pub struct EvaluationEngine {
    db: Arc<SurrealDbClient>,
    extractor: Arc<dyn PdfExtractor>,
    retrieval_engine: Arc<RetrievalEngine>,
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl EvaluationEngine {
    #[must_use]
    pub fn new(
        db: Arc<SurrealDbClient>,
        extractor: Arc<dyn PdfExtractor>,
        retrieval_engine: Arc<RetrievalEngine>,
        client: Arc<Client<OpenAIConfig>>,
        model: String,
    ) -> Self {
        Self {
            db,
            extractor,
            retrieval_engine,
            client,
            model,
        }
    }

    /// Runs one full evaluation synchronously: question generation (or reuse), retrieval
    /// replay per question, metric aggregation, and a final `Evaluation` status write (§4.11).
    /// Never returns `Err` for per-document or per-question failures; only a top-level defect
    /// (e.g. the initial `Evaluation` write failing) surfaces as `Err`.
    #[tracing::instrument(skip(self, request))]
    pub async fn start_evaluation(&self, request: EvaluationRequest) -> Result<String, AppError> {
        if request.source_evaluation_id.is_some() && request.question_group_id.is_some() {
            return Err(AppError::Validation(
                "at most one of source_evaluation_id, question_group_id may be set".to_string(),
            ));
        }

        let question_group_id = self.resolve_question_group_id(&request).await?;
        let reuse_questions = request.source_evaluation_id.is_some()
            || (request.question_group_id.is_some()
                && self.group_has_questions(&question_group_id).await?);

        let evaluation_id = Uuid::new_v4().to_string();
        let related_evaluation_ids = match &request.source_evaluation_id {
            Some(source_id) => {
                self.link_related_evaluation(source_id, &evaluation_id).await?;
                vec![source_id.clone()]
            }
            None => Vec::new(),
        };

        let mut evaluation = Evaluation {
            id: evaluation_id.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            question_group_id: question_group_id.clone(),
            folder_path: request.folder_path.clone(),
            top_k: request.top_k,
            use_query_enhancer: request.use_query_enhancer,
            use_reranking: request.use_reranking,
            num_questions_per_doc: request.num_questions_per_doc,
            status: EvaluationStatus::Pending,
            num_documents_processed: 0,
            completed_at: None,
            results_summary: None,
            error_message: None,
            related_evaluation_ids,
        };
        self.db.store_item(evaluation.clone()).await?;

        match self
            .run(&request, &evaluation_id, &question_group_id, reuse_questions)
            .await
        {
            Ok((num_docs, summary)) => {
                evaluation.status = EvaluationStatus::Completed;
                evaluation.num_documents_processed = num_docs;
                evaluation.completed_at = Some(Utc::now());
                evaluation.results_summary = Some(summary);
            }
            Err(err) => {
                evaluation.status = EvaluationStatus::Failed;
                evaluation.error_message = Some(err.to_string());
            }
        }
        self.db.upsert_item(evaluation).await?;

        Ok(evaluation_id)
    }

    async fn resolve_question_group_id(
        &self,
        request: &EvaluationRequest,
    ) -> Result<String, AppError> {
        if let Some(group_id) = &request.question_group_id {
            return Ok(group_id.clone());
        }
        if let Some(source_id) = &request.source_evaluation_id {
            let source: Evaluation = self
                .db
                .get_item(source_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("evaluation {source_id} not found")))?;
            return Ok(source.question_group_id);
        }
        Ok(Uuid::new_v4().to_string())
    }

    /// Back-links `source_id` to `new_id` (§8 scenario 6: "`related_evaluation_ids` on each
    /// contains the other") so a reuse chain is discoverable from either end.
    async fn link_related_evaluation(&self, source_id: &str, new_id: &str) -> Result<(), AppError> {
        let mut source: Evaluation = self
            .db
            .get_item(source_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("evaluation {source_id} not found")))?;
        if !source.related_evaluation_ids.iter().any(|id| id == new_id) {
            source.related_evaluation_ids.push(new_id.to_string());
            source.updated_at = Utc::now();
            self.db.upsert_item(source).await?;
        }
        Ok(())
    }

    async fn group_has_questions(&self, question_group_id: &str) -> Result<bool, AppError> {
        let questions = self
            .db
            .find_by::<Question>("question_group_id", question_group_id)
            .await?;
        Ok(!questions.is_empty())
    }

    async fn run(
        &self,
        request: &EvaluationRequest,
        evaluation_id: &str,
        question_group_id: &str,
        reuse_questions: bool,
    ) -> Result<(usize, ResultsSummary), AppError> {
        let questions = if reuse_questions {
            self.db
                .find_by::<Question>("question_group_id", question_group_id)
                .await?
        } else {
            self.generate_questions(request, question_group_id).await?
        };

        let num_docs = questions
            .iter()
            .map(|q| q.source_document_path.clone())
            .collect::<std::collections::HashSet<_>>()
            .len();

        let mut results = Vec::with_capacity(questions.len());
        for question in &questions {
            let result = self
                .evaluate_question(request, evaluation_id, question)
                .await;
            self.db.store_item(result.clone()).await?;
            results.push(result);
        }

        Ok((num_docs, aggregate(&results)))
    }

    async fn generate_questions(
        &self,
        request: &EvaluationRequest,
        question_group_id: &str,
    ) -> Result<Vec<Question>, AppError> {
        let files = enumerate_files(Path::new(&request.folder_path), &["pdf".to_string()])?;

        let mut questions = Vec::new();
        for file_path in files {
            let text = match self.extractor.extract_text(Path::new(&file_path)).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    warn!(file_path, "document had no extractable text; skipping");
                    continue;
                }
                Err(err) => {
                    warn!(file_path, error = %err, "question-document extraction failed; skipping");
                    continue;
                }
            };

            match self
                .generate_for_document(&text, request.num_questions_per_doc)
                .await
            {
                Ok(generated) => {
                    for item in generated {
                        let question = Question {
                            id: Uuid::new_v4().to_string(),
                            created_at: Utc::now(),
                            updated_at: Utc::now(),
                            question_group_id: question_group_id.to_string(),
                            question: item.question,
                            ground_truth_text: item.fact,
                            source_document_path: file_path.clone(),
                        };
                        self.db.store_item(question.clone()).await?;
                        questions.push(question);
                    }
                }
                Err(err) => {
                    warn!(file_path, error = %err, "question generation failed; skipping document");
                }
            }
        }

        Ok(questions)
    }

    async fn generate_for_document(
        &self,
        text: &str,
        num_questions: usize,
    ) -> Result<Vec<GeneratedQuestion>, AppError> {
        let schema = json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "fact": { "type": "string" },
                            "question": { "type": "string" }
                        },
                        "required": ["fact", "question"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["questions"],
            "additionalProperties": false
        });

        let prompt = format!(
            "Produce exactly {num_questions} (fact, question) pairs from this document:\n\n{text}"
        );

        let value = chat_json(
            &self.client,
            &self.model,
            SYSTEM_MESSAGE,
            &prompt,
            "questions",
            schema,
        )
        .await?;

        let mut generated: GeneratedQuestions = serde_json::from_value(value)
            .map_err(|err| AppError::LLMParsing(format!("questions shape: {err}")))?;
        generated.questions.truncate(num_questions);
        Ok(generated.questions)
    }

    async fn evaluate_question(
        &self,
        request: &EvaluationRequest,
        evaluation_id: &str,
        question: &Question,
    ) -> EvaluationResult {
        let retrieved = match self
            .retrieval_engine
            .retrieve(
                &question.question,
                request.top_k,
                request.use_query_enhancer,
                request.use_reranking,
            )
            .await
        {
            Ok(results) => results.into_iter().map(|r| r.source).collect::<Vec<_>>(),
            Err(err) => {
                warn!(question_id = %question.id, error = %err, "retrieval failed for evaluation question");
                Vec::new()
            }
        };

        let rank = retrieved
            .iter()
            .position(|source| filename_matches(source, &question.source_document_path))
            .map(|idx| idx + 1);

        EvaluationResult {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            evaluation_id: evaluation_id.to_string(),
            question_id: question.id.clone(),
            retrieved_documents: retrieved,
            hit: rank.is_some(),
            rank,
        }
    }
}

/// Ground truth and retrieved paths are compared by filename only, since retrieval sources
/// may be absolute paths while ground truth is recorded relative, or vice versa (§4.11).
fn filename_matches(retrieved_source: &str, ground_truth_path: &str) -> bool {
    let retrieved_name = Path::new(retrieved_source).file_name();
    let ground_truth_name = Path::new(ground_truth_path).file_name();
    retrieved_name.is_some() && retrieved_name == ground_truth_name
}

fn aggregate(results: &[EvaluationResult]) -> ResultsSummary {
    let total_questions = results.len();
    if total_questions == 0 {
        return ResultsSummary::default();
    }

    let total_hits = results.iter().filter(|r| r.hit).count();
    let hit_rate = total_hits as f64 / total_questions as f64;

    let hit_rate_at = |k: usize| {
        let hits = results
            .iter()
            .filter(|r| r.hit && r.rank.is_some_and(|rank| rank <= k))
            .count();
        hits as f64 / total_questions as f64
    };

    let mrr = results
        .iter()
        .map(|r| {
            if r.hit {
                r.rank.map_or(0.0, |rank| 1.0 / rank as f64)
            } else {
                0.0
            }
        })
        .sum::<f64>()
        / total_questions as f64;

    ResultsSummary {
        total_questions,
        total_hits,
        hit_rate,
        hit_rate_at_1: hit_rate_at(1),
        hit_rate_at_3: hit_rate_at(3),
        hit_rate_at_5: hit_rate_at(5),
        hit_rate_at_10: hit_rate_at(10),
        mrr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rank: Option<usize>) -> EvaluationResult {
        EvaluationResult {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            evaluation_id: "eval".to_string(),
            question_id: "q".to_string(),
            retrieved_documents: Vec::new(),
            hit: rank.is_some(),
            rank,
        }
    }

    #[test]
    fn aggregate_computes_hit_rate_and_mrr() {
        let results = vec![result(Some(1)), result(Some(3)), result(None)];
        let summary = aggregate(&results);
        assert_eq!(summary.total_questions, 3);
        assert_eq!(summary.total_hits, 2);
        assert!((summary.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((summary.hit_rate_at_1 - 1.0 / 3.0).abs() < 1e-9);
        assert!((summary.hit_rate_at_3 - 2.0 / 3.0).abs() < 1e-9);
        let expected_mrr = (1.0 + 1.0 / 3.0) / 3.0;
        assert!((summary.mrr - expected_mrr).abs() < 1e-9);
    }

    #[test]
    fn aggregate_of_empty_results_is_all_zero() {
        let summary = aggregate(&[]);
        assert_eq!(summary.total_questions, 0);
        assert!((summary.hit_rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn filename_matches_ignores_directory_components() {
        assert!(filename_matches("/data/docs/contract.pdf", "contract.pdf"));
        assert!(!filename_matches("/data/docs/contract.pdf", "other.pdf"));
    }

    fn test_engine(db: Arc<SurrealDbClient>) -> EvaluationEngine {
        use common::{
            storage::vector_store::fake::FakeVectorStore,
            utils::embedding::HashedEmbeddingProvider,
        };
        use ingestion_pipeline::pdf_extraction::fake::FakePdfExtractor;
        use retrieval_pipeline::{query_enhancer::fake::FixedExpander, reranker::fake::ReversingReranker};

        let retrieval_engine = Arc::new(RetrievalEngine::new(
            Arc::new(FakeVectorStore::new()),
            Arc::new(HashedEmbeddingProvider::new(8)),
            Arc::new(FixedExpander::identity()),
            Arc::new(ReversingReranker),
        ));
        let client = Arc::new(Client::with_config(OpenAIConfig::new().with_api_key("test-key")));
        EvaluationEngine::new(
            db,
            Arc::new(FakePdfExtractor::new()),
            retrieval_engine,
            client,
            "gpt-4o-mini".to_string(),
        )
    }

    fn evaluation(id: &str) -> Evaluation {
        Evaluation {
            id: id.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            question_group_id: "group-1".to_string(),
            folder_path: "folder".to_string(),
            top_k: 5,
            use_query_enhancer: false,
            use_reranking: false,
            num_questions_per_doc: 2,
            status: EvaluationStatus::Completed,
            num_documents_processed: 1,
            completed_at: Some(Utc::now()),
            results_summary: None,
            error_message: None,
            related_evaluation_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn link_related_evaluation_back_links_the_source() {
        let db = Arc::new(
            SurrealDbClient::memory("eval_test_ns", &Uuid::new_v4().to_string())
                .await
                .unwrap(),
        );
        let engine = test_engine(db.clone());

        let source_id = Uuid::new_v4().to_string();
        db.store_item(evaluation(&source_id)).await.unwrap();

        let new_id = Uuid::new_v4().to_string();
        engine
            .link_related_evaluation(&source_id, &new_id)
            .await
            .unwrap();

        let updated: Evaluation = db.get_item(&source_id).await.unwrap().unwrap();
        assert_eq!(updated.related_evaluation_ids, vec![new_id]);
    }

    #[tokio::test]
    async fn link_related_evaluation_is_idempotent() {
        let db = Arc::new(
            SurrealDbClient::memory("eval_test_ns", &Uuid::new_v4().to_string())
                .await
                .unwrap(),
        );
        let engine = test_engine(db.clone());

        let source_id = Uuid::new_v4().to_string();
        db.store_item(evaluation(&source_id)).await.unwrap();
        let new_id = Uuid::new_v4().to_string();

        engine.link_related_evaluation(&source_id, &new_id).await.unwrap();
        engine.link_related_evaluation(&source_id, &new_id).await.unwrap();

        let updated: Evaluation = db.get_item(&source_id).await.unwrap().unwrap();
        assert_eq!(updated.related_evaluation_ids, vec![new_id]);
    }
}
