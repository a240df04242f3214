use crate::stored_object;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResultsSummary {
    pub total_questions: usize,
    pub total_hits: usize,
    pub hit_rate: f64,
    pub hit_rate_at_1: f64,
    pub hit_rate_at_3: f64,
    pub hit_rate_at_5: f64,
    pub hit_rate_at_10: f64,
    pub mrr: f64,
}

stored_object!(Evaluation, "evaluations", {
    question_group_id: String,
    folder_path: String,
    top_k: usize,
    use_query_enhancer: bool,
    use_reranking: bool,
    num_questions_per_doc: usize,
    status: EvaluationStatus,
    num_documents_processed: usize,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    results_summary: Option<ResultsSummary>,
    error_message: Option<String>,
    #[serde(default)]
    related_evaluation_ids: Vec<String>
});
