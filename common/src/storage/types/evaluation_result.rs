use crate::stored_object;

stored_object!(EvaluationResult, "evaluation_results", {
    evaluation_id: String,
    question_id: String,
    retrieved_documents: Vec<String>,
    hit: bool,
    rank: Option<usize>
});
