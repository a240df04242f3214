use crate::stored_object;

stored_object!(Question, "questions", {
    question_group_id: String,
    question: String,
    ground_truth_text: String,
    source_document_path: String
});
