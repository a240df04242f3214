use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline dispatched per ingestion job; chosen once at `start_folder_job` time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineType {
    RecursiveOverlap,
    Semantic,
}

impl Default for PipelineType {
    fn default() -> Self {
        Self::RecursiveOverlap
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// The KV store's snapshot object for one ingestion job. Rewritten after every progress
/// increment; the `processed`/`successful`/`failed` counters living as separate atomic keys
/// remain the source of truth, this is an advisory view for polling clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionJob {
    pub job_id: String,
    pub status: JobStatus,
    pub total_documents: u64,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub current_file: Option<String>,
    pub start_time: DateTime<Utc>,
    pub progress_percent: f32,
    pub estimated_remaining_sec: Option<f64>,
    pub error_message: Option<String>,
}

impl IngestionJob {
    #[must_use]
    pub fn new(job_id: String, total_documents: u64) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            total_documents,
            processed: 0,
            successful: 0,
            failed: 0,
            current_file: None,
            start_time: Utc::now(),
            progress_percent: 0.0,
            estimated_remaining_sec: None,
            error_message: None,
        }
    }

    #[must_use]
    pub fn documents_left(&self) -> u64 {
        self.total_documents.saturating_sub(self.processed)
    }
}
