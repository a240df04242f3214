//! Atomic counters + progress snapshots in the KV store (§4.5).
//!
//! Four keys per job, all TTL'd: `ingestion_progress:<job_id>` (the `IngestionJob` snapshot,
//! advisory), `ingestion_processed:<job_id>`, `ingestion_successful:<job_id>`,
//! `ingestion_failed:<job_id>` (atomic integer counters, the source of truth — §6 "Persisted
//! state layout"). No locking is required: `increment` uses one pipelined transaction so
//! `processed == successful + failed` holds after every call (§8).

use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        kv::KvStore,
        types::ingestion_job::{IngestionJob, JobStatus},
    },
};

fn progress_key(job_id: &str) -> String {
    format!("ingestion_progress:{job_id}")
}

fn processed_key(job_id: &str) -> String {
    format!("ingestion_processed:{job_id}")
}

fn successful_key(job_id: &str) -> String {
    format!("ingestion_successful:{job_id}")
}

fn failed_key(job_id: &str) -> String {
    format!("ingestion_failed:{job_id}")
}

pub struct ProgressTracker {
    kv: Arc<dyn KvStore>,
    ttl_secs: u64,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    /// Sets counters to 0 and writes the initial snapshot; all four keys expire in
    /// `ttl_secs` (default 1 hour per §4.5).
    pub async fn initialize(&self, job_id: &str, total: u64) -> Result<(), AppError> {
        self.kv
            .set_ex(&processed_key(job_id), "0", self.ttl_secs)
            .await?;
        self.kv
            .set_ex(&successful_key(job_id), "0", self.ttl_secs)
            .await?;
        self.kv
            .set_ex(&failed_key(job_id), "0", self.ttl_secs)
            .await?;

        let mut job = IngestionJob::new(job_id.to_string(), total);
        job.status = JobStatus::Processing;
        self.write_snapshot(&job).await
    }

    /// Atomically increments `processed` and either `successful` or `failed` in one
    /// pipelined transaction, then rewrites the advisory snapshot (§4.5, §8).
    pub async fn increment(
        &self,
        job_id: &str,
        success: bool,
        current_file: Option<String>,
        est_remaining_sec: Option<f64>,
    ) -> Result<IngestionJob, AppError> {
        let outcome_key = if success {
            successful_key(job_id)
        } else {
            failed_key(job_id)
        };

        let (processed, outcome) = self
            .kv
            .incr_pipelined(&processed_key(job_id), &outcome_key)
            .await?;

        let (successful, failed) = if success {
            (outcome, self.read_counter(&failed_key(job_id)).await?)
        } else {
            (self.read_counter(&successful_key(job_id)).await?, outcome)
        };

        let mut job = self
            .get(job_id)
            .await?
            .unwrap_or_else(|| IngestionJob::new(job_id.to_string(), 0));

        job.status = JobStatus::Processing;
        job.processed = processed.max(0) as u64;
        job.successful = successful.max(0) as u64;
        job.failed = failed.max(0) as u64;
        job.current_file = current_file;
        job.progress_percent = if job.total_documents == 0 {
            100.0
        } else {
            (job.processed as f32 / job.total_documents as f32) * 100.0
        };
        job.estimated_remaining_sec = est_remaining_sec;

        self.write_snapshot(&job).await?;
        Ok(job)
    }

    pub async fn set_completed(
        &self,
        job_id: &str,
        successful: u64,
        failed: u64,
    ) -> Result<(), AppError> {
        let mut job = self
            .get(job_id)
            .await?
            .unwrap_or_else(|| IngestionJob::new(job_id.to_string(), successful + failed));
        job.status = JobStatus::Completed;
        job.processed = successful + failed;
        job.successful = successful;
        job.failed = failed;
        job.progress_percent = 100.0;
        job.estimated_remaining_sec = Some(0.0);
        self.write_snapshot(&job).await?;
        self.delete_counters(job_id).await
    }

    pub async fn set_failed(&self, job_id: &str, error: &str) -> Result<(), AppError> {
        let mut job = self
            .get(job_id)
            .await?
            .unwrap_or_else(|| IngestionJob::new(job_id.to_string(), 0));
        job.status = JobStatus::Failed;
        job.error_message = Some(error.to_string());
        self.write_snapshot(&job).await?;
        self.delete_counters(job_id).await
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<IngestionJob>, AppError> {
        match self.kv.get(&progress_key(job_id)).await? {
            Some(raw) => {
                let job = serde_json::from_str(&raw)
                    .map_err(|err| AppError::InternalError(format!("corrupt snapshot: {err}")))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Lists every job currently tracked, via a KV `SCAN` over the snapshot keys (used by
    /// `GET /ingestion/jobs`, §6).
    pub async fn list_active(&self) -> Result<Vec<IngestionJob>, AppError> {
        let keys = self.kv.scan_keys("ingestion_progress:*").await?;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.kv.get(&key).await? {
                if let Ok(job) = serde_json::from_str::<IngestionJob>(&raw) {
                    jobs.push(job);
                }
            }
        }
        Ok(jobs)
    }

    async fn read_counter(&self, key: &str) -> Result<i64, AppError> {
        match self.kv.get(key).await? {
            Some(raw) => Ok(raw.parse().unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn write_snapshot(&self, job: &IngestionJob) -> Result<(), AppError> {
        let raw = serde_json::to_string(job)
            .map_err(|err| AppError::InternalError(format!("snapshot serialize failed: {err}")))?;
        self.kv
            .set_ex(&progress_key(&job.job_id), &raw, self.ttl_secs)
            .await
    }

    async fn delete_counters(&self, job_id: &str) -> Result<(), AppError> {
        self.kv
            .del(&[
                processed_key(job_id),
                successful_key(job_id),
                failed_key(job_id),
            ])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::kv::FakeKvStore;

    #[tokio::test]
    async fn increment_keeps_processed_equal_to_sum() {
        let tracker = ProgressTracker::new(Arc::new(FakeKvStore::new()), 3600);
        tracker.initialize("job-1", 5).await.unwrap();

        for success in [true, true, false, true, false] {
            tracker
                .increment("job-1", success, Some("doc.pdf".to_string()), None)
                .await
                .unwrap();
        }

        let job = tracker.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.processed, 5);
        assert_eq!(job.successful + job.failed, job.processed);
        assert_eq!(job.successful, 3);
        assert_eq!(job.failed, 2);
        assert!((job.progress_percent - 100.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn set_completed_deletes_counters() {
        let kv = Arc::new(FakeKvStore::new());
        let tracker = ProgressTracker::new(kv.clone(), 3600);
        tracker.initialize("job-2", 1).await.unwrap();
        tracker
            .increment("job-2", true, None, None)
            .await
            .unwrap();
        tracker.set_completed("job-2", 1, 0).await.unwrap();

        assert_eq!(kv.get("ingestion_processed:job-2").await.unwrap(), None);
        let job = tracker.get("job-2").await.unwrap().unwrap();
        assert_eq!(job.status, common::storage::types::ingestion_job::JobStatus::Completed);
    }

    #[tokio::test]
    async fn list_active_returns_initialized_jobs() {
        let tracker = ProgressTracker::new(Arc::new(FakeKvStore::new()), 3600);
        tracker.initialize("job-a", 2).await.unwrap();
        tracker.initialize("job-b", 3).await.unwrap();

        let jobs = tracker.list_active().await.unwrap();
        assert_eq!(jobs.len(), 2);
    }
}
