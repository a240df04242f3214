//! Fan-out of per-document work; job lifecycle and finalization (§4.6).
//!
//! Workers are modeled as consumers of a queue delivering `(file_path, job_id, pipeline_type)`
//! messages (§9 "Scheduler as message passing") — the KV store doubles as that broker
//! (`SPEC_FULL.md` §C.6). `JobScheduler` only enqueues; it never waits on worker completion.
//! A finalizer task polls `processed == total` and writes the terminal snapshot, re-scheduling
//! itself with a back-off rather than blocking on a group-join (§4.6, §9).

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use chrono::Utc;
use common::{
    error::AppError,
    storage::{
        kv::KvStore,
        types::ingestion_job::{IngestionJob, JobStatus, PipelineType},
    },
};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{pipeline::IngestionPipeline, progress::ProgressTracker};

/// Default finalizer re-poll interval (§4.6 "e.g., 10 s").
pub const DEFAULT_FINALIZER_BACKOFF: Duration = Duration::from_secs(10);

fn broker_key(job_id: &str) -> String {
    format!("ingestion_tasks:{job_id}")
}

/// One unit of fan-out work, pushed onto the broker list and popped by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionTaskMessage {
    pub job_id: String,
    pub file_path: String,
    pub pipeline_type: PipelineType,
}

/// Case-insensitive top-level enumeration of files under `folder_path` matching any of
/// `file_types` (extensions without the leading dot, e.g. `"pdf"`) (§4.6 step 1).
pub fn enumerate_files(
    folder_path: &Path,
    file_types: &[String],
) -> Result<Vec<String>, AppError> {
    let wanted: Vec<String> = file_types.iter().map(|t| t.to_lowercase()).collect();

    let entries = std::fs::read_dir(folder_path)
        .map_err(|err| AppError::Validation(format!("cannot read folder: {err}")))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| AppError::Validation(format!("read_dir entry: {err}")))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if wanted.iter().any(|w| w == &ext.to_lowercase()) {
            files.push(path.to_string_lossy().to_string());
        }
    }
    files.sort();
    Ok(files)
}

/// Closed registry of the two chunking strategies (§9 "Polymorphism over chunker / pipeline")
/// — selected per job, not via inheritance.
pub type PipelineRegistry = HashMap<PipelineType, Arc<IngestionPipeline>>;

pub struct JobScheduler {
    kv: Arc<dyn KvStore>,
    progress: Arc<ProgressTracker>,
    pipelines: PipelineRegistry,
}

impl JobScheduler {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, progress: Arc<ProgressTracker>, pipelines: PipelineRegistry) -> Self {
        Self {
            kv,
            progress,
            pipelines,
        }
    }

    /// Enumerates files, enqueues one task per file, and returns the new job's id
    /// immediately without waiting for any worker (§4.6).
    #[tracing::instrument(skip(self))]
    pub async fn start_folder_job(
        &self,
        folder_path: &str,
        file_types: &[String],
        pipeline_type: PipelineType,
    ) -> Result<String, AppError> {
        let job_id = Uuid::new_v4().to_string();

        let files = match enumerate_files(Path::new(folder_path), file_types) {
            Ok(files) => files,
            Err(err) => {
                self.progress.set_failed(&job_id, &err.to_string()).await?;
                return Ok(job_id);
            }
        };

        if files.is_empty() {
            self.progress.initialize(&job_id, 0).await?;
            self.progress.set_completed(&job_id, 0, 0).await?;
            return Ok(job_id);
        }

        self.progress.initialize(&job_id, files.len() as u64).await?;

        for file_path in files {
            let message = IngestionTaskMessage {
                job_id: job_id.clone(),
                file_path,
                pipeline_type,
            };
            let raw = serde_json::to_string(&message)
                .map_err(|err| AppError::InternalError(format!("task encode failed: {err}")))?;
            self.kv.push(&broker_key(&job_id), &raw).await?;
        }

        info!(job_id = %job_id, "folder ingestion job scheduled");
        Ok(job_id)
    }

    /// Ingests a single file without going through the broker, used by the
    /// `/ingestion/start_single_file` endpoint (§6). Still goes through progress tracking so
    /// polling clients see a consistent `IngestionJob`.
    pub async fn start_single_file_job(
        &self,
        file_path: &str,
        pipeline_type: PipelineType,
    ) -> Result<String, AppError> {
        let job_id = Uuid::new_v4().to_string();
        self.progress.initialize(&job_id, 1).await?;
        let message = IngestionTaskMessage {
            job_id: job_id.clone(),
            file_path: file_path.to_string(),
            pipeline_type,
        };
        let raw = serde_json::to_string(&message)
            .map_err(|err| AppError::InternalError(format!("task encode failed: {err}")))?;
        self.kv.push(&broker_key(&job_id), &raw).await?;
        Ok(job_id)
    }

    /// Pops and executes one task from `job_id`'s broker list, if any is ready. Returns `true`
    /// if a task was processed. Independent per worker; no inter-worker barrier (§4.6). Uses
    /// the non-blocking `pop` — this is a poll-drain path shared across every known job, so it
    /// must return immediately once `job_id`'s list is empty rather than wait on it.
    pub async fn process_one(&self, job_id: &str) -> Result<bool, AppError> {
        let Some(raw) = self.kv.pop(&broker_key(job_id)).await? else {
            return Ok(false);
        };
        let message: IngestionTaskMessage = serde_json::from_str(&raw)
            .map_err(|err| AppError::InternalError(format!("task decode failed: {err}")))?;
        self.run_task(message).await?;
        Ok(true)
    }

    async fn run_task(&self, message: IngestionTaskMessage) -> Result<(), AppError> {
        let Some(pipeline) = self.pipelines.get(&message.pipeline_type) else {
            self.progress
                .increment(&message.job_id, false, Some(message.file_path.clone()), None)
                .await?;
            return Err(AppError::InternalError(format!(
                "no pipeline registered for {:?}",
                message.pipeline_type
            )));
        };

        let result = pipeline.ingest_file(Path::new(&message.file_path)).await;
        if !result.success {
            warn!(job_id = %message.job_id, file = %message.file_path, error = ?result.error, "worker task failed");
        }
        self.progress
            .increment(&message.job_id, result.success, Some(message.file_path), None)
            .await?;
        Ok(())
    }

    /// Polls `processed == total` until the job is done, then writes the terminal snapshot
    /// with aggregate timing. Re-schedules itself with `backoff` rather than blocking a
    /// worker on a group-join (§4.6, §9). Call this once per job, fire-and-forget.
    pub async fn run_finalizer(&self, job_id: &str, backoff: Duration) -> Result<(), AppError> {
        loop {
            let Some(job) = self.progress.get(job_id).await? else {
                return Ok(());
            };
            if matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
                return Ok(());
            }
            if job.processed >= job.total_documents {
                self.progress
                    .set_completed(job_id, job.successful, job.failed)
                    .await?;
                info!(job_id = %job_id, elapsed_sec = (Utc::now() - job.start_time).num_seconds(), "ingestion job completed");
                return Ok(());
            }
            sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunker::RecursiveOverlapChunker;
    use common::{
        storage::{kv::FakeKvStore, vector_store::fake::FakeVectorStore},
        utils::embedding::HashedEmbeddingProvider,
    };
    use std::fs;

    use crate::pdf_extraction::fake::FakePdfExtractor;

    fn registry() -> (PipelineRegistry, Arc<FakePdfExtractor>) {
        let extractor = Arc::new(FakePdfExtractor::new());
        let pipeline = Arc::new(IngestionPipeline::new(
            extractor.clone(),
            Arc::new(RecursiveOverlapChunker::new(200, 0.1)),
            Arc::new(HashedEmbeddingProvider::new(16)),
            Arc::new(FakeVectorStore::new()),
        ));
        let mut registry = PipelineRegistry::new();
        registry.insert(PipelineType::RecursiveOverlap, pipeline);
        (registry, extractor)
    }

    #[test]
    fn enumerate_files_is_case_insensitive_and_top_level_only() {
        let dir = tempfile_dir();
        fs::write(dir.join("a.PDF"), b"x").unwrap();
        fs::write(dir.join("b.txt"), b"x").unwrap();
        fs::create_dir(dir.join("subdir")).unwrap();
        fs::write(dir.join("subdir").join("c.pdf"), b"x").unwrap();

        let files = enumerate_files(&dir, &["pdf".to_string()]).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.PDF"));
    }

    #[tokio::test]
    async fn empty_folder_completes_immediately_with_zero_totals() {
        let dir = tempfile_dir();
        let kv = Arc::new(FakeKvStore::new());
        let progress = Arc::new(ProgressTracker::new(kv.clone(), 3600));
        let (registry, _extractor) = registry();
        let scheduler = JobScheduler::new(kv, progress.clone(), registry);

        let job_id = scheduler
            .start_folder_job(
                dir.to_str().unwrap(),
                &["pdf".to_string()],
                PipelineType::RecursiveOverlap,
            )
            .await
            .unwrap();

        let job = progress.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_documents, 0);
    }

    #[tokio::test]
    async fn mixed_success_batch_ends_with_correct_counters() {
        let dir = tempfile_dir();
        fs::write(dir.join("good.pdf"), b"x").unwrap();
        fs::write(dir.join("bad.pdf"), b"x").unwrap();

        let kv = Arc::new(FakeKvStore::new());
        let progress = Arc::new(ProgressTracker::new(kv.clone(), 3600));
        let (registry, extractor) = registry();
        extractor.seed(dir.join("good.pdf").to_string_lossy(), "Real legal text content.");
        extractor.seed(dir.join("bad.pdf").to_string_lossy(), "   ");

        let scheduler = JobScheduler::new(kv, progress.clone(), registry);
        let job_id = scheduler
            .start_folder_job(
                dir.to_str().unwrap(),
                &["pdf".to_string()],
                PipelineType::RecursiveOverlap,
            )
            .await
            .unwrap();

        while scheduler.process_one(&job_id).await.unwrap() {}
        scheduler
            .run_finalizer(&job_id, Duration::from_millis(1))
            .await
            .unwrap();

        let job = progress.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed, 2);
        assert_eq!(job.successful, 1);
        assert_eq!(job.failed, 1);
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("ingestion-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
