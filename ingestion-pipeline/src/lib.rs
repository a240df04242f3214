//! Chunker -> NodeBuilder -> VectorStoreGateway per document (§4.4), plus the fan-out job
//! scheduler (§4.6) and its atomic progress tracking (§4.5) that drive it.

pub mod node_builder;
pub mod pdf_extraction;
pub mod pipeline;
pub mod progress;
pub mod scheduler;

pub use node_builder::build_nodes;
pub use pdf_extraction::{PdfExtractTextExtractor, PdfExtractor};
pub use pipeline::{IngestionPipeline, IngestionResult};
pub use progress::ProgressTracker;
pub use scheduler::{enumerate_files, IngestionTaskMessage, JobScheduler, PipelineRegistry};

use std::{sync::Arc, time::Duration};

use common::storage::types::ingestion_job::JobStatus;
use tokio::time::sleep;
use tracing::{error, info};

/// Runs a single worker: repeatedly pops and executes tasks for `job_id` from the broker
/// until the list is drained, then returns. Callers (the `worker` binary) loop this over the
/// set of currently-known job ids (§5 "multi-process workers consuming tasks from a broker
/// queue").
pub async fn drain_job(scheduler: &JobScheduler, job_id: &str) {
    loop {
        match scheduler.process_one(job_id).await {
            Ok(true) => continue,
            Ok(false) => return,
            Err(err) => {
                error!(job_id, error = %err, "worker task processing error");
                return;
            }
        }
    }
}

/// Spawns the finalizer for a job as an independent, fire-and-forget task (§4.6).
pub fn spawn_finalizer(scheduler: Arc<JobScheduler>, job_id: String, backoff: Duration) {
    tokio::spawn(async move {
        if let Err(err) = scheduler.run_finalizer(&job_id, backoff).await {
            error!(job_id, error = %err, "finalizer failed");
        } else {
            info!(job_id, "finalizer observed job completion");
        }
    });
}

/// Long-running sweep used by the standalone `worker` binary: repeatedly lists every
/// non-terminal job known to the `ProgressTracker`, drains its broker list, and sleeps
/// `poll_interval` once a full sweep finds nothing left to do (§5 "multi-process workers
/// consuming tasks from a broker queue"). Never returns; the process is killed to stop it.
pub async fn run_worker_loop(
    scheduler: Arc<JobScheduler>,
    progress: Arc<ProgressTracker>,
    poll_interval: Duration,
) {
    loop {
        let jobs = match progress.list_active().await {
            Ok(jobs) => jobs,
            Err(err) => {
                error!(error = %err, "worker: failed to list active jobs");
                sleep(poll_interval).await;
                continue;
            }
        };

        let mut did_work = false;
        for job in jobs {
            if matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
                continue;
            }
            loop {
                match scheduler.process_one(&job.job_id).await {
                    Ok(true) => did_work = true,
                    Ok(false) => break,
                    Err(err) => {
                        error!(job_id = %job.job_id, error = %err, "worker task processing error");
                        break;
                    }
                }
            }
        }

        if !did_work {
            sleep(poll_interval).await;
        }
    }
}
