//! Ingestion-only binary: builds every collaborator and runs the broker-draining worker
//! sweep (§5 "multi-process workers consuming tasks from a broker queue").

use std::{sync::Arc, time::Duration};

use common::utils::config::get_config;
use ingestion_pipeline::{run_worker_loop, JobScheduler};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use main::setup::build_resources;

const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;
    let resources = build_resources(&config).await?;

    let scheduler = Arc::new(JobScheduler::new(
        resources.kv.clone(),
        resources.progress.clone(),
        resources.pipelines.clone(),
    ));

    info!("starting ingestion worker loop");
    run_worker_loop(scheduler, resources.progress.clone(), WORKER_POLL_INTERVAL).await;
    Ok(())
}
