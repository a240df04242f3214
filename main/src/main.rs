//! Combined single-process binary: serves the HTTP façade and drains the ingestion broker
//! in the same process, for local development and single-node deployments where running
//! `server` and `worker` as separate processes is unnecessary overhead.

use std::{sync::Arc, time::Duration};

use api_router::{api_routes_v1, api_state::ApiState};
use common::utils::config::get_config;
use ingestion_pipeline::{run_worker_loop, JobScheduler};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use main::setup::build_resources;

const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
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

    let worker_scheduler = scheduler.clone();
    let worker_progress = resources.progress.clone();
    tokio::spawn(async move {
        info!("starting embedded ingestion worker loop");
        run_worker_loop(worker_scheduler, worker_progress, WORKER_POLL_INTERVAL).await;
    });

    let migration_session_store = resources.session_store.clone();
    let migration_interval = Duration::from_secs(config.session_migration_interval_minutes * 60);
    tokio::spawn(async move {
        migration_session_store
            .run_migration_task(migration_interval)
            .await;
    });

    let api_state = ApiState {
        config: config.clone(),
        db: resources.db.clone(),
        chat_client: resources.openai_client.clone(),
        session_store: resources.session_store.clone(),
        retrieval_engine: resources.retrieval_engine.clone(),
        job_scheduler: scheduler,
        progress: resources.progress.clone(),
        evaluation_engine: resources.evaluation_engine.clone(),
    };

    let app = api_routes_v1(&api_state).with_state(api_state);

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    info!(address = %serve_address, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!(error = %err, "server error");
    }

    Ok(())
}
