//! HTTP-only binary: builds every collaborator and serves the axum router (§6). Ingestion
//! fan-out is still driven by the `worker` binary — this process only enqueues tasks and
//! spawns the lightweight finalizer (§4.6, §9 "avoid blocking a worker on a group-join").

use std::{sync::Arc, time::Duration};

use api_router::{api_routes_v1, api_state::ApiState};
use common::utils::config::get_config;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use main::setup::build_resources;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;
    let resources = build_resources(&config).await?;

    let job_scheduler = Arc::new(ingestion_pipeline::JobScheduler::new(
        resources.kv.clone(),
        resources.progress.clone(),
        resources.pipelines.clone(),
    ));

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
        job_scheduler,
        progress: resources.progress.clone(),
        evaluation_engine: resources.evaluation_engine.clone(),
    };

    let app = api_routes_v1(&api_state).with_state(api_state);

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    info!(address = %serve_address, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
