use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, level_filters::LevelFilter};

mod api;
mod config;
mod db;
mod executor;
mod jobs;
mod media;

use config::Config;
use jobs::render::RenderContext;
use jobs::{CancelRegistry, JobManager};
use media::encoder::FfmpegEncoder;
use media::fetch::HttpSourceFetcher;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)?;

    let db = Arc::new(db::Database::new(&config.data_dir.join("renderd.db"))?);
    info!("job store at {}", config.data_dir.join("renderd.db").display());

    let job_manager = Arc::new(JobManager::new(db));
    let cancels = CancelRegistry::default();

    let ctx = Arc::new(RenderContext {
        job_manager: job_manager.clone(),
        fetcher: Arc::new(HttpSourceFetcher::new()),
        executor: Arc::new(FfmpegEncoder::new(config.ffmpeg_path.clone())),
        jobs_dir: config.data_dir.join("jobs"),
        fetch_concurrency: config.fetch_concurrency,
    });

    let processor = jobs::processor::JobProcessor::new(ctx, cancels.clone(), config.job_concurrency);
    let _processor_handle = tokio::spawn(async move {
        processor.run().await;
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .nest("/api", api::router(job_manager, cancels))
        .layer(cors);

    info!("starting render daemon on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
