mod config;
mod db;
mod errors;
mod keywords;
mod llm_client;
mod models;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use axum::extract::DefaultBodyLimit;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::keywords::blob::S3BlobStore;
use crate::keywords::editor::KeywordEditor;
use crate::keywords::extraction::LlmExtractionClient;
use crate::keywords::ingest::ResumeIngestor;
use crate::keywords::pg_store::PgResumeStore;
use crate::keywords::reconciler::KeywordReconciler;
use crate::keywords::state_machine::ResumeStateMachine;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting keyword engine v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.database_max_connections).await?;
    let store = Arc::new(PgResumeStore::new(db));

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let blobs = Arc::new(S3BlobStore::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize LLM-backed keyword extraction
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    let extractor = Arc::new(LlmExtractionClient::new(llm));
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let retry = config.retry_policy();
    info!(
        "Extraction retry policy: {} attempts, {}ms base backoff",
        retry.max_attempts,
        retry.base_backoff.as_millis()
    );

    let machine = ResumeStateMachine::new(
        store.clone(),
        KeywordReconciler::new(store.clone(), extractor, retry),
        KeywordEditor::new(store.clone()),
        ResumeIngestor::new(store, blobs),
    );

    let idle_ttl = config.session_idle_ttl();
    tokio::spawn(machine.clone().sweep_idle_sessions(idle_ttl));
    info!("Session sweeper started (idle ttl: {}s)", idle_ttl.as_secs());

    // Build router
    let app = build_router(AppState { machine })
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS origins to the web client's domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "keyword-engine-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
