//! picsync REST API Server
//!
//! This binary starts the picsync REST API server, exposing the batch job control
//! endpoints, sync run triggers and the image catalog.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use picsync_client::{JpegTransform, SupabaseStorage, ZohoClient};
use picsync_core::{
    BatchSyncEngine, DbConfig, RecordPipeline, RetryConfig, SyncRunService, TracingBatchReporter,
    load_sync_config,
};
use picsync_db::PgMetadataStore;

use picsync_server::{AppState, ServerConfig, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command line arguments
    let config = ServerConfig::parse();

    let sync_config =
        load_sync_config(config.sync_config.clone()).context("Failed to load sync configuration")?;

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(DbConfig::default().max_connections * 2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    picsync_db::migrate(&pool)
        .await
        .context("Failed to apply database schema")?;
    info!("Database connection established");

    let source =
        ZohoClient::new(config.zoho.to_config()).context("Failed to initialize Zoho client")?;
    let objects = SupabaseStorage::new(
        &config.supabase.supabase_url,
        &config.supabase.supabase_service_key,
        &config.supabase.supabase_bucket,
    )
    .context("Failed to initialize Supabase Storage client")?;
    let store = PgMetadataStore::new(pool);

    let pipeline = RecordPipeline::new(
        source,
        JpegTransform::new(),
        objects.clone(),
        store.clone(),
        sync_config.fields.clone(),
        sync_config.image.transform_options(),
    );

    // Create shutdown token for graceful shutdown
    let shutdown_token = CancellationToken::new();

    let engine = BatchSyncEngine::new(pipeline.clone())
        .with_retry(RetryConfig::from(&sync_config.retry))
        .with_settings(&sync_config.engine)
        .with_reporter(Arc::new(TracingBatchReporter))
        .with_shutdown(shutdown_token.clone());
    let runs = SyncRunService::new(pipeline)
        .with_error_log_capacity(sync_config.engine.error_log_capacity);

    match engine.recover().await {
        Ok(Some(job_id)) => info!(%job_id, "Recovered interrupted batch job as paused"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Could not recover interrupted batch jobs"),
    }

    let app_state = AppState {
        engine,
        runs,
        store,
        objects,
        shutdown_token: shutdown_token.clone(),
    };

    // Build router
    let app = create_router(app_state, &config)?;

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid address")?;

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Starting picsync API server on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);

    // Peer addresses feed the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_token))
    .await
    .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");

    // Running batch jobs pause at their next batch boundary
    shutdown_token.cancel();

    // Give the engine time to checkpoint
    tokio::time::sleep(Duration::from_secs(2)).await;
}
