mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use picsync_client::{JpegTransform, SupabaseStorage, ZohoClient};
use picsync_core::{
    AppError, BatchConfig, BatchStatus, BatchSyncEngine, BatchSyncState, DbConfig,
    RecordPipeline, RetryConfig, SyncRun, SyncRunService, TracingBatchReporter, load_sync_config,
};
use picsync_db::PgMetadataStore;
use config::{BatchCommand, Command, Config};

type Engine = BatchSyncEngine<ZohoClient, JpegTransform, SupabaseStorage, PgMetadataStore>;

/// How often a followed job is polled.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            match error.downcast_ref::<AppError>() {
                Some(app_error) => eprintln!("Error: {}", app_error.user_message()),
                None => eprintln!("Error: {:#}", error),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let config = Config::parse();
    let sync_config =
        load_sync_config(config.config.clone()).context("Failed to load sync configuration")?;

    info!("Connecting to database...");
    let db_config = DbConfig::default();
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    picsync_db::migrate(&pool)
        .await
        .context("Failed to apply database schema")?;
    let store = PgMetadataStore::new(pool);

    // Create services with concrete implementations (dependency injection)
    let source = ZohoClient::new(config.zoho_config()).context("Failed to initialize Zoho client")?;
    let objects = SupabaseStorage::new(
        &config.supabase_url,
        &config.supabase_service_key,
        &config.supabase_bucket,
    )
    .context("Failed to initialize Supabase Storage client")?;
    let pipeline = RecordPipeline::new(
        source,
        JpegTransform::new(),
        objects,
        store.clone(),
        sync_config.fields.clone(),
        sync_config.image.transform_options(),
    );

    let shutdown = CancellationToken::new();
    let engine = BatchSyncEngine::new(pipeline.clone())
        .with_retry(RetryConfig::from(&sync_config.retry))
        .with_settings(&sync_config.engine)
        .with_reporter(Arc::new(TracingBatchReporter))
        .with_shutdown(shutdown.clone());

    match config.command {
        Command::Batch { action } => match action {
            BatchCommand::Start {
                batch_size,
                delay,
                from,
                to,
                dry_run,
            } => {
                let mut batch = BatchConfig::default()
                    .with_batch_size(batch_size)
                    .with_delay(delay)
                    .with_date_range(from, to);
                if dry_run {
                    batch = batch.with_dry_run();
                }
                let job_id = engine.start(batch).await?;
                println!("Started batch job {}", job_id);
                follow(&engine, job_id, &shutdown).await?;
            }
            BatchCommand::Resume { id } => {
                engine.adopt(id).await?;
                engine.resume(id).await?;
                println!("Resumed batch job {}", id);
                follow(&engine, id, &shutdown).await?;
            }
            BatchCommand::Cancel { id } => {
                engine.adopt(id).await?;
                engine.cancel(id).await?;
                println!("Cancelled batch job {}", id);
            }
            BatchCommand::List { limit } => {
                let jobs = store.batches().list_recent(limit as i64).await?;
                print_jobs(&jobs);
            }
        },
        Command::Sync { mode, max_records } => {
            let runs = SyncRunService::new(pipeline)
                .with_error_log_capacity(sync_config.engine.error_log_capacity);
            let run = runs.run(mode.into(), max_records).await?;
            print_run_summary(&run);
        }
        Command::Status => {
            let stats = store.images().stats().await?;
            println!("\nCatalog\n");
            println!("  Total images:          {}", stats.total_images);
            println!("  Recompressed:          {}", stats.processed_images);
            if let Some(last) = stats.last_synced_at {
                println!("  Last synced:           {}", last);
            }
            let recent = store.runs().list_recent(10).await?;
            if !recent.is_empty() {
                println!("\nRecent runs\n");
                for run in &recent {
                    println!(
                        "  {}  {:<8} {:<22} synced {:>5}  skipped {:>5}  errors {:>4}",
                        run.started_at.format("%Y-%m-%d %H:%M"),
                        run.mode.as_str(),
                        run.status.as_str(),
                        run.stats.images_synced,
                        run.stats.images_skipped,
                        run.stats.errors
                    );
                }
            }
            println!();
        }
    }

    Ok(())
}

/// Polls `job_id` until it stops, printing progress after every batch.
///
/// Ctrl+C fires `shutdown`, which pauses the job at the next batch boundary.
async fn follow(engine: &Engine, job_id: Uuid, shutdown: &CancellationToken) -> anyhow::Result<()> {
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nPausing after the current batch...");
            ctrl_c.cancel();
        }
    });

    let mut last_batches = None;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let state = engine.status(job_id).await?;

        if last_batches != Some(state.batches_completed) {
            last_batches = Some(state.batches_completed);
            print_progress(&state);
        }

        // the loop writes `paused` only once it has stopped
        if state.status.is_terminal() || state.status == BatchStatus::Paused {
            print_job_summary(&state);
            return Ok(());
        }
    }
}

fn print_progress(state: &BatchSyncState) {
    let progress = match (state.progress_percent(), state.total_records_estimated) {
        (Some(pct), Some(total)) => format!("{}/{} ({:.1}%)", state.current_offset, total, pct),
        _ => format!("{} records", state.current_offset),
    };
    eprintln!(
        "  batch {:>4}  {}  synced {}  skipped {}  errors {}",
        state.batches_completed,
        progress,
        state.stats.images_synced,
        state.stats.images_skipped,
        state.stats.errors
    );
}

fn print_job_summary(state: &BatchSyncState) {
    println!();
    println!("Batch job {}: {}", state.id, state.status);
    println!("  Records processed:   {}", state.stats.records_processed);
    println!("  Images synced:       {}", state.stats.images_synced);
    println!("  Images skipped:      {}", state.stats.images_skipped);
    println!("  Errors:              {}", state.stats.errors);
    if let Some(msg) = &state.error_message {
        println!("  Failure:             {}", msg);
    }
    if state.status == BatchStatus::Paused {
        println!("\nResume with: picsync batch resume {}", state.id);
    }
    println!();
}

fn print_jobs(jobs: &[BatchSyncState]) {
    if jobs.is_empty() {
        println!("No batch jobs yet. Start one with: picsync batch start");
        return;
    }
    println!();
    for job in jobs {
        let progress = job
            .progress_percent()
            .map(|p| format!("{:>5.1}%", p))
            .unwrap_or_else(|| "    ?".to_string());
        println!(
            "{}  {:<22} {}  offset {:>6}  synced {:>5}  errors {:>4}  {}",
            job.id,
            job.status.as_str(),
            progress,
            job.current_offset,
            job.stats.images_synced,
            job.stats.errors,
            job.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
}

fn print_run_summary(run: &SyncRun) {
    println!();
    println!("{} sync {}: {}", run.mode, run.id, run.status);
    println!("  Records processed:   {}", run.stats.records_processed);
    println!("  Images synced:       {}", run.stats.images_synced);
    println!("  Images skipped:      {}", run.stats.images_skipped);
    println!("  Errors:              {}", run.stats.errors);
    for entry in run.error_log.iter().filter(|e| e.fatal) {
        println!("  Failure:             {}", entry.error);
    }
    println!();
}
