//! Quick and full sync runs.
//!
//! A sync run is a single uninterrupted pass over the record source that reuses the
//! per-record pipeline of the batch engine, without pause or resume:
//!
//! - **backfill**: records older than the oldest image already synced, up to a count
//! - **full**: every record of the report, page by page, optionally capped
//!
//! Runs are tracked in `sync_runs` rows. Only one run may be in flight per service.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{Stream, TryStreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::{DEFAULT_ERROR_LOG_CAPACITY, DateRange};
use crate::error::AppError;
use crate::models::{SourceRecord, SyncMode, SyncRun};
use crate::pipeline::RecordPipeline;
use crate::traits::{ImageTransform, MetadataStore, ObjectStore, RecordSource};

/// Records per request in full mode.
pub const FULL_SYNC_PAGE_SIZE: u32 = 200;
/// Records fetched by a backfill when no count is given.
pub const DEFAULT_BACKFILL_RECORDS: u32 = 100;
/// Counters are persisted every this many records.
pub const PROGRESS_SAVE_INTERVAL: u64 = 50;

/// Clears the in-flight flag when the run ends, even on panic.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A run whose row exists and which holds the in-flight slot.
pub struct StartedRun {
    run: SyncRun,
    _guard: RunGuard,
}

impl StartedRun {
    pub fn id(&self) -> Uuid {
        self.run.id
    }
}

/// Executes sync runs over a [`RecordPipeline`].
#[derive(Clone)]
pub struct SyncRunService<R, T, O, M>
where
    R: RecordSource,
    T: ImageTransform,
    O: ObjectStore,
    M: MetadataStore,
{
    pipeline: RecordPipeline<R, T, O, M>,
    store: M,
    running: Arc<AtomicBool>,
    error_log_capacity: usize,
}

impl<R, T, O, M> SyncRunService<R, T, O, M>
where
    R: RecordSource,
    T: ImageTransform + 'static,
    O: ObjectStore,
    M: MetadataStore,
{
    pub fn new(pipeline: RecordPipeline<R, T, O, M>) -> Self {
        let store = pipeline.metadata().clone();
        Self {
            pipeline,
            store,
            running: Arc::new(AtomicBool::new(false)),
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
        }
    }

    /// Set the cap on persisted error entries per run.
    pub fn with_error_log_capacity(mut self, capacity: usize) -> Self {
        self.error_log_capacity = capacity.max(1);
        self
    }

    /// Whether a run is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claims the in-flight slot and persists a `running` row.
    ///
    /// # Errors
    ///
    /// `Conflict` if another run is in flight.
    pub async fn begin(
        &self,
        mode: SyncMode,
        max_records: Option<u32>,
    ) -> Result<StartedRun, AppError> {
        if max_records == Some(0) {
            return Err(AppError::ValidationError(
                "max_records must be positive".to_string(),
            ));
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::Conflict("a sync run is already in progress".to_string()));
        }
        let guard = RunGuard(Arc::clone(&self.running));

        let run = SyncRun::start(mode, max_records);
        self.store.save_sync_run(&run).await?;
        info!(run_id = %run.id, %mode, ?max_records, "Sync run started");

        Ok(StartedRun { run, _guard: guard })
    }

    /// Processes the run to its end and persists the final row.
    ///
    /// A failure of the record source or of a progress save finalizes the run as
    /// `failed`; only a failure to persist the final row is returned.
    pub async fn execute(&self, started: StartedRun) -> Result<SyncRun, AppError> {
        let StartedRun { mut run, _guard } = started;

        let outcome = match run.mode {
            SyncMode::Full => self.process_full(&mut run).await,
            SyncMode::Backfill => self.process_backfill(&mut run).await,
        };

        match outcome {
            Ok(()) => run.complete(),
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Sync run failed");
                run.fail(&e, self.error_log_capacity);
            }
        }

        self.store.save_sync_run(&run).await?;
        info!(
            run_id = %run.id,
            status = %run.status,
            records = run.stats.records_processed,
            synced = run.stats.images_synced,
            skipped = run.stats.images_skipped,
            errors = run.stats.errors,
            "Sync run finished"
        );
        Ok(run)
    }

    /// [`begin`](Self::begin) followed by [`execute`](Self::execute).
    pub async fn run(&self, mode: SyncMode, max_records: Option<u32>) -> Result<SyncRun, AppError> {
        let started = self.begin(mode, max_records).await?;
        self.execute(started).await
    }

    async fn process_backfill(&self, run: &mut SyncRun) -> Result<(), AppError> {
        let cursor = self.store.oldest_synced_at().await?;
        let limit = run.max_records.unwrap_or(DEFAULT_BACKFILL_RECORDS);
        let records = self
            .pipeline
            .source()
            .fetch_before(cursor, limit)
            .await?;

        for record in records.iter().take(limit as usize) {
            self.process(run, record).await?;
        }
        Ok(())
    }

    async fn process_full(&self, run: &mut SyncRun) -> Result<(), AppError> {
        let limit = run.max_records.map(u64::from);
        let mut pages = pin!(self.pages());

        while let Some(page) = pages.try_next().await? {
            for record in &page {
                if limit.is_some_and(|max| run.stats.records_processed >= max) {
                    return Ok(());
                }
                self.process(run, record).await?;
            }
        }
        Ok(())
    }

    /// Every page of the report, until the first empty one.
    fn pages(&self) -> impl Stream<Item = Result<Vec<SourceRecord>, AppError>> + '_ {
        futures::stream::try_unfold(0_u64, move |offset| async move {
            let page = self
                .pipeline
                .source()
                .fetch_page(offset, FULL_SYNC_PAGE_SIZE, &DateRange::default())
                .await?;
            if page.is_empty() {
                return Ok(None);
            }
            let next = offset + page.len() as u64;
            Ok(Some((page, next)))
        })
    }

    async fn process(&self, run: &mut SyncRun, record: &SourceRecord) -> Result<(), AppError> {
        let result = self.pipeline.process_record(record, false).await;
        result.tally(&mut run.stats, &mut run.error_log, self.error_log_capacity);

        if run.stats.records_processed % PROGRESS_SAVE_INTERVAL == 0 {
            self.store.save_sync_run(run).await?;
        }
        Ok(())
    }
}
