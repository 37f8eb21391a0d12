//! Batch sync engine: the resumable, checkpointed job runner.
//!
//! # Architecture
//!
//! ```text
//! start ──▶ pending ──▶ loop {
//!     1. cancel requested?  → cancelled
//!     2. pause requested?   → paused (offset already persisted)
//!     3. fetch page at offset (bounded retry)
//!        empty page         → completed | completed_with_errors
//!        fetch failed       → failed
//!     4. run each record through the pipeline, checking cancel between records
//!     5. checkpoint: offset += page, batches_completed += 1
//!     6. sleep the inter-batch delay (wakes early on cancel or shutdown)
//! }
//! ```
//!
//! At most one job is active per engine. The active job lives in a registry owned by the
//! engine; control requests only set flags on it and never touch counters. Every state
//! write goes through [`BatchSyncEngine::checkpoint`], which persists the row first and
//! then updates the registry.
//!
//! # Graceful Shutdown
//!
//! When the shutdown token fires, the loop stops at the next batch boundary and leaves
//! the job `paused`. On the next start of the process, [`BatchSyncEngine::recover`]
//! registers it again so it can be resumed or cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::batch::{
    BatchConfig, BatchStatus, BatchSyncState, DEFAULT_ERROR_LOG_CAPACITY, DateRange, RetryConfig,
};
use crate::config::EngineSettings;
use crate::error::AppError;
use crate::models::SourceRecord;
use crate::pipeline::RecordPipeline;
use crate::reporter::{BatchEvent, BatchReporter, SilentBatchReporter};
use crate::traits::{ImageTransform, MetadataStore, ObjectStore, RecordSource};

/// Flags shared between the control plane and the loop of one job.
#[derive(Debug, Clone, Default)]
struct JobControl {
    pause: Arc<AtomicBool>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct ActiveJob {
    id: Uuid,
    status: BatchStatus,
    control: JobControl,
}

/// What a cancel request resolved to while holding the registry lock.
enum CancelAction {
    Signal,
    Finalize,
}

/// Status projection: the active job and the most recent ones.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOverview {
    pub active: Option<BatchSyncState>,
    pub recent: Vec<BatchSyncState>,
}

/// Runs batch jobs over a [`RecordPipeline`].
///
/// Cloning is cheap and every clone controls the same registry.
#[derive(Clone)]
pub struct BatchSyncEngine<R, T, O, M>
where
    R: RecordSource,
    T: ImageTransform,
    O: ObjectStore,
    M: MetadataStore,
{
    pipeline: RecordPipeline<R, T, O, M>,
    store: M,
    retry: RetryConfig,
    error_log_capacity: usize,
    recent_jobs: usize,
    registry: Arc<Mutex<Option<ActiveJob>>>,
    reporter: Arc<dyn BatchReporter>,
    shutdown: CancellationToken,
}

impl<R, T, O, M> BatchSyncEngine<R, T, O, M>
where
    R: RecordSource + 'static,
    T: ImageTransform + 'static,
    O: ObjectStore + 'static,
    M: MetadataStore + 'static,
{
    /// Create a new engine with default retry and a silent reporter.
    pub fn new(pipeline: RecordPipeline<R, T, O, M>) -> Self {
        let store = pipeline.metadata().clone();
        Self {
            pipeline,
            store,
            retry: RetryConfig::default(),
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
            recent_jobs: 10,
            registry: Arc::new(Mutex::new(None)),
            reporter: Arc::new(SilentBatchReporter),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the page-fetch retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Apply the `[engine]` section of the sync configuration.
    pub fn with_settings(mut self, settings: &EngineSettings) -> Self {
        self.error_log_capacity = settings.error_log_capacity.max(1);
        self.recent_jobs = settings.recent_jobs;
        self
    }

    /// Set the reporter receiving [`BatchEvent`]s.
    pub fn with_reporter(mut self, reporter: Arc<dyn BatchReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Set the token that pauses the active job at its next batch boundary.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    // =========================================================================
    // Control API
    // =========================================================================

    /// Validates `config`, persists a `pending` job and schedules its loop.
    ///
    /// Returns as soon as the job row exists.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the configuration is out of bounds; no row is created
    /// - `Conflict` if another job is `pending`, `running` or `paused`
    pub async fn start(&self, config: BatchConfig) -> Result<Uuid, AppError> {
        config.validate()?;

        let (state, control) = {
            let mut slot = self.lock_registry();
            if let Some(active) = slot.as_ref() {
                return Err(AppError::Conflict(format!(
                    "batch job {} is still {}",
                    active.id, active.status
                )));
            }
            let state = BatchSyncState::new(config);
            let control = JobControl::default();
            *slot = Some(ActiveJob {
                id: state.id,
                status: state.status,
                control: control.clone(),
            });
            (state, control)
        };

        if let Err(e) = self.store.save_batch_state(&state).await {
            self.release(state.id);
            return Err(e);
        }

        let job_id = state.id;
        self.spawn_loop(state, control);
        Ok(job_id)
    }

    /// Requests a pause at the next batch boundary.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the job does not exist
    /// - `InvalidState` if the job is not `running`
    pub async fn pause(&self, job_id: Uuid) -> Result<(), AppError> {
        {
            let slot = self.lock_registry();
            if let Some(job) = slot.as_ref().filter(|job| job.id == job_id) {
                if job.status != BatchStatus::Running {
                    return Err(invalid_transition(job_id, job.status, "paused"));
                }
                job.control.pause.store(true, Ordering::SeqCst);
                return Ok(());
            }
        }
        Err(self.inactive_job_error(job_id, "paused").await)
    }

    /// Moves a `paused` job back to `running` and reschedules its loop.
    ///
    /// The loop continues from the persisted `current_offset`.
    pub async fn resume(&self, job_id: Uuid) -> Result<(), AppError> {
        let control = {
            let mut slot = self.lock_registry();
            match slot.as_mut().filter(|job| job.id == job_id) {
                Some(job) if job.status == BatchStatus::Paused => {
                    job.status = BatchStatus::Running;
                    job.control.pause.store(false, Ordering::SeqCst);
                    Some(job.control.clone())
                }
                Some(job) => return Err(invalid_transition(job_id, job.status, "resumed")),
                None => None,
            }
        };
        let Some(control) = control else {
            return Err(self.inactive_job_error(job_id, "resumed").await);
        };

        let resumed = async {
            let mut state = self.load(job_id).await?;
            state.transition(BatchStatus::Running)?;
            self.checkpoint(&mut state).await?;
            Ok::<_, AppError>(state)
        }
        .await;

        match resumed {
            Ok(state) => {
                self.spawn_loop(state, control);
                Ok(())
            }
            Err(e) => {
                self.set_registry_status(job_id, BatchStatus::Paused);
                Err(e)
            }
        }
    }

    /// Cancels a `pending`, `running` or `paused` job.
    ///
    /// A running job stops at the next record or batch boundary. A paused job is
    /// cancelled immediately without restarting its loop.
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), AppError> {
        let action = {
            let mut slot = self.lock_registry();
            match slot.as_mut().filter(|job| job.id == job_id) {
                Some(job) => match job.status {
                    BatchStatus::Pending | BatchStatus::Running => {
                        job.control.cancel.cancel();
                        Some(CancelAction::Signal)
                    }
                    BatchStatus::Paused => {
                        // blocks a concurrent resume while the row is written
                        job.status = BatchStatus::Cancelled;
                        Some(CancelAction::Finalize)
                    }
                    status => return Err(invalid_transition(job_id, status, "cancelled")),
                },
                None => None,
            }
        };

        match action {
            Some(CancelAction::Signal) => Ok(()),
            Some(CancelAction::Finalize) => {
                let cancelled = async {
                    let mut state = self.load(job_id).await?;
                    state.transition(BatchStatus::Cancelled)?;
                    self.checkpoint(&mut state).await?;
                    Ok::<_, AppError>(state)
                }
                .await;
                match cancelled {
                    Ok(state) => {
                        self.reporter.report(BatchEvent::Cancelled {
                            job_id,
                            stats: &state.stats,
                        });
                        Ok(())
                    }
                    Err(e) => {
                        self.set_registry_status(job_id, BatchStatus::Paused);
                        Err(e)
                    }
                }
            }
            None => Err(self.inactive_job_error(job_id, "cancelled").await),
        }
    }

    /// Latest persisted state of a job.
    pub async fn status(&self, job_id: Uuid) -> Result<BatchSyncState, AppError> {
        self.load(job_id).await
    }

    /// The active job, if any, and the most recent jobs, newest first.
    pub async fn overview(&self) -> Result<BatchOverview, AppError> {
        let active = match self.active_job_id() {
            Some(id) => self.store.get_batch_state(id).await?,
            None => None,
        };
        let recent = self.store.list_batch_states(self.recent_jobs).await?;
        Ok(BatchOverview { active, recent })
    }

    /// Id of the job occupying the active slot.
    pub fn active_job_id(&self) -> Option<Uuid> {
        self.lock_registry().as_ref().map(|job| job.id)
    }

    /// Re-registers a job left active by a previous process.
    ///
    /// The newest `pending`, `running` or `paused` row becomes the active job in
    /// `paused` state. Older ones are marked `failed`. Call once at startup, before
    /// accepting control requests.
    pub async fn recover(&self) -> Result<Option<Uuid>, AppError> {
        if let Some(id) = self.active_job_id() {
            return Err(AppError::Conflict(format!(
                "batch job {} is already active",
                id
            )));
        }

        let mut leftovers = self.store.list_active_batch_states().await?.into_iter();
        let Some(mut newest) = leftovers.next() else {
            return Ok(None);
        };

        for mut stale in leftovers {
            stale.fail(
                &AppError::Generic("job interrupted by process restart".to_string()),
                self.error_log_capacity,
            );
            self.store.save_batch_state(&stale).await?;
            warn!(job_id = %stale.id, "Marked interrupted batch job as failed");
        }

        newest.suspend_after_restart();
        self.store.save_batch_state(&newest).await?;
        *self.lock_registry() = Some(ActiveJob {
            id: newest.id,
            status: newest.status,
            control: JobControl::default(),
        });
        self.reporter.report(BatchEvent::Paused {
            job_id: newest.id,
            offset: newest.current_offset,
        });

        Ok(Some(newest.id))
    }

    /// Takes over a `paused` job persisted by another process.
    ///
    /// Unlike [`recover`](Self::recover) the row is never rewritten. A job that is
    /// still `pending` or `running` belongs to a live loop elsewhere and is refused.
    /// Terminal jobs are left out of the registry so control requests report them.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the job does not exist
    /// - `Conflict` if the job is running elsewhere or another job is registered here
    pub async fn adopt(&self, job_id: Uuid) -> Result<(), AppError> {
        if self.active_job_id() == Some(job_id) {
            return Ok(());
        }

        let state = self.load(job_id).await?;
        match state.status {
            BatchStatus::Paused => {}
            BatchStatus::Pending | BatchStatus::Running => {
                return Err(AppError::Conflict(format!(
                    "batch job {} is {} in another process",
                    job_id, state.status
                )));
            }
            _ => return Ok(()),
        }

        let mut slot = self.lock_registry();
        if let Some(active) = slot.as_ref() {
            return Err(AppError::Conflict(format!(
                "batch job {} is still {}",
                active.id, active.status
            )));
        }
        *slot = Some(ActiveJob {
            id: job_id,
            status: BatchStatus::Paused,
            control: JobControl::default(),
        });
        Ok(())
    }

    // =========================================================================
    // Loop
    // =========================================================================

    fn spawn_loop(&self, state: BatchSyncState, control: JobControl) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_job(state, control).await;
        });
    }

    async fn run_job(&self, mut state: BatchSyncState, control: JobControl) {
        let job_id = state.id;
        let Err(error) = self.drive(&mut state, &control).await else {
            return;
        };

        let message = error.to_string();
        self.reporter.report(BatchEvent::Failed {
            job_id,
            error: &message,
        });
        state.fail(&error, self.error_log_capacity);
        if let Err(e) = self.store.save_batch_state(&state).await {
            tracing::error!(%job_id, error = %e, "Failed to persist failed batch job");
        }
        self.release(job_id);
    }

    async fn drive(
        &self,
        state: &mut BatchSyncState,
        control: &JobControl,
    ) -> Result<(), AppError> {
        let job_id = state.id;
        let range = state.config.date_range();

        if state.status == BatchStatus::Pending {
            if control.cancel.is_cancelled() {
                return self.stop_cancelled(state).await;
            }
            state.total_records_estimated = match self.pipeline.source().count(&range).await {
                Ok(total) => total,
                Err(e) => {
                    warn!(%job_id, error = %e, "Record count unavailable");
                    None
                }
            };
            state.transition(BatchStatus::Running)?;
            self.checkpoint(state).await?;
            self.reporter.report(BatchEvent::JobStarted {
                job_id,
                total_estimated: state.total_records_estimated,
            });
        } else {
            self.reporter.report(BatchEvent::JobResumed {
                job_id,
                offset: state.current_offset,
            });
        }

        loop {
            if control.cancel.is_cancelled() {
                return self.stop_cancelled(state).await;
            }
            if self.pause_requested(control) {
                return self.stop_paused(state, control).await;
            }

            let batch = state.batches_completed + 1;
            state.current_batch_started_at = Some(Utc::now());
            self.reporter.report(BatchEvent::BatchStarted {
                job_id,
                batch,
                offset: state.current_offset,
            });

            let Some(page) = self.fetch_with_retry(state, control, &range).await? else {
                continue;
            };

            if page.is_empty() {
                let status = BatchStatus::finished(&state.stats);
                state.transition(status)?;
                self.checkpoint(state).await?;
                self.reporter.report(BatchEvent::Finished {
                    job_id,
                    status,
                    stats: &state.stats,
                });
                return Ok(());
            }

            for record in &page {
                if control.cancel.is_cancelled() {
                    // counters of the handled records are kept, the offset is not advanced
                    return self.stop_cancelled(state).await;
                }
                let result = self
                    .pipeline
                    .process_record(record, state.config.dry_run)
                    .await;
                for failure in &result.failures {
                    let error = failure.error.to_string();
                    self.reporter.report(BatchEvent::RecordFailed {
                        job_id,
                        record_id: &result.record_id,
                        field: &failure.field,
                        error: &error,
                    });
                }
                result.tally(
                    &mut state.stats,
                    &mut state.error_log,
                    self.error_log_capacity,
                );
            }

            state.current_offset += page.len() as u64;
            state.batches_completed += 1;
            state.current_batch_started_at = None;
            state.last_batch_completed_at = Some(Utc::now());
            self.checkpoint(state).await?;
            self.reporter.report(BatchEvent::BatchCompleted {
                job_id,
                batch,
                records: page.len(),
                offset: state.current_offset,
                stats: &state.stats,
            });

            if control.cancel.is_cancelled() {
                return self.stop_cancelled(state).await;
            }
            if self.pause_requested(control) {
                return self.stop_paused(state, control).await;
            }

            let delay = state.config.delay();
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = control.cancel.cancelled() => {}
                    _ = self.shutdown.cancelled() => {}
                }
            }
        }
    }

    /// Fetches the page at the job's offset, retrying transient errors.
    ///
    /// Returns `None` when a cancel or shutdown interrupted a retry wait.
    async fn fetch_with_retry(
        &self,
        state: &BatchSyncState,
        control: &JobControl,
        range: &DateRange,
    ) -> Result<Option<Vec<SourceRecord>>, AppError> {
        let mut attempt = 0;
        loop {
            let error = match self
                .pipeline
                .source()
                .fetch_page(state.current_offset, state.config.batch_size, range)
                .await
            {
                Ok(page) => return Ok(Some(page)),
                Err(e) => e,
            };

            attempt += 1;
            if !error.is_retryable() || attempt > self.retry.max_retries {
                return Err(error);
            }

            let delay = self.retry.delay_for_attempt(attempt);
            let message = error.to_string();
            self.reporter.report(BatchEvent::FetchRetry {
                job_id: state.id,
                attempt,
                delay_ms: delay.as_millis() as u64,
                error: &message,
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = control.cancel.cancelled() => return Ok(None),
                _ = self.shutdown.cancelled() => return Ok(None),
            }
        }
    }

    fn pause_requested(&self, control: &JobControl) -> bool {
        control.pause.load(Ordering::SeqCst) || self.shutdown.is_cancelled()
    }

    async fn stop_cancelled(&self, state: &mut BatchSyncState) -> Result<(), AppError> {
        state.transition(BatchStatus::Cancelled)?;
        self.checkpoint(state).await?;
        self.reporter.report(BatchEvent::Cancelled {
            job_id: state.id,
            stats: &state.stats,
        });
        Ok(())
    }

    async fn stop_paused(
        &self,
        state: &mut BatchSyncState,
        control: &JobControl,
    ) -> Result<(), AppError> {
        state.current_batch_started_at = None;
        state.transition(BatchStatus::Paused)?;
        state.updated_at = Utc::now();
        self.store.save_batch_state(state).await?;

        // A cancel accepted while the row was being written still saw `Running`
        // and only tripped the token; the lock orders it against the registry flip.
        let cancelled = {
            let mut slot = self.lock_registry();
            match slot.as_mut().filter(|job| job.id == state.id) {
                Some(job) if control.cancel.is_cancelled() => {
                    job.status = BatchStatus::Cancelled;
                    true
                }
                Some(job) => {
                    job.status = BatchStatus::Paused;
                    false
                }
                None => false,
            }
        };
        if cancelled {
            return self.stop_cancelled(state).await;
        }

        self.reporter.report(BatchEvent::Paused {
            job_id: state.id,
            offset: state.current_offset,
        });
        Ok(())
    }

    // =========================================================================
    // Persistence and registry
    // =========================================================================

    /// The single write path for job state: persist, then mirror into the registry.
    async fn checkpoint(&self, state: &mut BatchSyncState) -> Result<(), AppError> {
        state.updated_at = Utc::now();
        self.store.save_batch_state(state).await?;

        if state.status.is_terminal() {
            self.release(state.id);
        } else {
            self.set_registry_status(state.id, state.status);
        }
        Ok(())
    }

    async fn load(&self, job_id: Uuid) -> Result<BatchSyncState, AppError> {
        self.store
            .get_batch_state(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("batch job {}", job_id)))
    }

    /// Error for a control request against a job that is not in the active slot.
    async fn inactive_job_error(&self, job_id: Uuid, verb: &str) -> AppError {
        match self.store.get_batch_state(job_id).await {
            Ok(Some(state)) => invalid_transition(job_id, state.status, verb),
            Ok(None) => AppError::NotFound(format!("batch job {}", job_id)),
            Err(e) => e,
        }
    }

    fn set_registry_status(&self, job_id: Uuid, status: BatchStatus) {
        if let Some(job) = self.lock_registry().as_mut().filter(|job| job.id == job_id) {
            job.status = status;
        }
    }

    fn release(&self, job_id: Uuid) {
        let mut slot = self.lock_registry();
        if slot.as_ref().is_some_and(|job| job.id == job_id) {
            *slot = None;
        }
    }

    fn lock_registry(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn invalid_transition(job_id: Uuid, status: BatchStatus, verb: &str) -> AppError {
    AppError::InvalidState(format!(
        "batch job {} is {} and cannot be {}",
        job_id, status, verb
    ))
}
