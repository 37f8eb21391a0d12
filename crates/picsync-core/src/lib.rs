//! picsync Core - Domain types, the batch sync engine, and services.
//!
//! This crate provides the core functionality for picsync, including:
//!
//! - **Domain models**: [`SourceRecord`], [`NewImage`], [`SyncRun`], etc.
//! - **Batch jobs**: the [`BatchStatus`] state machine and the persisted [`BatchSyncState`]
//! - **Services**: [`BatchSyncEngine`] for resumable batch jobs, [`SyncRunService`] for
//!   quick and full runs, both built on the per-record [`RecordPipeline`]
//! - **Traits**: [`RecordSource`], [`ImageTransform`], [`ObjectStore`], [`MetadataStore`]
//!   for dependency injection
//! - **Progress reporting**: [`BatchReporter`] trait for decoupled logging/UI
//!
//! # Architecture
//!
//! This crate is designed to be reusable by different frontends (CLI, server, etc.).
//! It performs no I/O of its own: the record source, image transform, object store and
//! metadata store are injected through traits.
//!
//! # Example
//!
//! ```ignore
//! use picsync_core::{BatchConfig, BatchSyncEngine, RecordPipeline};
//!
//! let pipeline = RecordPipeline::new(source, transform, storage, store, fields, options);
//! let engine = BatchSyncEngine::new(pipeline);
//!
//! let job_id = engine.start(BatchConfig::default().with_batch_size(50)).await?;
//! engine.pause(job_id).await?;
//! engine.resume(job_id).await?;
//! ```

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod reporter;
pub mod sync;
pub mod sync_run;
pub mod traits;

// Batch job types
pub use batch::{
    BatchConfig, BatchStatus, BatchSyncState, DateRange, ErrorLogEntry, ParseBatchStatusError,
    RetryConfig,
};

// Configuration
pub use config::{
    DbConfig, EngineSettings, FieldMapping, HttpConfig, ImageConfig, RetrySettings, SyncConfig,
    default_config_path, load_sync_config,
};

// Error handling
pub use error::AppError;

// Domain models
pub use models::{
    FilterValues, Image, ImageField, ImageFilter, ImagePage, ImageStats, NewImage, RunStatus,
    SourceRecord, SyncMode, SyncRun, TransformOptions, TransformedImage, UNKNOWN_RECORD_ID,
};

// Sync counters
pub use sync::{ImageOutcome, SyncStats};

// Progress reporting
pub use reporter::{BatchEvent, BatchReporter, SilentBatchReporter, TracingBatchReporter};

// Traits for dependency injection
pub use traits::{ImageTransform, MetadataStore, ObjectStore, RecordSource};

// Services (generic over trait implementations)
pub use engine::{BatchOverview, BatchSyncEngine};
pub use pipeline::{RecordPipeline, RecordResult};
pub use sync_run::{StartedRun, SyncRunService};
