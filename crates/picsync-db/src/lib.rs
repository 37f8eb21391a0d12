//! picsync DB - PostgreSQL persistence for synced images, sync runs and batch jobs
//!
//! # Overview
//!
//! The main components are:
//! - [`ImageRepository`] - Image catalog upserts, filtering and statistics
//! - [`SyncRunRepository`] - History of full and backfill runs
//! - [`BatchStateRepository`] - Batch job checkpoints
//! - [`PgMetadataStore`] - All three behind the core `MetadataStore` trait
//! - [`migrate`] - Idempotent schema setup

mod batch_repository;
mod image_repository;
mod run_repository;
mod schema;
mod store;

pub use batch_repository::BatchStateRepository;
pub use image_repository::ImageRepository;
pub use run_repository::SyncRunRepository;
pub use schema::{MIGRATIONS, migrate};
pub use store::PgMetadataStore;
