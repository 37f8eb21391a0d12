//! picsync Server - REST API for the picsync image sync engine
//!
//! This crate provides an HTTP API over the sync services:
//!
//! - **Batch jobs**: Start, pause, resume, cancel and watch resumable batch jobs
//! - **Sync runs**: Trigger backfill and full runs, read run history
//! - **Images**: Browse the synced catalog with signed download URLs
//!
//! # API Documentation
//!
//! When running the server, interactive API documentation is available
//! at `/swagger-ui`.

pub mod config;
pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod openapi;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use router::create_router;
pub use state::AppState;
