//! picsync Client - external services behind the core traits
//!
//! This crate provides:
//!
//! - [`zoho`] - Zoho Creator record source (`RecordSource`)
//! - [`storage`] - Supabase Storage object store (`ObjectStore`)
//! - [`transform`] - Image resize and recompression (`ImageTransform`)
//! - [`record`] - Normalization of raw Zoho records
//!
//! # Overview
//!
//! The clients handle authentication, rate limiting, retries and response parsing,
//! and map every failure onto `AppError`.

pub mod record;
pub mod storage;
pub mod transform;
pub mod zoho;

// Re-export main client types
pub use storage::SupabaseStorage;
pub use transform::JpegTransform;
pub use zoho::{ZohoClient, ZohoConfig};
