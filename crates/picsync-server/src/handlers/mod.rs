//! HTTP request handlers for API endpoints.

pub mod batch;
pub mod health;
pub mod images;
pub mod sync;
