//! Core library for catalog-ingest: fetches result pages from tracker and
//! catalog providers and normalizes them into [`models::ReleaseInfo`] records.
pub mod api;
pub mod assemble;
pub mod auth_cache;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod pagination;
pub mod util;
pub mod worker;

pub use error::{IngestError, Result};
