//! dBranch Serve - read-only HTTP API for curated articles
//!
//! This crate exposes the article index and individual articles that the
//! curator daemon maintains in the content store, along with read-only ledger
//! status. It never writes to the store; every mutation goes through the
//! curator.
//!
//! # Architecture
//!
//! - **AppState**: Shared application state (content store, ledger, response cache, configuration)
//! - **Cache**: Short-lived server-side cache for the index document and ledger status
//! - **Routes**: Endpoint handlers grouped by domain

pub mod cache;
mod error;
mod routes;
mod state;

pub use self::cache::{ResponseCache, get_or_compute, get_or_compute_json, new_cache};
pub use self::error::ApiError;
pub use self::routes::router;
pub use self::state::{AppState, Config, LedgerView};
