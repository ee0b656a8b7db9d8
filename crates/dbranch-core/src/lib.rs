//! Core types, validation, and shared utilities for the dBranch curator.
//!
//! This crate provides:
//! - The article data model ([`ArticleRecord`], [`ArticleIndex`], [`Article`])
//! - Distinct identifier types for peers and content ([`PeerId`], [`ContentId`])
//! - Gossip announcement decoding and article name validation
//! - Ledger publication records and content location parsing
//! - Prometheus metrics helpers
//! - Shared error types

mod announce;
mod article;
mod error;
mod ids;
mod ledger;
pub mod metrics;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Mutable directory holding articles admitted over the gossip channel.
pub const DEFAULT_CURATED_DIR: &str = "/dBranch/curated";

/// Mutable directory holding articles confirmed on the ledger.
pub const DEFAULT_PUBLISHED_DIR: &str = "/dBranch/published";

/// Well-known location of the derived index document.
pub const DEFAULT_INDEX_PATH: &str = "/dBranch/index.json";

/// File extensions recognized as article bodies.
pub const ARTICLE_EXTENSIONS: &[&str] = &[".news"];

/// Suffix appended to an article name to form its record sidecar.
pub const RECORD_SUFFIX: &str = ".json";

/// URI scheme a ledger `location` must carry to reference stored content.
pub const CONTENT_URI_SCHEME: &str = "ipfs://";

pub use announce::{IncomingAnnouncement, validate_article_name};
pub use article::{Article, ArticleIndex, ArticleList, ArticleMetadata, ArticleRecord};
pub use error::{Error, Result};
pub use ids::{ContentId, PeerId};
pub use ledger::{LedgerMeta, LedgerRecord, LedgerSyncStatus, parse_content_location};
