//! dBranch curation daemon components.
//!
//! This crate keeps a node's article lists in sync from two sources: article
//! announcements gossiped by trusted peers, and publication records written to
//! the ledger. Both land in a content-addressed store and are summarized in a
//! single index document that readers fetch.
//!
//! # Modules
//!
//! - [`admission`] - Peer allow-list for gossip announcements
//! - [`store`] - Content store over a Kubo node (or in memory)
//! - [`source`] - Gossip transport and ingestion pipeline
//! - [`sync`] - Ledger checkpoints and the polling cursor
//! - [`index`] - Index rebuilds from the stored records
//! - [`writer`] - Single-writer actor serializing every store mutation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐        ┌──────────────────┐
//! │  Gossip Topic   │        │ Ledger (Postgres)│
//! └────────┬────────┘        └────────┬─────────┘
//!          │                          │
//!          ▼                          ▼
//! ┌─────────────────┐        ┌──────────────────┐
//! │ GossipPipeline  │        │ LedgerSyncCursor │──▶ CheckpointStore
//! │(AdmissionPolicy)│        │   (periodic)     │
//! └────────┬────────┘        └────────┬─────────┘
//!          │ curated                  │ published
//!          └────────────┬─────────────┘
//!                       ▼
//!             ┌──────────────────┐
//!             │  CuratorWriter   │  one mutation at a time
//!             └────────┬─────────┘
//!                      ▼
//!             ┌──────────────────┐
//!             │   ContentStore   │  entries, records, index.json
//!             └──────────────────┘
//! ```
//!
//! The store is the source of truth; the index document is derived from the
//! per-article records and can always be rebuilt.

pub mod admission;
pub mod config;
pub mod error;
pub mod index;
pub mod retry;
pub mod source;
pub mod store;
pub mod sync;
pub mod writer;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use admission::{AdmissionPolicy, PeerAllowList};
pub use index::IndexBuilder;
pub use store::{
    AddOutcome, ContentStore, KuboClient, KuboConfig, MemoryBackend, Provenance, StoreBackend,
    StoreLayout, StoreUpdate,
};
pub use writer::{CuratorWriter, WriterHandle};

// Re-export pipeline types
pub use source::{GossipConfig, GossipMessage, GossipPipeline, GossipStats, PubSub, Subscription};
pub use sync::{
    BlockStatus, CheckpointStore, LedgerSource, LedgerSyncConfig, LedgerSyncCursor, PostgresLedger,
};
