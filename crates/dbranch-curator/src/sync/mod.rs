//! Ledger synchronization.
//!
//! Articles published on the ledger are mirrored into the published list.
//! Every watched address keeps its own checkpoint, so each polling cycle only
//! asks the ledger for blocks it has not processed yet.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  records_since(addr, n)  ┌──────────────────┐
//! │  PostgresLedger  │ ◀─────────────────────── │ LedgerSyncCursor │
//! │ (cardano-db-sync)│ ───────────────────────▶ │    (periodic)    │
//! └──────────────────┘     LedgerRecord[]       └───┬──────────┬───┘
//!                                                   │          │
//!                                  apply/rebuild    │          │ advance
//!                                                   ▼          ▼
//!                                      ┌──────────────┐  ┌─────────────────┐
//!                                      │ WriterHandle │  │ CheckpointStore │
//!                                      └──────────────┘  └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dbranch_curator::sync::{CheckpointStore, LedgerSyncConfig, LedgerSyncCursor, PostgresLedger};
//!
//! let ledger = Arc::new(PostgresLedger::from_conn_str("host=localhost dbname=cexplorer")?);
//! let checkpoints = CheckpointStore::open("~/.dbranch")?;
//! let config = LedgerSyncConfig {
//!     addresses: vec!["addr1q...".to_string()],
//!     ..Default::default()
//! };
//!
//! let cursor = LedgerSyncCursor::new(config, ledger, checkpoints, writer);
//! cursor.run(cancel).await;
//! ```

mod checkpoint;
mod cursor;
mod ledger;

pub use checkpoint::CheckpointStore;
pub use cursor::{AddressStatus, BlockStatus, LedgerSyncConfig, LedgerSyncCursor, SyncStats};
pub use ledger::{LedgerSource, PostgresLedger};
