//! Incremental ledger synchronization.
//!
//! For every watched address, each cycle asks the ledger for publication
//! records in blocks after the address's checkpoint and applies them to the
//! published list, oldest block first. The checkpoint moves past a block only
//! once every record in that block has been handled, so a crash can at most
//! cause records to be reprocessed, which the store turns into no-ops.

use std::sync::Arc;
use std::time::Duration;

use dbranch_core::{ArticleList, LedgerRecord};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::checkpoint::CheckpointStore;
use super::ledger::LedgerSource;
use crate::retry::sleep_or_cancel;
use crate::store::{AddOutcome, Provenance, StoreUpdate};
use crate::writer::WriterHandle;
use crate::{Error, Result};

/// Configuration for ledger synchronization.
#[derive(Debug, Clone)]
pub struct LedgerSyncConfig {
    /// Ledger addresses whose publications are curated.
    pub addresses: Vec<String>,

    /// Delay between polling cycles.
    pub poll_interval: Duration,
}

impl Default for LedgerSyncConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            poll_interval: Duration::from_secs(20),
        }
    }
}

/// Counters for one or more sync cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records returned by the ledger.
    pub records_seen: usize,
    /// Records rejected before reaching the store.
    pub invalid: usize,
    pub applied: usize,
    pub unchanged: usize,
    /// Records whose content could not be stored; skipped for good.
    pub dropped: usize,
    /// Addresses whose processing stopped early on a transient failure.
    pub deferred: usize,
    pub ledger_errors: usize,
    /// Whether the index was rebuilt at the end of the cycle.
    pub rebuilt: bool,
}

/// Checkpoint of one address against the ledger tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStatus {
    pub address: String,
    pub last_block: u64,
    pub blocks_behind: u64,
}

/// Ledger tip compared with every address checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStatus {
    pub tip: u64,
    pub addresses: Vec<AddressStatus>,
}

impl BlockStatus {
    /// Read the tip from `ledger` and each address's checkpoint.
    ///
    /// Only reads checkpoints, so it is safe to call while a daemon owns them.
    pub async fn load(
        ledger: &dyn LedgerSource,
        checkpoints: &CheckpointStore,
        addresses: &[String],
    ) -> Result<Self> {
        let tip = ledger.tip().await?;
        let addresses = addresses
            .iter()
            .map(|address| {
                let last_block = checkpoints.load(address)?;
                Ok(AddressStatus {
                    address: address.clone(),
                    last_block,
                    blocks_behind: tip.saturating_sub(last_block),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tip, addresses })
    }
}

/// Polls the ledger and applies new publications through the writer.
pub struct LedgerSyncCursor {
    config: LedgerSyncConfig,
    ledger: Arc<dyn LedgerSource>,
    checkpoints: CheckpointStore,
    writer: WriterHandle,
}

impl LedgerSyncCursor {
    pub fn new(
        config: LedgerSyncConfig,
        ledger: Arc<dyn LedgerSource>,
        checkpoints: CheckpointStore,
        writer: WriterHandle,
    ) -> Self {
        Self {
            config,
            ledger,
            checkpoints,
            writer,
        }
    }

    pub fn addresses(&self) -> &[String] {
        &self.config.addresses
    }

    /// Poll every `poll_interval` until cancelled. Failures never end the loop.
    pub async fn run(&self, cancel: CancellationToken) -> SyncStats {
        tracing::info!(
            "Starting ledger sync for {} address(es), polling every {:?}",
            self.config.addresses.len(),
            self.config.poll_interval
        );

        let mut total = SyncStats::default();
        loop {
            let cycle = self.sync_once(&cancel).await;
            total.records_seen += cycle.records_seen;
            total.invalid += cycle.invalid;
            total.applied += cycle.applied;
            total.unchanged += cycle.unchanged;
            total.dropped += cycle.dropped;
            total.deferred += cycle.deferred;
            total.ledger_errors += cycle.ledger_errors;
            total.rebuilt |= cycle.rebuilt;

            if !sleep_or_cancel(&cancel, self.config.poll_interval).await {
                break;
            }
        }

        tracing::info!(
            "Ledger sync stopped: {} records seen, {} applied, {} invalid, {} dropped",
            total.records_seen,
            total.applied,
            total.invalid,
            total.dropped
        );
        total
    }

    /// Run one polling cycle over every watched address.
    pub async fn sync_once(&self, cancel: &CancellationToken) -> SyncStats {
        let mut stats = SyncStats::default();
        let mut index_stale = false;
        metrics::counter!("ledger_cycles_total").increment(1);

        for address in &self.config.addresses {
            if cancel.is_cancelled() {
                break;
            }
            match self.sync_address(address, cancel, &mut stats).await {
                Ok(stale) => index_stale |= stale,
                Err(Error::WriterClosed) => {
                    tracing::warn!("Writer stopped; ending ledger cycle");
                    return stats;
                }
                Err(e) => {
                    // Earlier addresses may already have applied records
                    tracing::error!("Ledger sync for {} failed: {}", address, e);
                }
            }
        }

        if index_stale {
            match self.writer.rebuild().await {
                Ok(_) => stats.rebuilt = true,
                Err(e) => tracing::warn!("Index rebuild after ledger cycle failed: {}", e),
            }
        }

        if stats.records_seen > 0 {
            tracing::info!(
                "Ledger cycle: {} records, {} applied, {} unchanged, {} invalid, {} dropped",
                stats.records_seen,
                stats.applied,
                stats.unchanged,
                stats.invalid,
                stats.dropped
            );
        }
        stats
    }

    /// Process new records for one address. Returns whether the index is stale.
    async fn sync_address(
        &self,
        address: &str,
        cancel: &CancellationToken,
        stats: &mut SyncStats,
    ) -> Result<bool> {
        let mut cursor = self.checkpoints.load(address)?;

        let query = tokio::select! {
            _ = cancel.cancelled() => return Ok(false),
            query = self.ledger.records_since(address, cursor) => query,
        };
        let mut records = match query {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Ledger query for {} failed, retrying next cycle: {}", address, e);
                stats.ledger_errors += 1;
                metrics::counter!("ledger_errors_total").increment(1);
                return Ok(false);
            }
        };
        records.retain(|r| r.block_number > cursor);
        records.sort_by_key(|r| r.block_number);

        let mut index_stale = false;
        for (i, record) in records.iter().enumerate() {
            stats.records_seen += 1;
            metrics::counter!("ledger_records_total").increment(1);

            match self.apply_record(record).await {
                Ok(Some(update)) => {
                    index_stale |= update.index_stale;
                    if update.outcome == AddOutcome::Unchanged {
                        stats.unchanged += 1;
                    } else {
                        stats.applied += 1;
                    }
                }
                Ok(None) => stats.invalid += 1,
                Err(Error::WriterClosed) => return Err(Error::WriterClosed),
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        "Could not apply {} from tx {} (block {}), retrying next cycle: {}",
                        record.name,
                        record.tx_hash,
                        record.block_number,
                        e
                    );
                    stats.deferred += 1;
                    return Ok(index_stale);
                }
                Err(e) => {
                    tracing::warn!(
                        "Dropping {} from tx {} (block {}): {}",
                        record.name,
                        record.tx_hash,
                        record.block_number,
                        e
                    );
                    stats.dropped += 1;
                }
            }

            // Only move past a block once all of its records are handled
            let block_done = records
                .get(i + 1)
                .is_none_or(|next| next.block_number != record.block_number);
            if block_done {
                cursor = self.checkpoints.advance(address, record.block_number)?;
                metrics::gauge!("ledger_cursor_block", "address" => address.to_string())
                    .set(cursor as f64);
            }
        }

        Ok(index_stale)
    }

    /// Apply one record to the published list.
    ///
    /// Returns `Ok(None)` for records that are not valid articles.
    async fn apply_record(&self, record: &LedgerRecord) -> Result<Option<StoreUpdate>> {
        let cid = match record.validate() {
            Ok(cid) => cid,
            Err(e) => {
                tracing::warn!(
                    "Rejecting ledger record {} from tx {} (block {}): {}",
                    record.name,
                    record.tx_hash,
                    record.block_number,
                    e
                );
                metrics::counter!("ledger_records_invalid_total").increment(1);
                return Ok(None);
            }
        };

        let update = self
            .writer
            .apply(
                ArticleList::Published,
                &record.name,
                &cid,
                Provenance::ledger(record),
            )
            .await?;
        metrics::counter!("ledger_records_applied_total", "outcome" => update.outcome.as_str())
            .increment(1);
        Ok(Some(update))
    }

    /// Curate the publication carried by a single transaction and rebuild the
    /// index. Checkpoints are left alone; the regular cycle will see the same
    /// record later and find it unchanged.
    pub async fn apply_tx(&self, tx_hash: &str) -> Result<StoreUpdate> {
        let record = self
            .ledger
            .record_by_tx(tx_hash)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no article publication in tx {}", tx_hash)))?;
        let cid = record.validate()?;

        let update = self
            .writer
            .apply(
                ArticleList::Published,
                &record.name,
                &cid,
                Provenance::ledger(&record),
            )
            .await?;
        if update.index_stale {
            self.writer.rebuild().await?;
        }
        Ok(update)
    }

    /// Compare each address checkpoint with the ledger tip.
    pub async fn block_status(&self) -> Result<BlockStatus> {
        BlockStatus::load(self.ledger.as_ref(), &self.checkpoints, &self.config.addresses).await
    }
}
