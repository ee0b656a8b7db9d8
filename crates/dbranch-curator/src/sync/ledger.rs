//! Ledger access.
//!
//! Publication records are read from a cardano-db-sync Postgres database.
//! An article publication is a transaction carrying metadata label `451` with
//! `name` and `loc` keys; the publishing address is the transaction's first
//! output.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use dbranch_core::{LedgerMeta, LedgerRecord, LedgerSyncStatus};
use tokio::sync::Mutex;
use tokio_postgres::{Client, Config, NoTls, Row};

use crate::{Error, Result};

/// Source of article-publication records.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Records published from `address` in blocks after `after_block`,
    /// ordered by block number ascending.
    async fn records_since(&self, address: &str, after_block: u64) -> Result<Vec<LedgerRecord>>;

    /// The publication record carried by one transaction, if any.
    async fn record_by_tx(&self, tx_hash: &str) -> Result<Option<LedgerRecord>>;

    /// Highest block number known to the ledger.
    async fn tip(&self) -> Result<u64>;

    /// Database identity, or `None` before the database is initialized.
    async fn meta(&self) -> Result<Option<LedgerMeta>>;

    async fn sync_status(&self) -> Result<LedgerSyncStatus>;

    async fn ping(&self) -> Result<()>;
}

const RECORD_COLUMNS: &str = "\
    SELECT tx_metadata.json->>'name', tx_metadata.json->>'loc', tx_out.address, tx.hash, \
           block.block_no::bigint, block.time \
    FROM tx_metadata \
    INNER JOIN tx ON tx_metadata.tx_id = tx.id \
    INNER JOIN block ON tx.block_id = block.id \
    INNER JOIN tx_out ON tx.id = tx_out.tx_id \
    WHERE tx_metadata.key = '451' \
      AND tx_metadata.json->>'name' IS NOT NULL \
      AND tx_metadata.json->>'loc' IS NOT NULL \
      AND tx_out.index = 0 \
      AND block.block_no IS NOT NULL";

/// Share of the chain's lifetime covered by stored blocks, and the newest
/// block time. Block times are stored as UTC.
const SYNC_STATUS: &str = "\
    SELECT (100 * (EXTRACT(EPOCH FROM MAX(time)) - EXTRACT(EPOCH FROM MIN(time))) \
             / NULLIF(EXTRACT(EPOCH FROM (NOW() AT TIME ZONE 'UTC')) - EXTRACT(EPOCH FROM MIN(time)), 0) \
           )::float8, \
           MAX(time) \
    FROM block";

/// cardano-db-sync ledger over tokio-postgres.
///
/// The connection is opened on first use and reopened after it drops, so a
/// database restart only costs the cycles that run while it is down.
pub struct PostgresLedger {
    config: Config,
    client: Mutex<Option<Client>>,
}

impl PostgresLedger {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    /// Accepts both `key=value` and `postgresql://` connection strings.
    pub fn from_conn_str(conn_str: &str) -> Result<Self> {
        let config = conn_str
            .parse::<Config>()
            .map_err(|e| Error::Config(format!("invalid ledger connection string: {}", e)))?;
        Ok(Self::new(config))
    }

    async fn query(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        let mut guard = self.client.lock().await;

        if guard.as_ref().is_none_or(Client::is_closed) {
            let (client, connection) = self.config.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::warn!("Ledger database connection closed: {}", e);
                }
            });
            tracing::info!("Connected to ledger database");
            *guard = Some(client);
        }

        let Some(client) = guard.as_ref() else {
            return Err(Error::Ledger("no ledger connection".to_string()));
        };
        match client.query(sql, params).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                if client.is_closed() {
                    *guard = None;
                }
                Err(e.into())
            }
        }
    }
}

fn row_to_record(row: &Row) -> Result<LedgerRecord> {
    let hash: Vec<u8> = row.try_get(3)?;
    let block_no: i64 = row.try_get(4)?;
    let time: NaiveDateTime = row.try_get(5)?;
    Ok(LedgerRecord {
        name: row.try_get(0)?,
        location: row.try_get(1)?,
        address: row.try_get(2)?,
        tx_hash: hex::encode(hash),
        block_number: u64::try_from(block_no)
            .map_err(|_| Error::Ledger(format!("negative block number {}", block_no)))?,
        date_published: time.and_utc(),
    })
}

fn decode_tx_hash(tx_hash: &str) -> Result<Vec<u8>> {
    hex::decode(tx_hash.trim()).map_err(|e| {
        dbranch_core::Error::InvalidField {
            field: "tx_hash",
            reason: e.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl LedgerSource for PostgresLedger {
    async fn records_since(&self, address: &str, after_block: u64) -> Result<Vec<LedgerRecord>> {
        let sql = format!(
            "{} AND tx_out.address = $1 AND block.block_no > $2::bigint \
             ORDER BY block.block_no ASC, tx.block_index ASC",
            RECORD_COLUMNS
        );
        let after = i64::try_from(after_block).unwrap_or(i64::MAX);
        let rows = self.query(&sql, &[&address, &after]).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn record_by_tx(&self, tx_hash: &str) -> Result<Option<LedgerRecord>> {
        let hash = decode_tx_hash(tx_hash)?;
        let sql = format!("{} AND tx.hash = $1", RECORD_COLUMNS);
        let rows = self.query(&sql, &[&hash]).await?;
        rows.first().map(row_to_record).transpose()
    }

    async fn tip(&self) -> Result<u64> {
        let rows = self
            .query("SELECT MAX(block_no)::bigint FROM block", &[])
            .await?;
        let tip: Option<i64> = match rows.first() {
            Some(row) => row.try_get(0)?,
            None => None,
        };
        Ok(tip.and_then(|t| u64::try_from(t).ok()).unwrap_or(0))
    }

    async fn meta(&self) -> Result<Option<LedgerMeta>> {
        let rows = self
            .query(
                "SELECT id, start_time, network_name, version FROM meta ORDER BY id LIMIT 1",
                &[],
            )
            .await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let start_time: NaiveDateTime = row.try_get(1)?;
        Ok(Some(LedgerMeta {
            id: row.try_get(0)?,
            start_time: start_time.and_utc(),
            network_name: row.try_get(2)?,
            version: row.try_get(3)?,
        }))
    }

    async fn sync_status(&self) -> Result<LedgerSyncStatus> {
        let rows = self.query(SYNC_STATUS, &[]).await?;
        let (percent, last_block_time): (Option<f64>, Option<NaiveDateTime>) = match rows.first() {
            Some(row) => (row.try_get(0)?, row.try_get(1)?),
            None => (None, None),
        };
        Ok(LedgerSyncStatus::new(
            percent,
            last_block_time.map(|t| t.and_utc()),
            Utc::now(),
        ))
    }

    async fn ping(&self) -> Result<()> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }
}
