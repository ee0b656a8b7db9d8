//! Ledger publication records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CONTENT_URI_SCHEME, ContentId, Error, Result, validate_article_name};

/// An article-publication record read from the ledger.
///
/// Records are produced by the ledger query already filtered to entries that
/// carry both a `name` and a `location`; whether the location actually points
/// at stored content is checked by [`LedgerRecord::content_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub name: String,
    pub location: String,
    /// Ledger account the publication was sent from.
    pub address: String,
    /// Hex-encoded transaction hash.
    pub tx_hash: String,
    pub block_number: u64,
    /// Block time of the transaction.
    pub date_published: DateTime<Utc>,
}

impl LedgerRecord {
    /// Content address referenced by `location`.
    pub fn content_id(&self) -> Result<ContentId> {
        parse_content_location(&self.location)
    }

    /// Validate the record as an article: a usable name and a content location.
    pub fn validate(&self) -> Result<ContentId> {
        validate_article_name(&self.name)?;
        self.content_id()
    }
}

/// Identity of the ledger database, from its `meta` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMeta {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub network_name: String,
    pub version: String,
}

/// How far the ledger database has caught up with the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSyncStatus {
    /// Share of chain time covered by stored blocks, 0 to 100.
    pub percent: Option<f64>,
    pub last_block_time: Option<DateTime<Utc>>,
    pub seconds_behind: i64,
    /// `seconds_behind` in a readable form, e.g. `2h 5m 13s`.
    pub time_behind: String,
}

impl LedgerSyncStatus {
    pub fn new(
        percent: Option<f64>,
        last_block_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let seconds_behind = last_block_time
            .map(|t| (now - t).num_seconds().max(0))
            .unwrap_or(0);
        Self {
            percent,
            last_block_time,
            seconds_behind,
            time_behind: format_duration(seconds_behind),
        }
    }
}

fn format_duration(total: i64) -> String {
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Extract the content address from an `ipfs://<cid>` location.
pub fn parse_content_location(location: &str) -> Result<ContentId> {
    let cid = location
        .strip_prefix(CONTENT_URI_SCHEME)
        .map(str::trim)
        .filter(|cid| !cid.is_empty())
        .ok_or_else(|| Error::InvalidLocation(location.to_string()))?;
    Ok(ContentId::new(cid))
}
