//! Article records and the derived article index.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContentId, Error};

/// Author-supplied metadata carried in every article body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleMetadata {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(alias = "subTitle")]
    pub sub_title: String,
    pub author: String,
}

/// One curated or published article instance.
///
/// Records are persisted as `<name>.json` next to the article in the store and
/// copied into the index. `metadata` is cached from the article body so the
/// index can be served without reading every article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub name: String,
    pub cid: ContentId,
    pub size: u64,
    /// When the article was admitted locally.
    pub date_added: DateTime<Utc>,
    /// Ledger block time; only set for ledger-sourced records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<DateTime<Utc>>,
    #[serde(
        default,
        alias = "cardano_tx_hash",
        skip_serializing_if = "Option::is_none"
    )]
    pub ledger_tx_hash: Option<String>,
    #[serde(default)]
    pub metadata: ArticleMetadata,
}

/// A full article document as stored under its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub metadata: ArticleMetadata,
    #[serde(default)]
    pub contents: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<ArticleRecord>,
}

/// The two lifecycle stages an article can be listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleList {
    /// Admitted locally from the gossip channel.
    Curated,
    /// Confirmed by a ledger transaction.
    Published,
}

impl ArticleList {
    pub const ALL: [ArticleList; 2] = [ArticleList::Curated, ArticleList::Published];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Curated => "curated",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for ArticleList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleList {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "curated" => Ok(Self::Curated),
            "published" => Ok(Self::Published),
            other => Err(Error::UnknownList(other.to_string())),
        }
    }
}

/// Materialized view of the store: every record, grouped by list.
///
/// The store is authoritative. An index is only ever produced by a full
/// rebuild, so each list is kept sorted by name and holds one record per name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleIndex {
    pub curated: Vec<ArticleRecord>,
    pub published: Vec<ArticleRecord>,
}

impl ArticleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, list: ArticleList) -> &[ArticleRecord] {
        match list {
            ArticleList::Curated => &self.curated,
            ArticleList::Published => &self.published,
        }
    }

    fn list_mut(&mut self, list: ArticleList) -> &mut Vec<ArticleRecord> {
        match list {
            ArticleList::Curated => &mut self.curated,
            ArticleList::Published => &mut self.published,
        }
    }

    /// Insert a record, superseding any record with the same name in that list.
    pub fn upsert(&mut self, list: ArticleList, record: ArticleRecord) {
        let records = self.list_mut(list);
        match records.binary_search_by(|r| r.name.as_str().cmp(&record.name)) {
            Ok(pos) => records[pos] = record,
            Err(pos) => records.insert(pos, record),
        }
    }

    /// Drop the named record from one list. The other list is left untouched.
    ///
    /// Returns `true` if a record was removed.
    pub fn remove(&mut self, list: ArticleList, name: &str) -> bool {
        let snapshot = self.list(list);
        let before = snapshot.len();
        let kept: Vec<ArticleRecord> = snapshot.iter().filter(|r| r.name != name).cloned().collect();
        let removed = kept.len() != before;
        *self.list_mut(list) = kept;
        removed
    }

    pub fn get(&self, list: ArticleList, name: &str) -> Option<&ArticleRecord> {
        self.list(list).iter().find(|r| r.name == name)
    }

    /// Find a record by content address, searching curated before published.
    pub fn find_by_cid(&self, cid: &ContentId) -> Option<(ArticleList, &ArticleRecord)> {
        ArticleList::ALL.into_iter().find_map(|list| {
            self.list(list)
                .iter()
                .find(|r| &r.cid == cid)
                .map(|r| (list, r))
        })
    }

    pub fn len(&self) -> usize {
        self.curated.len() + self.published.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curated.is_empty() && self.published.is_empty()
    }

    /// Sort both lists by name. Used after assembling an index from a listing.
    pub fn sort(&mut self) {
        self.curated.sort_by(|a, b| a.name.cmp(&b.name));
        self.published.sort_by(|a, b| a.name.cmp(&b.name));
    }
}
