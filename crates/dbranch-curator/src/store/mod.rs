//! Content store access.
//!
//! Articles live in a content-addressed store that exposes a mutable,
//! filesystem-like path overlay (IPFS MFS). Each article occupies two paths in
//! its list directory:
//!
//! ```text
//! /dBranch/curated/foo.news        -> link to /ipfs/<cid>
//! /dBranch/curated/foo.news.json   -> ArticleRecord sidecar
//! ```
//!
//! [`StoreBackend`] is the raw path API. [`ContentStore`] layers the article
//! semantics on top: idempotent add-or-replace keyed by content hash, pinning,
//! idempotent removal, and record/index reads and writes.

mod kubo;
mod memory;

pub use kubo::{KuboClient, KuboConfig};
pub use memory::MemoryBackend;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dbranch_core::{
    Article, ArticleIndex, ArticleList, ArticleMetadata, ArticleRecord, ContentId, LedgerRecord,
    RECORD_SUFFIX, validate_article_name,
};

use crate::{Error, Result};

/// Result of a stat on a mutable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStat {
    pub hash: ContentId,
    pub size: u64,
}

/// Raw operations on the content store's mutable path overlay.
///
/// Missing paths are reported as [`Error::NotFound`]. Unreachable backends
/// report [`Error::StoreUnavailable`], and content that cannot be resolved
/// reports [`Error::ContentUnavailable`].
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn stat(&self, path: &str) -> Result<EntryStat>;

    /// Link an immutable object (`/ipfs/<cid>`) into the mutable overlay.
    async fn copy(&self, source: &str, dest: &str) -> Result<()>;

    /// Retain the full object graph locally.
    async fn pin(&self, cid: &ContentId) -> Result<()>;

    async fn remove(&self, path: &str) -> Result<()>;

    /// Names of the entries directly under `dir`.
    async fn list(&self, dir: &str) -> Result<Vec<String>>;

    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write `data` to `path`, creating or truncating it.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Create a directory and any missing parents.
    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn is_up(&self) -> bool;
}

/// Where lists and the index live in the mutable overlay.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub curated_dir: String,
    pub published_dir: String,
    pub index_path: String,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            curated_dir: dbranch_core::DEFAULT_CURATED_DIR.to_string(),
            published_dir: dbranch_core::DEFAULT_PUBLISHED_DIR.to_string(),
            index_path: dbranch_core::DEFAULT_INDEX_PATH.to_string(),
        }
    }
}

impl StoreLayout {
    pub fn dir(&self, list: ArticleList) -> &str {
        match list {
            ArticleList::Curated => &self.curated_dir,
            ArticleList::Published => &self.published_dir,
        }
    }

    pub fn entry_path(&self, list: ArticleList, name: &str) -> String {
        format!("{}/{}", self.dir(list).trim_end_matches('/'), name)
    }

    pub fn record_path(&self, list: ArticleList, name: &str) -> String {
        format!("{}{}", self.entry_path(list, name), RECORD_SUFFIX)
    }
}

/// What [`ContentStore::add_or_replace`] did to the named entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// No entry existed under the name.
    Added,
    /// The entry already pointed at the same content.
    Unchanged,
    /// The entry pointed at different content and was superseded.
    Replaced,
}

impl AddOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Unchanged => "unchanged",
            Self::Replaced => "replaced",
        }
    }
}

/// Where an article came from, carried into its record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub ledger_tx_hash: Option<String>,
    pub date_published: Option<DateTime<Utc>>,
}

impl Provenance {
    /// An announcement received over the gossip channel.
    pub fn gossip() -> Self {
        Self::default()
    }

    pub fn ledger(record: &LedgerRecord) -> Self {
        Self {
            ledger_tx_hash: Some(record.tx_hash.clone()),
            date_published: Some(record.date_published),
        }
    }
}

/// Report from a successful add-or-replace.
#[derive(Debug, Clone)]
pub struct StoreUpdate {
    pub outcome: AddOutcome,
    pub record: ArticleRecord,
    /// The persisted record changed, so a previously built index is stale.
    ///
    /// True for `Added` and `Replaced`, and for `Unchanged` when a missing or
    /// outdated sidecar had to be rewritten.
    pub index_stale: bool,
}

/// Article-level operations over a [`StoreBackend`].
#[derive(Clone)]
pub struct ContentStore {
    backend: Arc<dyn StoreBackend>,
    layout: StoreLayout,
}

impl ContentStore {
    pub fn new(backend: Arc<dyn StoreBackend>, layout: StoreLayout) -> Self {
        Self { backend, layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    pub async fn is_up(&self) -> bool {
        self.backend.is_up().await
    }

    /// Create both list directories and the index's parent directory.
    pub async fn ensure_dirs(&self) -> Result<()> {
        for list in ArticleList::ALL {
            self.backend.mkdir(self.layout.dir(list)).await?;
        }
        if let Some((parent, _)) = self.layout.index_path.rsplit_once('/')
            && !parent.is_empty()
        {
            self.backend.mkdir(parent).await?;
        }
        Ok(())
    }

    /// Make `name` in `list` point at `cid`, pinning the content.
    ///
    /// Calling this repeatedly with the same arguments is safe: once the entry
    /// matches, later calls return [`AddOutcome::Unchanged`] without mutating
    /// the store. A different `cid` supersedes the old entry; the old content
    /// stays pinned.
    ///
    /// The record sidecar is written last, so a sidecar implies pinned
    /// content. An attempt that failed part way leaves an entry without a
    /// sidecar, and the next call finishes the pin and the record.
    pub async fn add_or_replace(
        &self,
        list: ArticleList,
        name: &str,
        cid: &ContentId,
        provenance: &Provenance,
    ) -> Result<StoreUpdate> {
        validate_article_name(name)?;
        let path = self.layout.entry_path(list, name);

        let mut outcome = AddOutcome::Added;
        match self.backend.stat(&path).await {
            Ok(stat) if &stat.hash == cid => {
                tracing::debug!("Already have {} {} with hash {}", list, name, cid);
                let (record, rewritten) = self
                    .ensure_record(list, name, cid, stat.size, provenance)
                    .await?;
                return Ok(StoreUpdate {
                    outcome: AddOutcome::Unchanged,
                    record,
                    index_stale: rewritten,
                });
            }
            Ok(stat) => {
                tracing::info!(
                    "Replacing {} {} ({} -> {})",
                    list,
                    name,
                    stat.hash,
                    cid
                );
                self.remove_path(&path).await?;
                self.remove_path(&self.layout.record_path(list, name)).await?;
                outcome = AddOutcome::Replaced;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let source = cid.ipfs_path();
        tracing::debug!("Copying {} to {}", source, path);
        self.backend.copy(&source, &path).await?;
        self.backend.pin(cid).await?;

        let stat = self.backend.stat(&path).await?;
        let record = ArticleRecord {
            name: name.to_string(),
            cid: cid.clone(),
            size: stat.size,
            date_added: Utc::now(),
            date_published: provenance.date_published,
            ledger_tx_hash: provenance.ledger_tx_hash.clone(),
            metadata: self.read_metadata(&path).await,
        };
        self.write_record(list, &record).await?;

        metrics::counter!("store_operations_total", "op" => outcome.as_str(), "list" => list.as_str())
            .increment(1);
        tracing::info!("{} {} article {} ({})", outcome.as_str(), list, name, cid);

        Ok(StoreUpdate {
            outcome,
            record,
            index_stale: true,
        })
    }

    /// Rewrite the sidecar of an unchanged entry if it is missing or lacks the
    /// given provenance, pinning the content first. Returns the current record
    /// and whether it was written.
    async fn ensure_record(
        &self,
        list: ArticleList,
        name: &str,
        cid: &ContentId,
        size: u64,
        provenance: &Provenance,
    ) -> Result<(ArticleRecord, bool)> {
        let existing = match self.read_record(list, name).await {
            Ok(record) => Some(record),
            Err(e) if e.is_not_found() || matches!(e, Error::Json(_)) => None,
            Err(e) => return Err(e),
        };

        if let Some(record) = &existing
            && &record.cid == cid
            && (provenance.ledger_tx_hash.is_none()
                || record.ledger_tx_hash == provenance.ledger_tx_hash)
        {
            return Ok((record.clone(), false));
        }

        tracing::info!("Repairing record for {} {}", list, name);
        self.backend.pin(cid).await?;
        let path = self.layout.entry_path(list, name);
        let record = ArticleRecord {
            name: name.to_string(),
            cid: cid.clone(),
            size,
            date_added: existing
                .as_ref()
                .map(|r| r.date_added)
                .unwrap_or_else(Utc::now),
            date_published: provenance
                .date_published
                .or(existing.as_ref().and_then(|r| r.date_published)),
            ledger_tx_hash: provenance
                .ledger_tx_hash
                .clone()
                .or(existing.as_ref().and_then(|r| r.ledger_tx_hash.clone())),
            metadata: self.read_metadata(&path).await,
        };
        self.write_record(list, &record).await?;
        Ok((record, true))
    }

    /// Remove `name` and its record from `list`. Missing entries are not an error.
    ///
    /// Returns `true` if the article entry existed.
    pub async fn remove(&self, list: ArticleList, name: &str) -> Result<bool> {
        validate_article_name(name)?;
        let existed = self.remove_path(&self.layout.entry_path(list, name)).await?;
        self.remove_path(&self.layout.record_path(list, name)).await?;
        if existed {
            metrics::counter!("store_operations_total", "op" => "removed", "list" => list.as_str())
                .increment(1);
            tracing::info!("Removed {} article {}", list, name);
        }
        Ok(existed)
    }

    async fn remove_path(&self, path: &str) -> Result<bool> {
        match self.backend.remove(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Names in a list directory. A missing directory is an empty list.
    pub async fn list_names(&self, list: ArticleList) -> Result<Vec<String>> {
        match self.backend.list(self.layout.dir(list)).await {
            Ok(names) => Ok(names),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn read_record(&self, list: ArticleList, name: &str) -> Result<ArticleRecord> {
        let data = self
            .backend
            .read(&self.layout.record_path(list, name))
            .await?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn write_record(&self, list: ArticleList, record: &ArticleRecord) -> Result<()> {
        let data = serde_json::to_vec_pretty(record)?;
        self.backend
            .write(&self.layout.record_path(list, &record.name), &data)
            .await
    }

    /// Article body with its record attached when one exists.
    pub async fn read_article(&self, list: ArticleList, name: &str) -> Result<Article> {
        validate_article_name(name)?;
        let data = self.backend.read(&self.layout.entry_path(list, name)).await?;
        let mut article: Article = serde_json::from_slice(&data)?;
        article.record = match self.read_record(list, name).await {
            Ok(record) => Some(record),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        Ok(article)
    }

    /// Metadata cached from the article body. Bodies that do not parse yield
    /// empty metadata; the article is still curated.
    async fn read_metadata(&self, path: &str) -> ArticleMetadata {
        let parsed = match self.backend.read(path).await {
            Ok(data) => serde_json::from_slice::<Article>(&data).map_err(Error::from),
            Err(e) => Err(e),
        };
        match parsed {
            Ok(article) => article.metadata,
            Err(e) => {
                tracing::warn!("Could not read article metadata from {}: {}", path, e);
                ArticleMetadata::default()
            }
        }
    }

    /// The persisted index. A missing index document reads as empty.
    pub async fn read_index(&self) -> Result<ArticleIndex> {
        match self.read_index_raw().await? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(ArticleIndex::default()),
        }
    }

    /// The persisted index document exactly as stored, or `None` before the
    /// first rebuild.
    pub async fn read_index_raw(&self) -> Result<Option<Vec<u8>>> {
        match self.backend.read(&self.layout.index_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write_index(&self, index: &ArticleIndex) -> Result<()> {
        let data = serde_json::to_vec_pretty(index)?;
        self.backend.write(&self.layout.index_path, &data).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Delegates to a [`MemoryBackend`], failing each armed call once.
    #[derive(Default)]
    struct FailOnce {
        inner: Arc<MemoryBackend>,
        copy: AtomicBool,
        pin: AtomicBool,
        write: AtomicBool,
    }

    fn trip(armed: &AtomicBool, op: &str) -> Result<()> {
        if armed.swap(false, Ordering::SeqCst) {
            Err(Error::StoreUnavailable(format!("{} timed out", op)))
        } else {
            Ok(())
        }
    }

    #[async_trait]
    impl StoreBackend for FailOnce {
        async fn stat(&self, path: &str) -> Result<EntryStat> {
            self.inner.stat(path).await
        }

        async fn copy(&self, source: &str, dest: &str) -> Result<()> {
            trip(&self.copy, "copy")?;
            self.inner.copy(source, dest).await
        }

        async fn pin(&self, cid: &ContentId) -> Result<()> {
            trip(&self.pin, "pin")?;
            self.inner.pin(cid).await
        }

        async fn remove(&self, path: &str) -> Result<()> {
            self.inner.remove(path).await
        }

        async fn list(&self, dir: &str) -> Result<Vec<String>> {
            self.inner.list(dir).await
        }

        async fn read(&self, path: &str) -> Result<Vec<u8>> {
            self.inner.read(path).await
        }

        async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
            trip(&self.write, "write")?;
            self.inner.write(path, data).await
        }

        async fn mkdir(&self, path: &str) -> Result<()> {
            self.inner.mkdir(path).await
        }

        async fn is_up(&self) -> bool {
            self.inner.is_up().await
        }
    }

    fn failing_store() -> (Arc<FailOnce>, ContentStore) {
        let backend = Arc::new(FailOnce::default());
        let store = ContentStore::new(backend.clone(), StoreLayout::default());
        (backend, store)
    }

    const BODY: &str = r#"{"metadata":{"type":"news","title":"Foo","sub_title":"","author":"A"},"contents":{}}"#;

    fn store() -> (Arc<MemoryBackend>, ContentStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = ContentStore::new(backend.clone(), StoreLayout::default());
        (backend, store)
    }

    #[tokio::test]
    async fn test_add_fresh_article() {
        let (backend, store) = store();
        let cid = backend.put_object(BODY);

        let update = store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap();

        assert_eq!(update.outcome, AddOutcome::Added);
        assert!(update.index_stale);
        assert_eq!(update.record.size, BODY.len() as u64);
        assert_eq!(update.record.metadata.title, "Foo");
        assert!(backend.is_pinned(&cid));

        let record = store.read_record(ArticleList::Curated, "foo.news").await.unwrap();
        assert_eq!(record.cid, cid);
        assert!(record.ledger_tx_hash.is_none());
    }

    #[tokio::test]
    async fn test_same_cid_is_unchanged_without_mutation() {
        let (backend, store) = store();
        let cid = backend.put_object(BODY);
        store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap();
        let mutations = backend.mutation_count();

        let update = store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap();

        assert_eq!(update.outcome, AddOutcome::Unchanged);
        assert!(!update.index_stale);
        assert_eq!(backend.mutation_count(), mutations);
    }

    #[tokio::test]
    async fn test_different_cid_replaces_entry() {
        let (backend, store) = store();
        let cid1 = backend.put_object(BODY);
        let cid2 = backend.put_object(r#"{"metadata":{"title":"Foo v2"},"contents":{}}"#);

        store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid1, &Provenance::gossip())
            .await
            .unwrap();
        let update = store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid2, &Provenance::gossip())
            .await
            .unwrap();

        assert_eq!(update.outcome, AddOutcome::Replaced);
        let record = store.read_record(ArticleList::Curated, "foo.news").await.unwrap();
        assert_eq!(record.cid, cid2);
        assert_eq!(record.metadata.title, "Foo v2");
        assert_eq!(
            store.list_names(ArticleList::Curated).await.unwrap(),
            vec!["foo.news".to_string(), "foo.news.json".to_string()]
        );
        // Superseded content stays pinned
        assert!(backend.is_pinned(&cid1));
    }

    #[tokio::test]
    async fn test_unchanged_repairs_missing_record() {
        let (backend, store) = store();
        let cid = backend.put_object(BODY);
        store
            .add_or_replace(ArticleList::Published, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap();
        backend
            .remove(&store.layout().record_path(ArticleList::Published, "foo.news"))
            .await
            .unwrap();

        let update = store
            .add_or_replace(ArticleList::Published, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap();

        assert_eq!(update.outcome, AddOutcome::Unchanged);
        assert!(update.index_stale);
        assert!(store.read_record(ArticleList::Published, "foo.news").await.is_ok());
    }

    #[tokio::test]
    async fn test_unchanged_records_ledger_confirmation() {
        let (backend, store) = store();
        let cid = backend.put_object(BODY);
        store
            .add_or_replace(ArticleList::Published, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap();

        let provenance = Provenance {
            ledger_tx_hash: Some("abcd".to_string()),
            date_published: Some(Utc::now()),
        };
        let update = store
            .add_or_replace(ArticleList::Published, "foo.news", &cid, &provenance)
            .await
            .unwrap();

        assert_eq!(update.outcome, AddOutcome::Unchanged);
        assert!(update.index_stale);
        assert_eq!(update.record.ledger_tx_hash.as_deref(), Some("abcd"));
    }

    #[tokio::test]
    async fn test_unparseable_body_gets_default_metadata() {
        let (backend, store) = store();
        let cid = backend.put_object("not an article");

        let update = store
            .add_or_replace(ArticleList::Curated, "raw.news", &cid, &Provenance::gossip())
            .await
            .unwrap();
        assert_eq!(update.record.metadata, ArticleMetadata::default());
    }

    #[tokio::test]
    async fn test_unresolvable_content_is_permanent_failure() {
        let (_backend, store) = store();
        let err = store
            .add_or_replace(
                ArticleList::Curated,
                "foo.news",
                &ContentId::from("QmMissing"),
                &Provenance::gossip(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContentUnavailable(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transient() {
        let (backend, store) = store();
        let cid = backend.put_object(BODY);
        backend.set_available(false);

        let err = store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_failed_pin_is_finished_on_retry() {
        let (backend, store) = failing_store();
        let cid = backend.inner.put_object(BODY);
        backend.pin.store(true, Ordering::SeqCst);

        let err = store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(!backend.inner.is_pinned(&cid));
        // Linked but not yet recorded, so the index leaves it out
        let missing = store.read_record(ArticleList::Curated, "foo.news").await.unwrap_err();
        assert!(missing.is_not_found());

        let update = store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap();
        assert_eq!(update.outcome, AddOutcome::Unchanged);
        assert!(update.index_stale);
        assert!(backend.inner.is_pinned(&cid));
        assert_eq!(store.read_record(ArticleList::Curated, "foo.news").await.unwrap().cid, cid);
    }

    #[tokio::test]
    async fn test_failed_record_write_is_repaired_on_retry() {
        let (backend, store) = failing_store();
        let cid = backend.inner.put_object(BODY);
        backend.write.store(true, Ordering::SeqCst);

        assert!(
            store
                .add_or_replace(ArticleList::Published, "foo.news", &cid, &Provenance::gossip())
                .await
                .is_err()
        );
        assert!(backend.inner.is_pinned(&cid));

        let update = store
            .add_or_replace(ArticleList::Published, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap();
        assert_eq!(update.outcome, AddOutcome::Unchanged);
        assert!(update.index_stale);
        assert_eq!(update.record.metadata.title, "Foo");
    }

    #[tokio::test]
    async fn test_failed_copy_on_replace_leaves_no_stale_record() {
        let (backend, store) = failing_store();
        let cid1 = backend.inner.put_object(BODY);
        let cid2 = backend.inner.put_object(r#"{"metadata":{"title":"Foo v2"},"contents":{}}"#);
        store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid1, &Provenance::gossip())
            .await
            .unwrap();

        backend.copy.store(true, Ordering::SeqCst);
        assert!(
            store
                .add_or_replace(ArticleList::Curated, "foo.news", &cid2, &Provenance::gossip())
                .await
                .is_err()
        );
        // The superseded entry and its record are both gone
        assert!(store.list_names(ArticleList::Curated).await.unwrap().is_empty());

        let update = store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid2, &Provenance::gossip())
            .await
            .unwrap();
        assert_eq!(update.outcome, AddOutcome::Added);
        assert_eq!(update.record.cid, cid2);
        assert_eq!(
            store.list_names(ArticleList::Curated).await.unwrap(),
            vec!["foo.news".to_string(), "foo.news.json".to_string()]
        );
    }

    #[tokio::test]
    async fn test_invalid_name_is_rejected() {
        let (backend, store) = store();
        let cid = backend.put_object(BODY);
        let err = store
            .add_or_replace(ArticleList::Curated, "../x.news", &cid, &Provenance::gossip())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert_eq!(backend.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (backend, store) = store();
        let cid = backend.put_object(BODY);
        store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap();

        assert!(store.remove(ArticleList::Curated, "foo.news").await.unwrap());
        assert!(!store.remove(ArticleList::Curated, "foo.news").await.unwrap());
        assert!(store.list_names(ArticleList::Curated).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_article_attaches_record() {
        let (backend, store) = store();
        let cid = backend.put_object(BODY);
        store
            .add_or_replace(ArticleList::Curated, "foo.news", &cid, &Provenance::gossip())
            .await
            .unwrap();

        let article = store.read_article(ArticleList::Curated, "foo.news").await.unwrap();
        assert_eq!(article.metadata.author, "A");
        assert_eq!(article.record.unwrap().cid, cid);

        let missing = store.read_article(ArticleList::Published, "foo.news").await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_index_reads_as_empty() {
        let (_backend, store) = store();
        assert!(store.read_index().await.unwrap().is_empty());
        assert!(store.read_index_raw().await.unwrap().is_none());
    }

    #[test]
    fn test_layout_paths() {
        let layout = StoreLayout {
            curated_dir: "/x/curated/".to_string(),
            ..StoreLayout::default()
        };
        assert_eq!(layout.entry_path(ArticleList::Curated, "a.news"), "/x/curated/a.news");
        assert_eq!(
            layout.record_path(ArticleList::Published, "a.news"),
            "/dBranch/published/a.news.json"
        );
    }
}
