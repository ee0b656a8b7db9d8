//! Article index rebuilding.
//!
//! The index is a materialized view of the store and is never patched in
//! place: every rebuild lists both article directories, loads each record
//! sidecar, and overwrites the index document with the full snapshot.

use std::time::Instant;

use dbranch_core::{ArticleIndex, ArticleList, validate_article_name};

use crate::store::ContentStore;
use crate::{Error, Result};

/// Regenerates the article index from store contents.
#[derive(Clone)]
pub struct IndexBuilder {
    store: ContentStore,
}

impl IndexBuilder {
    pub fn new(store: ContentStore) -> Self {
        Self { store }
    }

    /// Assemble the index from the store without writing it.
    ///
    /// Entries without a readable record (for example an article whose
    /// record has not been written yet) are left out.
    pub async fn build(&self) -> Result<ArticleIndex> {
        let mut index = ArticleIndex::new();

        for list in ArticleList::ALL {
            for name in self.store.list_names(list).await? {
                if validate_article_name(&name).is_err() {
                    continue;
                }
                match self.store.read_record(list, &name).await {
                    Ok(mut record) => {
                        if record.name != name {
                            tracing::warn!(
                                "Record for {} {} names {}; using the entry name",
                                list,
                                name,
                                record.name
                            );
                            record.name = name;
                        }
                        index.upsert(list, record);
                    }
                    Err(e) if e.is_not_found() || matches!(e, Error::Json(_)) => {
                        tracing::debug!("Skipping {} {} without a record: {}", list, name, e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        index.sort();
        Ok(index)
    }

    /// Rebuild the index and overwrite the persisted document.
    pub async fn rebuild(&self) -> Result<ArticleIndex> {
        let started = Instant::now();
        let index = self.build().await?;
        self.store.write_index(&index).await?;

        let elapsed = started.elapsed();
        dbranch_core::metrics::increment("index_rebuilds_total", 1);
        metrics::histogram!("index_rebuild_duration_seconds").record(elapsed.as_secs_f64());
        metrics::gauge!("index_articles", "list" => "curated").set(index.curated.len() as f64);
        metrics::gauge!("index_articles", "list" => "published").set(index.published.len() as f64);
        tracing::info!(
            "Rebuilt index: {} curated, {} published ({:?})",
            index.curated.len(),
            index.published.len(),
            elapsed
        );

        Ok(index)
    }
}
