//! Single-writer task for store and index mutations.
//!
//! The gossip pipeline, the ledger sync loop and the admin tool all mutate
//! the same list directories and the same index document. Rather than letting
//! them race, every add, remove and rebuild is sent to one task that executes
//! commands strictly one at a time:
//!
//! ```text
//! ┌────────────────┐   ┌──────────────────┐
//! │ GossipPipeline │   │ LedgerSyncCursor │
//! └───────┬────────┘   └────────┬─────────┘
//!         │    WriterHandle     │
//!         └──────────┬──────────┘
//!                    ▼ mpsc
//!          ┌──────────────────┐
//!          │  CuratorWriter   │  ContentStore + IndexBuilder
//!          └──────────────────┘
//! ```
//!
//! A rebuild can therefore never interleave its reads of the store with
//! another caller's writes.

use dbranch_core::{ArticleIndex, ArticleList, ContentId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::index::IndexBuilder;
use crate::store::{ContentStore, Provenance, StoreUpdate};
use crate::{Error, Result};

/// Default depth of the command queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

enum Command {
    Apply {
        list: ArticleList,
        name: String,
        cid: ContentId,
        provenance: Provenance,
        reply: oneshot::Sender<Result<StoreUpdate>>,
    },
    Remove {
        list: ArticleList,
        name: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    Rebuild {
        reply: oneshot::Sender<Result<ArticleIndex>>,
    },
}

/// Owner of all store and index mutations.
pub struct CuratorWriter {
    store: ContentStore,
    builder: IndexBuilder,
    commands: mpsc::Receiver<Command>,
}

impl CuratorWriter {
    pub fn new(store: ContentStore, queue_depth: usize) -> (Self, WriterHandle) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let writer = Self {
            builder: IndexBuilder::new(store.clone()),
            store,
            commands: rx,
        };
        (writer, WriterHandle { commands: tx })
    }

    /// Start the writer on the runtime.
    ///
    /// The task exits once every [`WriterHandle`] has been dropped and the
    /// queued commands have been executed.
    pub fn spawn(store: ContentStore) -> (WriterHandle, JoinHandle<()>) {
        let (writer, handle) = Self::new(store, DEFAULT_QUEUE_DEPTH);
        (handle, tokio::spawn(writer.run()))
    }

    pub async fn run(mut self) {
        tracing::debug!("Curator writer started");
        let mut executed = 0usize;

        while let Some(command) = self.commands.recv().await {
            self.execute(command).await;
            executed += 1;
        }

        tracing::debug!("Curator writer stopped after {} commands", executed);
    }

    async fn execute(&self, command: Command) {
        // A dropped reply receiver means the caller gave up; the work is done
        // regardless.
        match command {
            Command::Apply {
                list,
                name,
                cid,
                provenance,
                reply,
            } => {
                let result = self
                    .store
                    .add_or_replace(list, &name, &cid, &provenance)
                    .await;
                let _ = reply.send(result);
            }
            Command::Remove { list, name, reply } => {
                let _ = reply.send(self.store.remove(list, &name).await);
            }
            Command::Rebuild { reply } => {
                let _ = reply.send(self.builder.rebuild().await);
            }
        }
    }
}

/// Cloneable sender side of the [`CuratorWriter`].
#[derive(Clone)]
pub struct WriterHandle {
    commands: mpsc::Sender<Command>,
}

impl WriterHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| Error::WriterClosed)?;
        rx.await.map_err(|_| Error::WriterClosed)?
    }

    /// Queue an add-or-replace and wait for its outcome.
    pub async fn apply(
        &self,
        list: ArticleList,
        name: &str,
        cid: &ContentId,
        provenance: Provenance,
    ) -> Result<StoreUpdate> {
        self.request(|reply| Command::Apply {
            list,
            name: name.to_string(),
            cid: cid.clone(),
            provenance,
            reply,
        })
        .await
    }

    pub async fn remove(&self, list: ArticleList, name: &str) -> Result<bool> {
        self.request(|reply| Command::Remove {
            list,
            name: name.to_string(),
            reply,
        })
        .await
    }

    pub async fn rebuild(&self) -> Result<ArticleIndex> {
        self.request(|reply| Command::Rebuild { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
