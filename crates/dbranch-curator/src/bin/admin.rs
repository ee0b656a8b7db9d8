//! dBranch curator administration utility.
//!
//! Performs one-off maintenance against the same store and ledger the daemon
//! uses: curating or removing a single article, rebuilding the index,
//! importing one ledger transaction, and inspecting sync progress.
//!
//! # Usage
//!
//! ```bash
//! # Curate an article by hand
//! dbranch-admin add foo.news bafybeigdyrzt...
//!
//! # Remove a published article and rebuild the index
//! dbranch-admin remove foo.news --published
//!
//! # Compare ledger sync checkpoints with the chain tip
//! dbranch-admin --address addr1q... block-status
//!
//! # Trust another peer for gossip announcements
//! dbranch-admin allow-peer 12D3KooW...
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbranch_core::{ArticleIndex, ArticleList, ArticleRecord, ContentId, IncomingAnnouncement, PeerId};
use dbranch_curator::config::{LedgerArgs, StoreArgs};
use dbranch_curator::{
    CuratorWriter, LedgerSyncConfig, LedgerSyncCursor, PeerAllowList, Provenance, PubSub,
};
use tracing_subscriber::EnvFilter;

/// dBranch curator administration utility.
#[derive(Parser, Debug)]
#[command(name = "dbranch-admin")]
#[command(about = "Maintenance commands for a dBranch curator node")]
#[command(version)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    ledger: LedgerArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add or replace an article under the given name
    Add {
        name: String,
        cid: String,
        /// Target the published list instead of the curated list
        #[arg(long)]
        published: bool,
    },

    /// Remove an article and its record
    Remove {
        name: String,
        #[arg(long)]
        published: bool,
    },

    /// Rebuild the index document from the stored records
    RebuildIndex,

    /// Print the persisted index
    ShowIndex {
        /// Print the raw JSON document
        #[arg(long)]
        json: bool,
    },

    /// Publish the article carried by one ledger transaction
    AddTx { tx_hash: String },

    /// Show each address checkpoint against the ledger tip
    BlockStatus,

    /// Add peers to the allow-list file
    AllowPeer {
        #[arg(required = true)]
        peers: Vec<String>,
        #[arg(long, env = "DBRANCH_PEER_ALLOW_LIST", default_value = "./peer-allow-list.json")]
        peer_allow_list: PathBuf,
    },

    /// Broadcast an article announcement on the gossip channel
    Announce {
        name: String,
        cid: String,
        #[arg(long, env = "DBRANCH_WIRE_CHANNEL", default_value = "dbranch-wire")]
        wire_channel: String,
    },
}

fn list_for(published: bool) -> ArticleList {
    if published {
        ArticleList::Published
    } else {
        ArticleList::Curated
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Commands that don't touch the store
    match &args.command {
        Command::AllowPeer {
            peers,
            peer_allow_list,
        } => return allow_peers(peer_allow_list, peers),
        Command::Announce {
            name,
            cid,
            wire_channel,
        } => return announce(&args.store, name, cid, wire_channel).await,
        _ => {}
    }

    let kubo = args.store.kubo().context("Invalid IPFS host")?;
    let store = args.store.content_store(&kubo);
    if !store.is_up().await {
        anyhow::bail!("IPFS API at {} is not reachable", kubo.api_url());
    }

    let (writer, writer_task) = CuratorWriter::spawn(store.clone());

    match args.command {
        Command::Add {
            name,
            cid,
            published,
        } => {
            let list = list_for(published);
            store.ensure_dirs().await.context("Failed to create article directories")?;
            let update = writer
                .apply(list, &name, &ContentId::new(cid), Provenance::gossip())
                .await
                .with_context(|| format!("Failed to add {}", name))?;
            println!("{} {} in {}: {}", update.outcome.as_str(), name, list, update.record.cid);
            if update.index_stale {
                writer.rebuild().await.context("Failed to rebuild index")?;
                println!("Index rebuilt");
            }
        }
        Command::Remove { name, published } => {
            let list = list_for(published);
            let removed = writer
                .remove(list, &name)
                .await
                .with_context(|| format!("Failed to remove {}", name))?;
            if removed {
                writer.rebuild().await.context("Failed to rebuild index")?;
                println!("Removed {} from {}; index rebuilt", name, list);
            } else {
                println!("{} is not in {}", name, list);
            }
        }
        Command::RebuildIndex => {
            let index = writer.rebuild().await.context("Failed to rebuild index")?;
            println!(
                "Index rebuilt: {} curated, {} published",
                index.curated.len(),
                index.published.len()
            );
        }
        Command::ShowIndex { json } => {
            let index = store.read_index().await.context("Failed to read index")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&index)?);
            } else {
                print_index(&index);
            }
        }
        Command::AddTx { tx_hash } => {
            let cursor = ledger_cursor(&args.ledger, writer.clone())?;
            store.ensure_dirs().await.context("Failed to create article directories")?;
            let update = cursor
                .apply_tx(&tx_hash)
                .await
                .with_context(|| format!("Failed to add tx {}", tx_hash))?;
            println!(
                "{} {} in published: {}",
                update.outcome.as_str(),
                update.record.name,
                update.record.cid
            );
        }
        Command::BlockStatus => {
            let cursor = ledger_cursor(&args.ledger, writer.clone())?;
            let status = cursor
                .block_status()
                .await
                .context("Failed to query ledger")?;
            println!("Ledger tip: {}", status.tip);
            if status.addresses.is_empty() {
                println!("No addresses configured");
            }
            for address in &status.addresses {
                println!(
                    "  {}  block {}  ({} behind)",
                    address.address, address.last_block, address.blocks_behind
                );
            }
        }
        Command::AllowPeer { .. } | Command::Announce { .. } => {}
    }

    drop(writer);
    if let Err(e) = writer_task.await {
        tracing::warn!("Writer task panicked: {:?}", e);
    }
    Ok(())
}

fn ledger_cursor(
    ledger_args: &LedgerArgs,
    writer: dbranch_curator::WriterHandle,
) -> Result<LedgerSyncCursor> {
    let ledger = ledger_args.ledger().context("Invalid ledger settings")?;
    let config = LedgerSyncConfig {
        addresses: ledger_args
            .watched_addresses()
            .context("Failed to load ledger addresses")?,
        ..Default::default()
    };
    let checkpoints = ledger_args
        .checkpoints()
        .context("Failed to open checkpoint directory")?;
    Ok(LedgerSyncCursor::new(
        config,
        Arc::new(ledger),
        checkpoints,
        writer,
    ))
}

fn allow_peers(path: &Path, peers: &[String]) -> Result<()> {
    let mut list = if path.exists() {
        PeerAllowList::load(path)
            .with_context(|| format!("Failed to read peer allow-list {}", path.display()))?
    } else {
        PeerAllowList::default()
    };

    let added = list.add_peers(peers.iter().map(|p| PeerId::new(p.trim())));
    list.save(path)
        .with_context(|| format!("Failed to write peer allow-list {}", path.display()))?;

    println!(
        "Added {} peer(s) to {} ({} total)",
        added,
        path.display(),
        list.allowed_peers.len()
    );
    Ok(())
}

async fn announce(store_args: &StoreArgs, name: &str, cid: &str, topic: &str) -> Result<()> {
    let announcement = IncomingAnnouncement {
        name: name.to_string(),
        cid: ContentId::new(cid),
    };
    // Reject what receiving curators would reject
    let payload = announcement.encode()?;
    IncomingAnnouncement::decode(&payload).context("Invalid announcement")?;

    let kubo = store_args.kubo().context("Invalid IPFS host")?;
    kubo.publish(topic, &payload)
        .await
        .with_context(|| format!("Failed to publish on {}", topic))?;
    println!("Announced {} ({}) on {}", name, cid, topic);
    Ok(())
}

fn print_index(index: &ArticleIndex) {
    for list in ArticleList::ALL {
        let records: &[ArticleRecord] = index.list(list);
        println!("{} ({})", list, records.len());
        for record in records {
            let tx = record.ledger_tx_hash.as_deref().unwrap_or("-");
            println!(
                "  {:<32} {}  {}  tx {}",
                record.name,
                record.cid,
                record.date_added.format("%Y-%m-%d %H:%M:%S"),
                tx
            );
        }
    }
}
