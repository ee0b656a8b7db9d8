//! dBranch curation daemon.
//!
//! Listens for article announcements on the gossip channel and polls the
//! ledger for published articles, mirroring both into the content store and
//! keeping the article index current.
//!
//! # Usage
//!
//! ```bash
//! # Run with default settings (local Kubo node, local cardano-db-sync)
//! dbranch-curator --address addr1q...
//!
//! # Only trusted peers may curate
//! dbranch-curator --peer-allow-list /etc/dbranch/peers.json
//!
//! # Gossip only, log to a file
//! dbranch-curator --no-ledger --log-path /var/log/dbranch-curator.log
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) and SIGTERM for graceful shutdown:
//! 1. Stops receiving gossip and polling the ledger
//! 2. Lets the writer finish queued store updates
//! 3. Exits cleanly

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dbranch_core::PeerId;
use dbranch_core::metrics::{init_metrics, set_gauge, start_metrics_server};
use dbranch_curator::config::{LedgerArgs, StoreArgs};
use dbranch_curator::retry::wait_until;
use dbranch_curator::{
    AdmissionPolicy, CuratorWriter, GossipConfig, GossipPipeline, LedgerSource, LedgerSyncConfig,
    LedgerSyncCursor, PeerAllowList, PubSub,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// How often to re-check a dependency that is not up yet.
const WAIT_INTERVAL: Duration = Duration::from_secs(5);

/// dBranch curation daemon.
#[derive(Parser, Debug)]
#[command(name = "dbranch-curator")]
#[command(about = "Curate dBranch articles from gossip and the ledger")]
#[command(version)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    ledger: LedgerArgs,

    /// Gossip topic carrying article announcements
    #[arg(long, env = "DBRANCH_WIRE_CHANNEL", default_value = "dbranch-wire")]
    wire_channel: String,

    /// Peer allow-list file
    #[arg(long, env = "DBRANCH_PEER_ALLOW_LIST", default_value = "./peer-allow-list.json")]
    peer_allow_list: PathBuf,

    /// Additional allowed peer (repeatable); not written to the allow-list file
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Accept announcements from any peer when the allow-list is empty
    #[arg(long, env = "DBRANCH_ALLOW_EMPTY_PEER_LIST")]
    allow_empty_peer_list: bool,

    /// Disable ledger synchronization
    #[arg(long)]
    no_ledger: bool,

    /// Seconds between ledger polls
    #[arg(long, default_value = "20")]
    sync_interval: u64,

    /// Log file, or `-` for stderr
    #[arg(long, env = "DBRANCH_LOG_PATH", default_value = "-")]
    log_path: String,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9091")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_path)?;

    tracing::info!("dBranch curator starting...");

    // Initialize metrics
    if args.metrics_port > 0 {
        match init_metrics() {
            Some(handle) => {
                start_metrics_server(args.metrics_port, handle)
                    .await
                    .context("Failed to start metrics server")?;
                set_gauge("curator_running", 1.0);
            }
            None => tracing::warn!("Metrics recorder already installed; not serving metrics"),
        }
    }

    // Set up graceful shutdown
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        cancel_clone.cancel();
    })
    .context("Failed to set Ctrl+C handler")?;

    let kubo = args.store.kubo().context("Invalid IPFS host")?;
    let store = args.store.content_store(&kubo);

    tracing::info!("Configuration:");
    tracing::info!("  IPFS API: {}", kubo.api_url());
    tracing::info!("  Curated: {}", store.layout().curated_dir);
    tracing::info!("  Published: {}", store.layout().published_dir);
    tracing::info!("  Index: {}", store.layout().index_path);
    tracing::info!("  Wire channel: {}", args.wire_channel);
    tracing::info!("  Peer allow-list: {}", args.peer_allow_list.display());

    // Admission is validated before touching any service
    let policy = load_policy(&args.peer_allow_list, &args.peers)?;
    policy
        .validate(args.allow_empty_peer_list)
        .context("Refusing to start")?;
    if policy.is_open() {
        tracing::warn!("Peer allow-list is empty; accepting announcements from every peer");
    } else {
        tracing::info!("  Allowed peers: {}", policy.len());
    }

    let cursor_parts = if args.no_ledger {
        tracing::info!("  Ledger sync: disabled");
        None
    } else {
        let addresses = args
            .ledger
            .watched_addresses()
            .context("Failed to load ledger addresses")?;
        if addresses.is_empty() {
            tracing::warn!("No ledger addresses configured; ledger sync disabled");
            None
        } else {
            let checkpoints = args
                .ledger
                .checkpoints()
                .context("Failed to open checkpoint directory")?;
            let ledger = args.ledger.ledger().context("Invalid ledger settings")?;
            tracing::info!("  Ledger addresses: {}", addresses.len());
            tracing::info!("  Checkpoints: {}", checkpoints.dir().display());
            Some((addresses, checkpoints, Arc::new(ledger)))
        }
    };

    if !wait_until(&cancel, WAIT_INTERVAL, "IPFS", || store.is_up()).await {
        tracing::info!("Cancelled while waiting for IPFS");
        return Ok(());
    }
    store
        .ensure_dirs()
        .await
        .context("Failed to create article directories")?;

    if let Some((_, _, ledger)) = &cursor_parts {
        let up = wait_until(&cancel, WAIT_INTERVAL, "ledger database", || async {
            ledger.ping().await.is_ok()
        })
        .await;
        if !up {
            tracing::info!("Cancelled while waiting for the ledger database");
            return Ok(());
        }
    }

    let (writer, writer_task) = CuratorWriter::spawn(store.clone());

    // Bring the index in line with whatever is already stored
    if let Err(e) = writer.rebuild().await {
        tracing::warn!("Initial index rebuild failed: {}", e);
    }

    let pubsub: Arc<dyn PubSub> = Arc::new(kubo.clone());
    let gossip = GossipPipeline::new(
        GossipConfig {
            topic: args.wire_channel.clone(),
            ..Default::default()
        },
        pubsub,
        policy,
        writer.clone(),
    );
    let gossip_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { gossip.run(cancel).await })
    };

    let ledger_task = cursor_parts.map(|(addresses, checkpoints, ledger)| {
        let cursor = LedgerSyncCursor::new(
            LedgerSyncConfig {
                addresses,
                poll_interval: Duration::from_secs(args.sync_interval.max(1)),
            },
            ledger,
            checkpoints,
            writer.clone(),
        );
        let cancel = cancel.clone();
        tokio::spawn(async move { cursor.run(cancel).await })
    });

    // Only the loops hold the writer from here on
    drop(writer);

    let gossip_stats = gossip_task.await.context("Gossip task panicked")?;
    let ledger_stats = match ledger_task {
        Some(task) => Some(task.await.context("Ledger task panicked")?),
        None => None,
    };

    // Shutdown sequence
    tracing::info!("Shutting down...");
    if let Err(e) = writer_task.await {
        tracing::warn!("Writer task panicked: {:?}", e);
    }

    set_gauge("curator_running", 0.0);

    // Print summary
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Gossip received:      {}", gossip_stats.received);
    tracing::info!("Gossip applied:       {}", gossip_stats.applied);
    tracing::info!("Gossip denied:        {}", gossip_stats.denied);
    tracing::info!("Gossip malformed:     {}", gossip_stats.malformed);
    tracing::info!("Gossip reconnects:    {}", gossip_stats.reconnects);
    if let Some(stats) = ledger_stats {
        tracing::info!("Ledger records:       {}", stats.records_seen);
        tracing::info!("Ledger applied:       {}", stats.applied);
        tracing::info!("Ledger invalid:       {}", stats.invalid);
        tracing::info!("Ledger dropped:       {}", stats.dropped);
    }

    Ok(())
}

/// Log to stderr, or append plain text to `log_path`.
fn init_tracing(log_path: &str) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("info".parse()?)
        .add_directive("dbranch_curator=debug".parse()?);

    if log_path == "-" {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("Failed to open log file {}", log_path))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }
    Ok(())
}

/// Allow-list file plus any peers given on the command line. A missing file
/// counts as an empty list.
fn load_policy(path: &Path, extra: &[String]) -> Result<AdmissionPolicy> {
    let mut list = if path.exists() {
        PeerAllowList::load(path)
            .with_context(|| format!("Failed to read peer allow-list {}", path.display()))?
    } else {
        tracing::warn!("Peer allow-list {} not found", path.display());
        PeerAllowList::default()
    };
    list.add_peers(extra.iter().map(|p| PeerId::new(p.trim())));
    Ok(AdmissionPolicy::from_allow_list(list))
}
