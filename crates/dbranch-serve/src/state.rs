//! Application state and configuration.

use std::sync::Arc;

use clap::Parser;
use dbranch_core::{DEFAULT_CURATED_DIR, DEFAULT_INDEX_PATH, DEFAULT_PUBLISHED_DIR};
use dbranch_curator::config::LedgerArgs;
use dbranch_curator::{
    CheckpointStore, ContentStore, KuboClient, LedgerSource, StoreBackend, StoreLayout,
};

use crate::cache::{ResponseCache, new_cache};

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:1323").
    pub bind_addr: String,

    /// Kubo RPC API, as `host:port` or a full URL.
    pub ipfs_host: String,

    /// Store paths shared with the curator.
    pub layout: StoreLayout,

    /// Ledger database and watched addresses for the `/db` endpoints.
    pub ledger: Option<LedgerArgs>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:1323".to_string(),
            ipfs_host: "localhost:5001".to_string(),
            layout: StoreLayout::default(),
            ledger: None,
        }
    }
}

/// Ledger settings read from the curator's environment variables.
#[derive(Parser)]
struct LedgerEnv {
    #[command(flatten)]
    ledger: LedgerArgs,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `DBRANCH_BIND_ADDR`: Server bind address (default: "0.0.0.0:1323")
    /// - `DBRANCH_SERVER_PORT`: Port only, used when no bind address is given
    /// - `IPFS_HOST`: Kubo RPC API (default: "localhost:5001")
    /// - `DBRANCH_CURATED_DIRECTORY`, `DBRANCH_PUBLISHED_DIRECTORY`,
    ///   `DBRANCH_INDEX_PATH`: store paths, matching the curator's
    /// - `DBRANCH_LEDGER_URL` or `POSTGRES_DB_HOST`: enables the ledger status
    ///   endpoints; the remaining `POSTGRES_*`, `CARDANO_ADDRESS*` and
    ///   `DBRANCH_STATE_DIR` variables are read as the curator reads them
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = match (
            std::env::var("DBRANCH_BIND_ADDR"),
            std::env::var("DBRANCH_SERVER_PORT"),
        ) {
            (Ok(addr), _) => addr,
            (Err(_), Ok(port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| anyhow::anyhow!("DBRANCH_SERVER_PORT is not a port: {}", port))?;
                format!("0.0.0.0:{}", port)
            }
            (Err(_), Err(_)) => "0.0.0.0:1323".to_string(),
        };

        let ipfs_host = std::env::var("IPFS_HOST").unwrap_or_else(|_| "localhost:5001".to_string());

        let dir = |var: &str, default: &str| {
            std::env::var(var)
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| default.to_string())
        };
        let layout = StoreLayout {
            curated_dir: dir("DBRANCH_CURATED_DIRECTORY", DEFAULT_CURATED_DIR),
            published_dir: dir("DBRANCH_PUBLISHED_DIRECTORY", DEFAULT_PUBLISHED_DIR),
            index_path: std::env::var("DBRANCH_INDEX_PATH")
                .unwrap_or_else(|_| DEFAULT_INDEX_PATH.to_string()),
        };

        let ledger = if std::env::var_os("DBRANCH_LEDGER_URL").is_some()
            || std::env::var_os("POSTGRES_DB_HOST").is_some()
        {
            Some(LedgerEnv::try_parse_from(["dbranch-serve"])?.ledger)
        } else {
            None
        };

        tracing::info!(
            bind_addr = %bind_addr,
            ipfs_host = %ipfs_host,
            index_path = %layout.index_path,
            ledger = ledger.is_some(),
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            ipfs_host,
            layout,
            ledger,
        })
    }
}

/// What the ledger status endpoints read: the ledger itself and the curator's
/// sync checkpoints.
#[derive(Clone)]
pub struct LedgerView {
    pub source: Arc<dyn LedgerSource>,
    pub checkpoints: CheckpointStore,
    pub addresses: Vec<String>,
}

impl LedgerView {
    pub fn from_args(args: &LedgerArgs) -> anyhow::Result<Self> {
        Ok(Self {
            source: Arc::new(args.ledger()?),
            checkpoints: args.checkpoints()?,
            addresses: args.watched_addresses()?,
        })
    }
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Read access to the content store.
    pub store: ContentStore,

    /// Ledger status, when a ledger database is configured.
    pub ledger: Option<LedgerView>,

    /// Server-side response cache.
    pub cache: ResponseCache,

    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Create application state backed by the configured Kubo node.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let kubo = KuboClient::from_host(&config.ipfs_host)?;
        let ledger = config.ledger.as_ref().map(LedgerView::from_args).transpose()?;
        let state = Self::with_backend(config, Arc::new(kubo));
        Ok(match ledger {
            Some(ledger) => state.with_ledger(ledger),
            None => state,
        })
    }

    /// Create application state over any store backend.
    pub fn with_backend(config: Config, backend: Arc<dyn StoreBackend>) -> Self {
        let store = ContentStore::new(backend, config.layout.clone());
        Self {
            store,
            ledger: None,
            cache: new_cache(),
            config: Arc::new(config),
        }
    }

    pub fn with_ledger(mut self, ledger: LedgerView) -> Self {
        self.ledger = Some(ledger);
        self
    }
}
