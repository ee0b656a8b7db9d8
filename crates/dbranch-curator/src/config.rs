//! Command-line and environment settings shared by the curator binaries.
//!
//! Every flag can also be set through the environment variable named next to
//! it, so deployments configured for the older curator keep working.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use dbranch_core::{DEFAULT_CURATED_DIR, DEFAULT_INDEX_PATH, DEFAULT_PUBLISHED_DIR};

use crate::store::{ContentStore, KuboClient, StoreLayout};
use crate::sync::{CheckpointStore, PostgresLedger};
use crate::{Error, Result};

/// Where the content store lives.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Kubo RPC API, as `host:port` or a full URL
    #[arg(long, env = "IPFS_HOST", default_value = "localhost:5001")]
    pub ipfs_host: String,

    /// Store directory holding curated articles
    #[arg(long, env = "DBRANCH_CURATED_DIRECTORY", default_value = DEFAULT_CURATED_DIR)]
    pub curated_dir: String,

    /// Store directory holding ledger-published articles
    #[arg(long, env = "DBRANCH_PUBLISHED_DIRECTORY", default_value = DEFAULT_PUBLISHED_DIR)]
    pub published_dir: String,

    /// Store path of the index document
    #[arg(long, env = "DBRANCH_INDEX_PATH", default_value = DEFAULT_INDEX_PATH)]
    pub index_path: String,
}

impl StoreArgs {
    pub fn layout(&self) -> StoreLayout {
        StoreLayout {
            curated_dir: self.curated_dir.trim_end_matches('/').to_string(),
            published_dir: self.published_dir.trim_end_matches('/').to_string(),
            index_path: self.index_path.clone(),
        }
    }

    pub fn kubo(&self) -> Result<KuboClient> {
        KuboClient::from_host(&self.ipfs_host)
    }

    /// A content store over the configured Kubo node.
    pub fn content_store(&self, kubo: &KuboClient) -> ContentStore {
        ContentStore::new(std::sync::Arc::new(kubo.clone()), self.layout())
    }
}

/// How to reach the ledger and which addresses to follow.
#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// Full ledger database connection string (overrides the --postgres-* flags)
    #[arg(long, env = "DBRANCH_LEDGER_URL")]
    pub ledger_url: Option<String>,

    #[arg(long, env = "POSTGRES_DB_HOST", default_value = "localhost")]
    pub postgres_host: String,

    #[arg(long, env = "POSTGRES_DB_PORT", default_value = "5432")]
    pub postgres_port: u16,

    #[arg(long, env = "POSTGRES_DB_NAME", default_value = "cexplorer")]
    pub postgres_db: String,

    #[arg(long, env = "POSTGRES_USER", default_value = "postgres")]
    pub postgres_user: String,

    /// File holding the database password
    #[arg(long, env = "POSTGRES_PASSWORD_FILE")]
    pub postgres_password_file: Option<PathBuf>,

    /// Ledger address to follow (repeatable, or comma-separated)
    #[arg(long = "address", env = "CARDANO_ADDRESSES", value_delimiter = ',')]
    pub addresses: Vec<String>,

    /// File listing ledger addresses, one per line
    #[arg(long, env = "CARDANO_ADDRESS_FILE")]
    pub address_file: Option<PathBuf>,

    /// Directory for sync checkpoints (default: ~/.dbranch)
    #[arg(long, env = "DBRANCH_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl LedgerArgs {
    pub fn ledger(&self) -> Result<PostgresLedger> {
        if let Some(url) = &self.ledger_url {
            return PostgresLedger::from_conn_str(url);
        }

        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.postgres_host)
            .port(self.postgres_port)
            .dbname(&self.postgres_db)
            .user(&self.postgres_user);
        if let Some(path) = &self.postgres_password_file {
            let password = fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("cannot read password file {}: {}", path.display(), e))
            })?;
            config.password(password.trim());
        }
        Ok(PostgresLedger::new(config))
    }

    /// Addresses from the flags followed by those in the address file, without
    /// duplicates.
    pub fn watched_addresses(&self) -> Result<Vec<String>> {
        let mut addresses: Vec<String> = Vec::new();
        let from_file = match &self.address_file {
            Some(path) => read_address_file(path)?,
            None => Vec::new(),
        };
        for address in self.addresses.iter().map(|a| a.trim().to_string()).chain(from_file) {
            if !address.is_empty() && !addresses.contains(&address) {
                addresses.push(address);
            }
        }
        Ok(addresses)
    }

    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".dbranch"))
            .ok_or_else(|| Error::Config("HOME is not set; pass --state-dir".to_string()))
    }

    pub fn checkpoints(&self) -> Result<CheckpointStore> {
        CheckpointStore::open(self.state_dir()?)
    }
}

/// Read an address file: one address per line, blank lines and `#` comments
/// ignored.
pub fn read_address_file(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read address file {}: {}", path.display(), e))
    })?;
    Ok(parse_address_list(&contents))
}

pub fn parse_address_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
