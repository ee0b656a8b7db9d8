//! Error types for the curator.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while curating articles.
#[derive(Error, Debug)]
pub enum Error {
    /// The content store could not be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store rejected an operation. Repeating it gets the same answer.
    #[error("Store error: {0}")]
    Store(String),

    /// A content address could not be resolved to bytes by any peer.
    #[error("Content unavailable: {0}")]
    ContentUnavailable(String),

    /// A path does not exist in the mutable store.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Ledger database error.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Gossip subscription error.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Sync checkpoint could not be read or written.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The single-writer task is no longer running.
    #[error("Writer stopped")]
    WriterClosed,

    /// Article or record failed validation.
    #[error(transparent)]
    Model(#[from] dbranch_core::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Transient failures leave ledger cursors where they are so the record is
    /// retried on the next cycle. Everything else drops the item, including a
    /// store that answered with a rejection.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_)
                | Self::Ledger(_)
                | Self::Subscription(_)
                | Self::Io(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Ledger(e.to_string())
    }
}
