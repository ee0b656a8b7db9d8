//! Per-address ledger sync checkpoints.
//!
//! Each watched address has one file, `last_block.<address>`, holding the last
//! fully processed block number as a decimal integer. Files are replaced via
//! write-to-temp and rename, and a checkpoint never moves backward.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Directory of sync checkpoints.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open the checkpoint directory, creating it if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Checkpoint(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, address: &str) -> PathBuf {
        let safe: String = address
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("last_block.{}", safe))
    }

    /// Last processed block for `address`, or 0 if nothing was processed yet.
    pub fn load(&self, address: &str) -> Result<u64> {
        let path = self.path_for(address);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(Error::Checkpoint(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        contents.trim().parse().map_err(|e| {
            Error::Checkpoint(format!(
                "{} does not hold a block number: {}",
                path.display(),
                e
            ))
        })
    }

    /// Record that `address` is processed through `block`.
    ///
    /// Lower values than the stored checkpoint are ignored. Returns the
    /// checkpoint now in effect.
    pub fn advance(&self, address: &str, block: u64) -> Result<u64> {
        let current = self.load(address)?;
        if block <= current {
            return Ok(current);
        }

        let path = self.path_for(address);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let write = || -> std::io::Result<()> {
            fs::write(&tmp, block.to_string())?;
            fs::rename(&tmp, &path)
        };
        write().map_err(|e| {
            Error::Checkpoint(format!("cannot write {}: {}", path.display(), e))
        })?;

        tracing::debug!("Saved block {} for {} to {}", block, address, path.display());
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_checkpoint_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        assert_eq!(store.load("addr_test1").unwrap(), 0);
    }

    #[test]
    fn test_checkpoint_only_increases() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();

        assert_eq!(store.advance("addr_test1", 100).unwrap(), 100);
        assert_eq!(store.advance("addr_test1", 105).unwrap(), 105);
        assert_eq!(store.advance("addr_test1", 50).unwrap(), 105);
        assert_eq!(store.advance("addr_test1", 105).unwrap(), 105);
        assert_eq!(store.load("addr_test1").unwrap(), 105);
    }

    #[test]
    fn test_checkpoints_are_per_address() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();

        store.advance("addr_a", 10).unwrap();
        store.advance("addr_b", 20).unwrap();
        assert_eq!(store.load("addr_a").unwrap(), 10);
        assert_eq!(store.load("addr_b").unwrap(), 20);
    }

    #[test]
    fn test_checkpoint_survives_reopen() {
        let dir = TempDir::new().unwrap();
        CheckpointStore::open(dir.path())
            .unwrap()
            .advance("addr_a", 42)
            .unwrap();

        let reopened = CheckpointStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load("addr_a").unwrap(), 42);
        let raw = fs::read_to_string(reopened.path_for("addr_a")).unwrap();
        assert_eq!(raw, "42");
    }

    #[test]
    fn test_corrupt_checkpoint_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        fs::write(store.path_for("addr_a"), "not a number").unwrap();

        assert!(matches!(store.load("addr_a"), Err(Error::Checkpoint(_))));
        assert!(store.advance("addr_a", 1).is_err());
    }

    #[test]
    fn test_address_is_sanitized_in_file_name() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let path = store.path_for("../evil/addr");
        assert_eq!(path.parent().unwrap(), dir.path());
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        CheckpointStore::open(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
