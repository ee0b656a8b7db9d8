//! Gossip admission policy.
//!
//! Only peers on the allow-list may contribute articles over the gossip
//! channel. An empty allow-list admits everyone; running that way has to be
//! requested explicitly with `allow_empty_peer_list`, which is checked once at
//! startup by [`AdmissionPolicy::validate`].

use std::collections::BTreeSet;
use std::path::Path;

use dbranch_core::PeerId;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// On-disk allow-list document: `{"allowed_peers": ["<peer id>", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAllowList {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub allowed_peers: Vec<PeerId>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<PeerId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<PeerId>>::deserialize(deserializer)?.unwrap_or_default())
}

impl PeerAllowList {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write the document, creating parent directories as needed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Append peers that are not already listed. Returns how many were added.
    pub fn add_peers<I>(&mut self, peers: I) -> usize
    where
        I: IntoIterator<Item = PeerId>,
    {
        let mut added = 0;
        for peer in peers {
            if !self.allowed_peers.contains(&peer) {
                self.allowed_peers.push(peer);
                added += 1;
            }
        }
        added
    }
}

/// Decides whether a gossip sender may contribute an article.
#[derive(Debug, Clone, Default)]
pub struct AdmissionPolicy {
    allowed: BTreeSet<PeerId>,
}

impl AdmissionPolicy {
    pub fn new<I>(peers: I) -> Self
    where
        I: IntoIterator<Item = PeerId>,
    {
        Self {
            allowed: peers.into_iter().collect(),
        }
    }

    pub fn from_allow_list(list: PeerAllowList) -> Self {
        Self::new(list.allowed_peers)
    }

    /// Exact, case-sensitive membership check. An empty list admits all peers.
    pub fn is_allowed(&self, peer: &PeerId) -> bool {
        self.allowed.is_empty() || self.allowed.contains(peer)
    }

    /// Whether every peer is admitted.
    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Startup check: an empty list is only accepted with explicit opt-in.
    pub fn validate(&self, allow_empty_peer_list: bool) -> Result<()> {
        if self.is_open() && !allow_empty_peer_list {
            return Err(Error::Config(
                "empty peer allow-list is not allowed; add peers or pass --allow-empty-peer-list"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn peers(ids: &[&str]) -> Vec<PeerId> {
        ids.iter().map(|id| PeerId::from(*id)).collect()
    }

    #[test]
    fn test_empty_list_allows_any_peer() {
        let policy = AdmissionPolicy::default();
        assert!(policy.is_allowed(&PeerId::from("peerA")));
        assert!(policy.is_allowed(&PeerId::from("anyone")));
        assert!(policy.is_open());
    }

    #[test]
    fn test_non_empty_list_allows_only_members() {
        let policy = AdmissionPolicy::new(peers(&["peerA"]));
        assert!(policy.is_allowed(&PeerId::from("peerA")));
        assert!(!policy.is_allowed(&PeerId::from("peerB")));
        assert!(!policy.is_allowed(&PeerId::from("PEERA")));
        assert!(!policy.is_allowed(&PeerId::from("peerA ")));
    }

    #[test]
    fn test_validate_requires_opt_in_for_empty_list() {
        let open = AdmissionPolicy::default();
        assert!(matches!(open.validate(false), Err(Error::Config(_))));
        assert!(open.validate(true).is_ok());

        let closed = AdmissionPolicy::new(peers(&["peerA"]));
        assert!(closed.validate(false).is_ok());
    }

    #[test]
    fn test_load_allow_list_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("peers.json");
        std::fs::write(&path, r#"{"allowed_peers": ["peerA", "peerB", "peerA"]}"#).unwrap();

        let list = PeerAllowList::load(&path).unwrap();
        let policy = AdmissionPolicy::from_allow_list(list);
        assert_eq!(policy.len(), 2);
        assert!(policy.is_allowed(&PeerId::from("peerB")));
    }

    #[test]
    fn test_absent_or_null_list_is_empty() {
        let list: PeerAllowList = serde_json::from_str("{}").unwrap();
        assert!(list.allowed_peers.is_empty());
        let list: PeerAllowList = serde_json::from_str(r#"{"allowed_peers": null}"#).unwrap();
        assert!(list.allowed_peers.is_empty());
    }

    #[test]
    fn test_add_peers_and_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("peers.json");

        let mut list = PeerAllowList::default();
        assert_eq!(list.add_peers(peers(&["peerA", "peerB"])), 2);
        assert_eq!(list.add_peers(peers(&["peerB", "peerC"])), 1);
        list.save(&path).unwrap();

        let loaded = PeerAllowList::load(&path).unwrap();
        assert_eq!(loaded.allowed_peers, peers(&["peerA", "peerB", "peerC"]));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = PeerAllowList::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
