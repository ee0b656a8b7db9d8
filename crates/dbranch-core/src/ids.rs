//! Identifier newtypes.
//!
//! Peer identities and content addresses are both plain strings on the wire.
//! Keeping them as separate types means a [`PeerId`] can never be compared
//! against, or passed where the code expects, a [`ContentId`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport-level identity of a gossip sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Content address of immutable article bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of this object in the immutable namespace (`/ipfs/<cid>`).
    pub fn ipfs_path(&self) -> String {
        format!("/ipfs/{}", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let peer = PeerId::new("12D3KooWpeer");
        let cid = ContentId::new("QmHash");
        assert_eq!(serde_json::to_string(&peer).unwrap(), "\"12D3KooWpeer\"");
        assert_eq!(serde_json::to_string(&cid).unwrap(), "\"QmHash\"");

        let back: ContentId = serde_json::from_str("\"QmHash\"").unwrap();
        assert_eq!(back, cid);
    }

    #[test]
    fn test_ipfs_path() {
        assert_eq!(ContentId::from("Qm1").ipfs_path(), "/ipfs/Qm1");
    }

    #[test]
    fn test_peer_id_is_case_sensitive() {
        assert_ne!(PeerId::from("peerA"), PeerId::from("PEERA"));
    }
}
