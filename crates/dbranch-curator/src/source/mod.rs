//! Gossip transport and the ingestion pipeline built on it.
//!
//! The transport is consumed through the [`PubSub`] trait: subscribe to a
//! topic, then pull [`GossipMessage`]s tagged with the sender's peer identity.
//! The production implementation is [`crate::store::KuboClient`]'s
//! `pubsub/sub` stream.

mod gossip;

pub use gossip::{GossipConfig, GossipPipeline, GossipStats, MessageOutcome};

use async_trait::async_trait;
use dbranch_core::PeerId;

use crate::Result;

/// One message received on a gossip topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipMessage {
    /// Identity of the sending peer, as reported by the transport.
    pub from: PeerId,
    pub data: Vec<u8>,
}

/// A live topic subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message. `Ok(None)` means the stream ended.
    async fn next(&mut self) -> Result<Option<GossipMessage>>;
}

/// Topic-based publish/subscribe transport.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>>;

    async fn publish(&self, topic: &str, data: &[u8]) -> Result<()>;
}
