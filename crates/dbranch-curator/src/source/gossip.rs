//! Gossip ingestion pipeline.
//!
//! Each message moves through
//! `Received -> Decoded | Malformed -> Admitted | Denied -> Applied | Failed`.
//! Nothing a single message does can stop the pipeline: malformed payloads,
//! denied senders and failed store updates are logged and skipped. Losing the
//! subscription itself leads to a resubscribe with exponential backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dbranch_core::{ArticleList, IncomingAnnouncement};
use tokio_util::sync::CancellationToken;

use super::{GossipMessage, PubSub, Subscription};
use crate::admission::AdmissionPolicy;
use crate::retry::{Backoff, sleep_or_cancel};
use crate::store::{AddOutcome, Provenance};
use crate::writer::WriterHandle;

/// Configuration for the gossip pipeline.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Pub/sub topic carrying article announcements.
    pub topic: String,

    /// First delay before resubscribing after the subscription fails.
    ///
    /// The delay doubles on every attempt and drops back to this value only
    /// once a subscription has delivered a message; a node that accepts the
    /// subscription and closes it straight away still backs off.
    pub initial_backoff: Duration,

    /// Upper bound for the resubscribe delay.
    pub max_backoff: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            topic: "dbranch-wire".to_string(),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// What happened to a single gossip message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Not an article announcement.
    Malformed,
    /// Sender is not on the allow-list.
    Denied,
    Applied(AddOutcome),
    /// The store update failed.
    Failed,
}

/// Counters for a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GossipStats {
    pub received: usize,
    pub malformed: usize,
    pub denied: usize,
    pub applied: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub reconnects: usize,
}

#[derive(Default)]
struct Counters {
    received: AtomicUsize,
    malformed: AtomicUsize,
    denied: AtomicUsize,
    applied: AtomicUsize,
    unchanged: AtomicUsize,
    failed: AtomicUsize,
    reconnects: AtomicUsize,
}

impl Counters {
    fn build_stats(&self) -> GossipStats {
        GossipStats {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Consumes the gossip topic and applies admitted announcements to the
/// curated list.
pub struct GossipPipeline {
    config: GossipConfig,
    pubsub: Arc<dyn PubSub>,
    policy: AdmissionPolicy,
    writer: WriterHandle,
    counters: Counters,
}

impl GossipPipeline {
    pub fn new(
        config: GossipConfig,
        pubsub: Arc<dyn PubSub>,
        policy: AdmissionPolicy,
        writer: WriterHandle,
    ) -> Self {
        Self {
            config,
            pubsub,
            policy,
            writer,
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> GossipStats {
        self.counters.build_stats()
    }

    /// Process one message to completion.
    pub async fn handle_message(&self, message: GossipMessage) -> MessageOutcome {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("gossip_messages_total").increment(1);

        let announcement = match IncomingAnnouncement::decode(&message.data) {
            Ok(announcement) => announcement,
            Err(e) => {
                // The topic also carries non-article traffic
                tracing::debug!("Ignoring message from {}: {}", message.from, e);
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("gossip_messages_malformed_total").increment(1);
                return MessageOutcome::Malformed;
            }
        };

        if !self.policy.is_allowed(&message.from) {
            tracing::info!(
                peer = %message.from,
                name = %announcement.name,
                cid = %announcement.cid,
                "denied announcement from peer not on the allow-list"
            );
            self.counters.denied.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("gossip_messages_denied_total").increment(1);
            return MessageOutcome::Denied;
        }

        tracing::info!(
            peer = %message.from,
            name = %announcement.name,
            cid = %announcement.cid,
            "received article announcement"
        );

        let update = match self
            .writer
            .apply(
                ArticleList::Curated,
                &announcement.name,
                &announcement.cid,
                Provenance::gossip(),
            )
            .await
        {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(
                    "Failed to curate {} ({}): {}",
                    announcement.name,
                    announcement.cid,
                    e
                );
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("gossip_apply_errors_total").increment(1);
                return MessageOutcome::Failed;
            }
        };

        if update.outcome == AddOutcome::Unchanged {
            self.counters.unchanged.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.applied.fetch_add(1, Ordering::Relaxed);
        }
        metrics::counter!("gossip_articles_applied_total", "outcome" => update.outcome.as_str())
            .increment(1);

        if update.index_stale
            && let Err(e) = self.writer.rebuild().await
        {
            // The next successful rebuild picks this article up
            tracing::warn!("Index rebuild after {} failed: {}", announcement.name, e);
        }

        MessageOutcome::Applied(update.outcome)
    }

    /// Run until cancelled, resubscribing whenever the subscription is lost.
    pub async fn run(&self, cancel: CancellationToken) -> GossipStats {
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);

        tracing::info!(
            "Starting gossip pipeline on topic {} ({} allowed peers{})",
            self.config.topic,
            self.policy.len(),
            if self.policy.is_open() { ", open admission" } else { "" }
        );

        while !cancel.is_cancelled() {
            let subscribed = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.pubsub.subscribe(&self.config.topic) => result,
            };

            match subscribed {
                Ok(subscription) => {
                    tracing::info!("Subscribed to gossip topic {}", self.config.topic);
                    metrics::gauge!("gossip_subscribed").set(1.0);
                    let delivered = self.consume(subscription, &cancel).await;
                    metrics::gauge!("gossip_subscribed").set(0.0);
                    if delivered {
                        backoff.reset();
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to subscribe to {}: {}", self.config.topic, e);
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            let delay = backoff.next_delay();
            tracing::info!("Resubscribing to {} in {:?}", self.config.topic, delay);
            self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("gossip_reconnects_total").increment(1);
            if !sleep_or_cancel(&cancel, delay).await {
                break;
            }
        }

        let stats = self.stats();
        tracing::info!(
            "Gossip pipeline stopped: {} received, {} applied, {} unchanged, {} denied, {} malformed, {} failed",
            stats.received,
            stats.applied,
            stats.unchanged,
            stats.denied,
            stats.malformed,
            stats.failed
        );
        stats
    }

    /// Drain one subscription until it ends, errors, or the token is cancelled.
    ///
    /// Returns whether any message was received on it.
    async fn consume(
        &self,
        mut subscription: Box<dyn Subscription>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut received_any = false;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = subscription.next() => next,
            };
            match next {
                Ok(Some(message)) => {
                    received_any = true;
                    self.handle_message(message).await;
                }
                Ok(None) => {
                    tracing::warn!("Gossip subscription to {} ended", self.config.topic);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Gossip subscription to {} failed: {}", self.config.topic, e);
                    break;
                }
            }
        }
        received_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionPolicy;
    use crate::store::{ContentStore, MemoryBackend, StoreLayout};
    use crate::writer::CuratorWriter;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use dbranch_core::PeerId;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    /// Hands out queued subscriptions; an exhausted queue fails to subscribe.
    #[derive(Default)]
    struct ChannelPubSub {
        queued: Mutex<VecDeque<mpsc::UnboundedReceiver<GossipMessage>>>,
        attempts: Mutex<Vec<tokio::time::Instant>>,
    }

    impl ChannelPubSub {
        fn add_subscription(&self) -> mpsc::UnboundedSender<GossipMessage> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.queued.lock().push_back(rx);
            tx
        }
    }

    struct ChannelSubscription(mpsc::UnboundedReceiver<GossipMessage>);

    #[async_trait]
    impl Subscription for ChannelSubscription {
        async fn next(&mut self) -> Result<Option<GossipMessage>> {
            Ok(self.0.recv().await)
        }
    }

    #[async_trait]
    impl PubSub for ChannelPubSub {
        async fn subscribe(&self, _topic: &str) -> Result<Box<dyn Subscription>> {
            self.attempts.lock().push(tokio::time::Instant::now());
            let rx = self.queued.lock().pop_front();
            match rx {
                Some(rx) => Ok(Box::new(ChannelSubscription(rx))),
                None => Err(Error::Subscription("no subscription available".into())),
            }
        }

        async fn publish(&self, _topic: &str, _data: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        backend: Arc<MemoryBackend>,
        store: ContentStore,
        pubsub: Arc<ChannelPubSub>,
        pipeline: Arc<GossipPipeline>,
    }

    fn harness(allowed: &[&str]) -> Harness {
        let backend = Arc::new(MemoryBackend::new());
        let store = ContentStore::new(backend.clone(), StoreLayout::default());
        let (writer, _task) = CuratorWriter::spawn(store.clone());
        let pubsub = Arc::new(ChannelPubSub::default());
        let config = GossipConfig {
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            ..GossipConfig::default()
        };
        let policy = AdmissionPolicy::new(allowed.iter().map(|p| PeerId::from(*p)));
        let pipeline = Arc::new(GossipPipeline::new(config, pubsub.clone(), policy, writer));
        Harness {
            backend,
            store,
            pubsub,
            pipeline,
        }
    }

    fn announcement(from: &str, name: &str, cid: &str) -> GossipMessage {
        GossipMessage {
            from: PeerId::from(from),
            data: format!(r#"{{"name":"{}","cid":"{}"}}"#, name, cid).into_bytes(),
        }
    }

    async fn wait_for(pipeline: &GossipPipeline, check: impl Fn(&GossipStats) -> bool) {
        for _ in 0..200 {
            if check(&pipeline.stats()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {:?}", pipeline.stats());
    }

    #[tokio::test]
    async fn test_denied_peer_leaves_store_and_index_unchanged() {
        let h = harness(&["peerA"]);
        let cid = h.backend.put_object("{}");

        let outcome = h
            .pipeline
            .handle_message(announcement("peerB", "foo.news", cid.as_str()))
            .await;

        assert_eq!(outcome, MessageOutcome::Denied);
        assert_eq!(h.backend.mutation_count(), 0);
        assert!(h.store.read_index().await.unwrap().is_empty());
        assert_eq!(h.pipeline.stats().denied, 1);
    }

    #[tokio::test]
    async fn test_allowed_peer_is_curated_and_indexed() {
        let h = harness(&["peerA"]);
        let cid = h.backend.put_object("{}");

        let outcome = h
            .pipeline
            .handle_message(announcement("peerA", "foo.news", cid.as_str()))
            .await;

        assert_eq!(outcome, MessageOutcome::Applied(AddOutcome::Added));
        let index = h.store.read_index().await.unwrap();
        assert_eq!(index.curated.len(), 1);
        assert_eq!(index.curated[0].name, "foo.news");
        assert_eq!(index.curated[0].cid, cid);
        assert!(index.published.is_empty());
    }

    #[tokio::test]
    async fn test_redelivery_is_unchanged() {
        let h = harness(&[]);
        let cid = h.backend.put_object("{}");
        let message = announcement("anyone", "foo.news", cid.as_str());

        h.pipeline.handle_message(message.clone()).await;
        let index = h.store.read_index().await.unwrap();
        let outcome = h.pipeline.handle_message(message).await;

        assert_eq!(outcome, MessageOutcome::Applied(AddOutcome::Unchanged));
        assert_eq!(h.store.read_index().await.unwrap(), index);
        let stats = h.pipeline.stats();
        assert_eq!((stats.applied, stats.unchanged), (1, 1));
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_skipped() {
        let h = harness(&[]);
        let payloads: [&[u8]; 3] = [
            b"ping",
            br#"{"hello":"world"}"#,
            br#"{"name":"x.txt","cid":"Qm1"}"#,
        ];
        for data in payloads {
            let outcome = h
                .pipeline
                .handle_message(GossipMessage {
                    from: PeerId::from("peerA"),
                    data: data.to_vec(),
                })
                .await;
            assert_eq!(outcome, MessageOutcome::Malformed);
        }
        assert_eq!(h.pipeline.stats().malformed, 3);
    }

    #[tokio::test]
    async fn test_failed_apply_does_not_stop_processing() {
        let h = harness(&[]);
        let good = h.backend.put_object("{}");

        let failed = h
            .pipeline
            .handle_message(announcement("peerA", "missing.news", "QmNowhere"))
            .await;
        let applied = h
            .pipeline
            .handle_message(announcement("peerA", "good.news", good.as_str()))
            .await;

        assert_eq!(failed, MessageOutcome::Failed);
        assert_eq!(applied, MessageOutcome::Applied(AddOutcome::Added));
    }

    #[tokio::test]
    async fn test_run_resubscribes_after_failure_and_stream_end() {
        let h = harness(&[]);
        let cid1 = h.backend.put_object("one");
        let cid2 = h.backend.put_object("two");

        // First subscription delivers one message then ends
        let first = h.pubsub.add_subscription();
        first.send(announcement("peerA", "one.news", cid1.as_str())).unwrap();
        drop(first);

        let cancel = CancellationToken::new();
        let task = {
            let pipeline = h.pipeline.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.run(cancel).await })
        };

        // The next subscribe attempt fails until a new subscription is queued
        wait_for(&h.pipeline, |s| s.applied == 1 && s.reconnects >= 2).await;
        let second = h.pubsub.add_subscription();
        second.send(announcement("peerA", "two.news", cid2.as_str())).unwrap();
        wait_for(&h.pipeline, |s| s.applied == 2).await;

        cancel.cancel();
        let stats = task.await.unwrap();
        assert_eq!(stats.applied, 2);

        let index = h.store.read_index().await.unwrap();
        let names: Vec<_> = index.curated.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["one.news", "two.news"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_resets_only_after_a_delivery() {
        let h = harness(&[]);
        let cid = h.backend.put_object("{}");

        // Three subscriptions close without delivering anything
        for _ in 0..3 {
            drop(h.pubsub.add_subscription());
        }
        let delivering = h.pubsub.add_subscription();
        delivering.send(announcement("peerA", "foo.news", cid.as_str())).unwrap();
        drop(delivering);
        drop(h.pubsub.add_subscription());

        let cancel = CancellationToken::new();
        let task = {
            let pipeline = h.pipeline.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.run(cancel).await })
        };
        wait_for(&h.pipeline, |s| s.reconnects >= 7).await;
        cancel.cancel();
        task.await.unwrap();

        let attempts = h.pubsub.attempts.lock().clone();
        let gaps: Vec<u128> = attempts
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect();
        // 5ms doubling to the 20ms cap, then doubling again from 5ms after
        // the delivery
        let expected = [5, 10, 20, 5, 10, 20];
        for (gap, want) in gaps.iter().zip(expected) {
            assert!(
                (want..=want + 1).contains(gap),
                "gaps {:?}, expected {:?}",
                gaps,
                expected
            );
        }
        assert!(gaps.len() >= expected.len());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_while_waiting() {
        let h = harness(&[]);
        let _sender = h.pubsub.add_subscription();
        let cancel = CancellationToken::new();

        let task = {
            let pipeline = h.pipeline.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.run(cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats, GossipStats::default());
    }
}
