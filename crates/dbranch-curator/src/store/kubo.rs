//! Kubo (go-ipfs) HTTP RPC adapter.
//!
//! Every RPC call is a `POST /api/v0/<command>?arg=...`. Failures come back as
//! HTTP 500 with a JSON body `{"Message": "...", "Code": 0, "Type": "error"}`.
//!
//! The same client serves both the content store ([`StoreBackend`]) and the
//! gossip transport ([`PubSub`]).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dbranch_core::{ContentId, PeerId};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

use super::{EntryStat, StoreBackend};
use crate::source::{GossipMessage, PubSub, Subscription};
use crate::{Error, Result};

/// Connection settings for a Kubo node.
#[derive(Debug, Clone)]
pub struct KuboConfig {
    /// RPC API base URL.
    pub api_url: String,

    /// Timeout for path and metadata calls.
    pub request_timeout: Duration,

    /// Timeout for calls that may need to fetch content from the network
    /// (copy and pin). Exceeding it means the content is unavailable.
    pub content_timeout: Duration,
}

impl Default for KuboConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5001".to_string(),
            request_timeout: Duration::from_secs(10),
            content_timeout: Duration::from_secs(60),
        }
    }
}

/// HTTP client for a Kubo node's RPC API.
#[derive(Debug, Clone)]
pub struct KuboClient {
    http: Client,
    config: KuboConfig,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatResponse {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size", default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct LsResponse {
    #[serde(rename = "Entries", default)]
    entries: Option<Vec<LsEntry>>,
}

#[derive(Debug, Deserialize)]
struct LsEntry {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PubSubRecord {
    from: String,
    #[serde(default)]
    data: String,
}

impl KuboClient {
    pub fn new(config: KuboConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Accepts either a full URL or the `host:port` form used by older configs.
    pub fn from_host(host: &str) -> Result<Self> {
        let api_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        Self::new(KuboConfig {
            api_url,
            ..KuboConfig::default()
        })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    fn rpc(&self, command: &str) -> RequestBuilder {
        self.http
            .post(format!("{}/api/v0/{}", self.config.api_url, command))
    }

    /// Send a request and turn RPC-level failures into typed errors.
    async fn send(&self, request: RequestBuilder, target: &str) -> Result<Response> {
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<RpcError>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        Err(rpc_error(status.as_u16(), &message, target))
    }

    async fn send_content(&self, request: RequestBuilder, cid: &ContentId) -> Result<Response> {
        match self.send(request.timeout(self.config.content_timeout), cid.as_str()).await {
            Err(Error::StoreUnavailable(msg)) if msg.contains("timed out") => {
                Err(Error::ContentUnavailable(format!("{}: {}", cid, msg)))
            }
            Err(Error::NotFound(msg)) => Err(Error::ContentUnavailable(msg)),
            other => other,
        }
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::StoreUnavailable(format!("request timed out: {}", e))
    } else {
        Error::StoreUnavailable(e.to_string())
    }
}

/// A node that answers with a message has decided; only a bare 5xx or an
/// expired deadline is worth retrying.
fn rpc_error(status: u16, message: &str, target: &str) -> Error {
    if message.contains("does not exist") || message.contains("not found") {
        Error::NotFound(format!("{}: {}", target, message))
    } else if message.contains("context deadline exceeded") {
        Error::StoreUnavailable(format!("request timed out: {}: {}", target, message))
    } else if status >= 500 && message.is_empty() {
        Error::StoreUnavailable(format!("HTTP {} for {}", status, target))
    } else {
        Error::Store(format!("{}: {}", target, message))
    }
}

/// Kubo expects pubsub topics multibase-encoded (base64url, `u` prefix).
fn encode_topic(topic: &str) -> String {
    format!("u{}", URL_SAFE_NO_PAD.encode(topic.as_bytes()))
}

fn decode_multibase(data: &str) -> Result<Vec<u8>> {
    let payload = data
        .strip_prefix('u')
        .ok_or_else(|| Error::Subscription(format!("unsupported multibase payload: {}", data)))?;
    URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| Error::Subscription(format!("invalid base64url payload: {}", e)))
}

#[async_trait]
impl StoreBackend for KuboClient {
    async fn stat(&self, path: &str) -> Result<EntryStat> {
        let request = self
            .rpc("files/stat")
            .query(&[("arg", path)])
            .timeout(self.config.request_timeout);
        let stat: StatResponse = self
            .send(request, path)
            .await?
            .json()
            .await
            .map_err(|e| Error::Store(format!("{}: bad stat response: {}", path, e)))?;
        Ok(EntryStat {
            hash: ContentId::new(stat.hash),
            size: stat.size,
        })
    }

    async fn copy(&self, source: &str, dest: &str) -> Result<()> {
        let cid = ContentId::new(source.trim_start_matches("/ipfs/"));
        let request = self
            .rpc("files/cp")
            .query(&[("arg", source), ("arg", dest), ("parents", "true")]);
        self.send_content(request, &cid).await?;
        Ok(())
    }

    async fn pin(&self, cid: &ContentId) -> Result<()> {
        let request = self.rpc("pin/add").query(&[("arg", cid.as_str())]);
        self.send_content(request, cid).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let request = self
            .rpc("files/rm")
            .query(&[("arg", path), ("recursive", "true"), ("force", "true")])
            .timeout(self.config.request_timeout);
        self.send(request, path).await?;
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let request = self
            .rpc("files/ls")
            .query(&[("arg", dir)])
            .timeout(self.config.request_timeout);
        let ls: LsResponse = self
            .send(request, dir)
            .await?
            .json()
            .await
            .map_err(|e| Error::Store(format!("{}: bad ls response: {}", dir, e)))?;
        Ok(ls
            .entries
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.name)
            .collect())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let request = self
            .rpc("files/read")
            .query(&[("arg", path)])
            .timeout(self.config.content_timeout);
        let bytes = self
            .send(request, path)
            .await?
            .bytes()
            .await
            .map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(data.to_vec()).file_name("data");
        let form = reqwest::multipart::Form::new().part("file", part);
        let request = self
            .rpc("files/write")
            .query(&[
                ("arg", path),
                ("create", "true"),
                ("truncate", "true"),
                ("parents", "true"),
            ])
            .multipart(form)
            .timeout(self.config.request_timeout);
        self.send(request, path).await?;
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let request = self
            .rpc("files/mkdir")
            .query(&[("arg", path), ("parents", "true")])
            .timeout(self.config.request_timeout);
        self.send(request, path).await?;
        Ok(())
    }

    async fn is_up(&self) -> bool {
        let request = self.rpc("id").timeout(self.config.request_timeout);
        self.send(request, "id").await.is_ok()
    }
}

/// Live `pubsub/sub` stream. Kubo emits one JSON record per line.
struct KuboSubscription {
    stream: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
}

impl KuboSubscription {
    fn parse_line(line: &[u8]) -> Result<GossipMessage> {
        let record: PubSubRecord = serde_json::from_slice(line)
            .map_err(|e| Error::Subscription(format!("bad pubsub record: {}", e)))?;
        Ok(GossipMessage {
            from: PeerId::new(record.from),
            data: decode_multibase(&record.data)?,
        })
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        Some(line)
    }
}

#[async_trait]
impl Subscription for KuboSubscription {
    async fn next(&mut self) -> Result<Option<GossipMessage>> {
        loop {
            while let Some(line) = self.take_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match Self::parse_line(&line) {
                    Ok(message) => return Ok(Some(message)),
                    Err(e) => tracing::debug!("Skipping pubsub record: {}", e),
                }
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(Error::Subscription(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl PubSub for KuboClient {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let encoded = encode_topic(topic);
        let request = self.rpc("pubsub/sub").query(&[("arg", encoded.as_str())]);
        let response = self.send(request, topic).await.map_err(|e| match e {
            Error::StoreUnavailable(msg) | Error::Store(msg) | Error::NotFound(msg) => {
                Error::Subscription(msg)
            }
            other => other,
        })?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(Box::new(KuboSubscription {
            stream,
            buffer: Vec::new(),
        }))
    }

    async fn publish(&self, topic: &str, data: &[u8]) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(data.to_vec()).file_name("data");
        let form = reqwest::multipart::Form::new().part("file", part);
        let encoded = encode_topic(topic);
        let request = self
            .rpc("pubsub/pub")
            .query(&[("arg", encoded.as_str())])
            .multipart(form)
            .timeout(self.config.request_timeout);
        self.send(request, topic).await?;
        Ok(())
    }
}
