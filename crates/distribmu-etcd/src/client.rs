//! etcd v2 keys API client.

use std::time::Duration;

use distribmu_core::error::{LockError, LockResult};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::store::{KeyNode, WatchAction, WatchEvent, WatchStore};

/// Response header carrying the cluster-wide change index.
const ETCD_INDEX_HEADER: &str = "X-Etcd-Index";

/// Error body returned by the etcd v2 API.
#[derive(Error, Debug, Clone, Deserialize)]
#[error("etcd error {error_code}: {message} ({cause})")]
pub struct EtcdError {
    #[serde(rename = "errorCode")]
    pub error_code: u32,
    pub message: String,
    #[serde(default)]
    pub cause: String,
    #[serde(default)]
    pub index: u64,
}

impl EtcdError {
    pub const KEY_NOT_FOUND: u32 = 100;
    pub const NODE_EXIST: u32 = 105;
    pub const EVENT_INDEX_CLEARED: u32 = 401;
}

#[derive(Debug, Deserialize)]
struct KeysResponse {
    action: String,
    node: Option<NodeBody>,
}

#[derive(Debug, Deserialize)]
struct NodeBody {
    #[serde(default)]
    value: Option<String>,
    #[serde(rename = "modifiedIndex", default)]
    modified_index: u64,
}

/// Status, change index and raw body of one response.
struct Reply {
    status: StatusCode,
    index: Option<u64>,
    body: Vec<u8>,
}

impl Reply {
    fn is_success(&self) -> bool {
        self.status.is_success()
    }

    fn keys_response(&self) -> LockResult<KeysResponse> {
        serde_json::from_slice(&self.body).map_err(|e| LockError::Backend(Box::new(e)))
    }

    fn etcd_error(&self) -> LockResult<EtcdError> {
        serde_json::from_slice(&self.body).map_err(|_| {
            LockError::backend(format!(
                "etcd returned {}: {}",
                self.status,
                String::from_utf8_lossy(&self.body)
            ))
        })
    }
}

/// Builder for [`EtcdV2Client`].
pub struct EtcdV2ClientBuilder {
    endpoint: Option<String>,
    connect_timeout: Duration,
    http: Option<reqwest::Client>,
}

impl EtcdV2ClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            connect_timeout: Duration::from_secs(3),
            http: None,
        }
    }

    /// Sets the etcd endpoint, e.g. `http://127.0.0.1:2379`.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the TCP connect timeout.
    ///
    /// No overall request timeout is applied because watches are long polls;
    /// the mutex bounds them with its own wait budget.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Uses an existing HTTP client. `connect_timeout` is then ignored.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Builds the client. No request is made.
    pub fn build(self) -> LockResult<EtcdV2Client> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| LockError::InvalidConfig("etcd endpoint not specified".to_string()))?;
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            LockError::InvalidConfig(format!("invalid etcd endpoint '{}': {}", endpoint, e))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(LockError::InvalidConfig(format!(
                "invalid etcd endpoint '{}': not a base URL",
                endpoint
            )));
        }

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .connect_timeout(self.connect_timeout)
                .build()
                .map_err(|e| LockError::Connection(Box::new(e)))?,
        };

        Ok(EtcdV2Client { http, endpoint })
    }
}

impl Default for EtcdV2ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// [`WatchStore`] over the etcd v2 HTTP keys API.
#[derive(Debug, Clone)]
pub struct EtcdV2Client {
    http: reqwest::Client,
    endpoint: Url,
}

impl EtcdV2Client {
    /// Returns a new builder for configuring the client.
    pub fn builder() -> EtcdV2ClientBuilder {
        EtcdV2ClientBuilder::new()
    }

    /// Creates a client for the given endpoint with default settings.
    pub fn new(endpoint: impl Into<String>) -> LockResult<Self> {
        Self::builder().endpoint(endpoint).build()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Maps a lock key onto `/v2/keys/<key>`. A leading `/` is optional.
    fn key_url(&self, key: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v2", "keys"])
                .extend(key.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    async fn execute(&self, request: RequestBuilder) -> LockResult<Reply> {
        let response = request
            .send()
            .await
            .map_err(|e| LockError::Connection(Box::new(e)))?;
        let status = response.status();
        let index = response
            .headers()
            .get(ETCD_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response
            .bytes()
            .await
            .map_err(|e| LockError::Connection(Box::new(e)))?
            .to_vec();

        Ok(Reply {
            status,
            index,
            body,
        })
    }
}

/// etcd v2 TTLs are whole seconds; round up so the lease is never shorter.
fn ttl_secs(ttl: Duration) -> u64 {
    (ttl.as_millis().div_ceil(1000) as u64).max(1)
}

fn parse_action(action: &str) -> WatchAction {
    match action {
        "delete" | "compareAndDelete" => WatchAction::Delete,
        "expire" => WatchAction::Expire,
        _ => WatchAction::Set,
    }
}

impl WatchStore for EtcdV2Client {
    #[instrument(skip(self, value), fields(backend = "etcd"))]
    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        let request = self
            .http
            .put(self.key_url(key))
            .query(&[("prevExist", "false")])
            .query(&[("ttl", ttl_secs(ttl))])
            .form(&[("value", value)]);

        let reply = self.execute(request).await?;
        if reply.is_success() {
            return Ok(true);
        }
        match reply.etcd_error()? {
            err if err.error_code == EtcdError::NODE_EXIST => Ok(false),
            err => Err(LockError::Backend(Box::new(err))),
        }
    }

    #[instrument(skip(self), fields(backend = "etcd"))]
    async fn get(&self, key: &str) -> LockResult<Option<KeyNode>> {
        let request = self.http.get(self.key_url(key)).query(&[("quorum", "true")]);

        let reply = self.execute(request).await?;
        if !reply.is_success() {
            return match reply.etcd_error()? {
                err if err.error_code == EtcdError::KEY_NOT_FOUND => Ok(None),
                err => Err(LockError::Backend(Box::new(err))),
            };
        }

        let node = reply
            .keys_response()?
            .node
            .ok_or_else(|| LockError::backend("etcd get response carried no node"))?;
        Ok(Some(KeyNode {
            value: node.value.unwrap_or_default(),
            index: reply.index.unwrap_or(node.modified_index),
        }))
    }

    #[instrument(skip(self), fields(backend = "etcd"))]
    async fn watch(&self, key: &str, after_index: u64) -> LockResult<WatchEvent> {
        loop {
            let request = self
                .http
                .get(self.key_url(key))
                .query(&[("wait", "true")])
                .query(&[("waitIndex", after_index + 1)]);

            let reply = self.execute(request).await?;
            if !reply.is_success() {
                let err = reply.etcd_error()?;
                if err.error_code != EtcdError::EVENT_INDEX_CLEARED {
                    return Err(LockError::Backend(Box::new(err)));
                }
                // History no longer reaches `after_index`; report current state instead.
                debug!(current_index = err.index, "watch index cleared, re-reading key");
                return Ok(match self.get(key).await? {
                    Some(node) => WatchEvent {
                        action: WatchAction::Set,
                        index: node.index,
                    },
                    None => WatchEvent {
                        action: WatchAction::Delete,
                        index: err.index,
                    },
                });
            }
            // The server closes an idle long poll with an empty body.
            if reply.body.iter().all(u8::is_ascii_whitespace) {
                debug!("watch closed without an event, re-watching");
                continue;
            }

            let response = reply.keys_response()?;
            let index = response
                .node
                .map(|node| node.modified_index)
                .or(reply.index)
                .unwrap_or(after_index + 1);
            return Ok(WatchEvent {
                action: parse_action(&response.action),
                index,
            });
        }
    }

    #[instrument(skip(self), fields(backend = "etcd"))]
    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> LockResult<bool> {
        let request = self
            .http
            .put(self.key_url(key))
            .query(&[("ttl", ttl_secs(ttl))])
            .query(&[("refresh", "true"), ("prevExist", "true")]);

        let reply = self.execute(request).await?;
        if reply.is_success() {
            return Ok(true);
        }
        match reply.etcd_error()? {
            err if err.error_code == EtcdError::KEY_NOT_FOUND => Ok(false),
            err => Err(LockError::Backend(Box::new(err))),
        }
    }

    #[instrument(skip(self), fields(backend = "etcd"))]
    async fn delete(&self, key: &str) -> LockResult<bool> {
        let reply = self.execute(self.http.delete(self.key_url(key))).await?;
        if reply.is_success() {
            return Ok(true);
        }
        match reply.etcd_error()? {
            err if err.error_code == EtcdError::KEY_NOT_FOUND => Ok(false),
            err => Err(LockError::Backend(Box::new(err))),
        }
    }
}
