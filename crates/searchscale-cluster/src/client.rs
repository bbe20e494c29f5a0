//! Minimal JSON-over-HTTP/1.1 client for the cluster API.
//!
//! One connection per request, the same way health checks are done:
//! connect, handshake, drive the connection in the background, send a
//! single GET and collect the body. Every request is bounded by a timeout.

use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use base64::Engine;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use serde::de::DeserializeOwned;
use tracing::debug;

use searchscale_config::{ClusterDetails, Credentials};

/// HTTP client bound to one cluster endpoint.
#[derive(Clone)]
pub struct ClusterClient {
    /// `host:port` of the cluster API.
    endpoint: String,
    /// Pre-rendered `Authorization` header value.
    authorization: Option<String>,
    timeout: Duration,
}

impl ClusterClient {
    /// Create a client for `endpoint` authenticating with `credentials`.
    pub fn new(endpoint: &str, credentials: &Credentials) -> Self {
        let authorization = (!credentials.username.is_empty()).then(|| {
            let raw = format!("{}:{}", credentials.username, credentials.password);
            format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD.encode(raw)
            )
        });
        Self {
            endpoint: endpoint.to_string(),
            authorization,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_details(cluster: &ClusterDetails) -> Self {
        Self::new(&cluster.endpoint, &cluster.credentials)
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// GET `path` and decode the JSON response body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let body = tokio::time::timeout(self.timeout, self.get(path))
            .await
            .map_err(|_| anyhow!("GET {path} on {} timed out", self.endpoint))??;
        serde_json::from_slice(&body).with_context(|| format!("decoding response of GET {path}"))
    }

    /// Number of nodes currently in the cluster.
    pub async fn node_count(&self) -> anyhow::Result<u32> {
        let nodes: Vec<serde_json::Value> = self.get_json("/_cat/nodes?format=json").await?;
        Ok(nodes.len() as u32)
    }

    async fn get(&self, path: &str) -> anyhow::Result<Bytes> {
        let stream = tokio::net::TcpStream::connect(&self.endpoint)
            .await
            .with_context(|| format!("connecting to {}", self.endpoint))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .context("http handshake")?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut request = http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", &self.endpoint)
            .header("accept", "application/json")
            .header("user-agent", "searchscale/0.1");
        if let Some(auth) = &self.authorization {
            request = request.header("authorization", auth);
        }
        let request = request.body(Empty::<Bytes>::new())?;

        let response = sender
            .send_request(request)
            .await
            .with_context(|| format!("GET {path}"))?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        if !status.is_success() {
            bail!(
                "GET {path} returned {status}: {}",
                String::from_utf8_lossy(&body).trim()
            );
        }
        debug!(%path, %status, bytes = body.len(), "cluster request complete");
        Ok(body)
    }
}
