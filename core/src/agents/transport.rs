use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// A single JSON POST to a cloud provider.
#[derive(Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub bearer_token: Option<String>,
    pub body: Value,
}

impl fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Gemini carries its key in the query string.
        let url = self.url.split('?').next().unwrap_or_default();
        f.debug_struct("OutboundRequest")
            .field("url", &url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Status line and raw body of a provider reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The host could not be reached or the reply could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(&self, request: OutboundRequest) -> Result<HttpReply, TransportError>;
}

/// Production transport backed by a shared reqwest client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Visua11y-Core/0.1")
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, request: OutboundRequest) -> Result<HttpReply, TransportError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TransportError(describe_reqwest_error(err)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError(describe_reqwest_error(err)))?;

        Ok(HttpReply {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

fn describe_reqwest_error(err: reqwest::Error) -> String {
    // reqwest puts the full URL in its Display output; query-string keys must
    // never reach the logs.
    let err = err.without_url();
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
