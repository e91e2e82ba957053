//! On-device summarisation capability.
//!
//! A capability reports a tri-state availability and hands out short-lived
//! sessions. Sessions must be released with [`OnDeviceSession::destroy`];
//! [`SessionGuard`] does that on every exit path.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::Level;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::config::LocalRuntimeSettings;
use crate::logging::log_event;

/// Context handed to every on-device session.
pub const SHARED_CONTEXT: &str = "You are helping users with cognitive disabilities understand complex text by simplifying it according to WCAG 3.1.5 accessibility standards.";

/// Declared readiness of the capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Availability {
    No,
    AfterDownload,
    Readily,
}

impl Availability {
    /// Anything but an explicit `no` counts; a model still to be downloaded
    /// is fetched by [`OnDeviceCapability::create`].
    pub fn is_usable(self) -> bool {
        !matches!(self, Self::No)
    }
}

#[async_trait]
pub trait OnDeviceCapability: Send + Sync {
    async fn availability(&self) -> Result<Availability>;

    /// Create a session. Implementations must not return before the model is
    /// ready, downloading it first when availability is `AfterDownload`.
    async fn create(&self, shared_context: &str) -> Result<Box<dyn OnDeviceSession>>;
}

#[async_trait]
pub trait OnDeviceSession: Send {
    async fn summarize(&mut self, text: &str) -> Result<String>;

    /// Release the underlying model session. Must not panic.
    fn destroy(&mut self);
}

/// Probe the capability. Query errors read as unavailable.
pub async fn is_available(capability: &dyn OnDeviceCapability) -> bool {
    match capability.availability().await {
        Ok(availability) => {
            log_event(
                Level::Debug,
                Some("DEV-0100"),
                "visua11y.on_device",
                "On-device capability probed",
                None,
                Some(json!({ "availability": availability })),
            );
            availability.is_usable()
        }
        Err(err) => {
            log_event(
                Level::Info,
                Some("DEV-0101"),
                "visua11y.on_device",
                "On-device capability probe failed",
                Some("Treated as unavailable"),
                Some(json!({ "error": format!("{err:#}") })),
            );
            false
        }
    }
}

/// Owns a session for the duration of one request and destroys it on drop.
pub struct SessionGuard {
    session: Box<dyn OnDeviceSession>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn OnDeviceSession>) -> Self {
        Self { session }
    }

    pub async fn summarize(&mut self, text: &str) -> Result<String> {
        self.session.summarize(text).await
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.destroy();
        log_event(
            Level::Debug,
            Some("DEV-0002"),
            "visua11y.on_device",
            "On-device session released",
            None,
            None,
        );
    }
}

/// Used when the host offers no on-device capability at all.
pub struct NoOnDeviceCapability;

#[async_trait]
impl OnDeviceCapability for NoOnDeviceCapability {
    async fn availability(&self) -> Result<Availability> {
        Ok(Availability::No)
    }

    async fn create(&self, _shared_context: &str) -> Result<Box<dyn OnDeviceSession>> {
        bail!("no on-device capability present")
    }
}

/// Local Ollama runtime acting as the on-device summariser.
pub struct LocalRuntimeCapability {
    client: Client,
    base_url: String,
    model: String,
    enabled: bool,
    pull_timeout: Duration,
}

impl LocalRuntimeCapability {
    pub fn new(settings: &LocalRuntimeSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Visua11y-Core/0.1")
            .build()
            .context("failed to construct local runtime client")?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            enabled: settings.enabled,
            pull_timeout: Duration::from_secs(settings.pull_timeout_secs),
        })
    }

    async fn pull_model(&self) -> Result<()> {
        log_event(
            Level::Info,
            Some("DEV-0003"),
            "visua11y.on_device",
            "Downloading on-device model",
            Some("First use of the local model"),
            Some(json!({ "model": self.model })),
        );
        self.client
            .post(format!("{}/api/pull", self.base_url))
            .timeout(self.pull_timeout)
            .json(&json!({ "model": self.model, "stream": false }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl OnDeviceCapability for LocalRuntimeCapability {
    async fn availability(&self) -> Result<Availability> {
        if !self.enabled {
            return Ok(Availability::No);
        }
        let response = match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            _ => return Ok(Availability::No),
        };
        let body: Value = response.json().await?;
        Ok(availability_from_tags(&body, &self.model))
    }

    async fn create(&self, shared_context: &str) -> Result<Box<dyn OnDeviceSession>> {
        match self.availability().await? {
            Availability::No => bail!("local runtime is not reachable"),
            Availability::AfterDownload => self.pull_model().await?,
            Availability::Readily => {}
        }
        Ok(Box::new(LocalRuntimeSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            shared_context: shared_context.to_string(),
        }))
    }
}

fn availability_from_tags(body: &Value, model: &str) -> Availability {
    let present = body
        .get("models")
        .and_then(|models| models.as_array())
        .map(|models| {
            models.iter().any(|m| {
                m.get("name")
                    .and_then(|n| n.as_str())
                    .map(|name| model_matches(name, model))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);
    if present {
        Availability::Readily
    } else {
        Availability::AfterDownload
    }
}

/// `llama3.2` matches an installed `llama3.2:latest`.
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted || (!wanted.contains(':') && installed == format!("{wanted}:latest"))
}

struct LocalRuntimeSession {
    client: Client,
    base_url: String,
    model: String,
    shared_context: String,
}

#[async_trait]
impl OnDeviceSession for LocalRuntimeSession {
    async fn summarize(&mut self, text: &str) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.shared_context },
                { "role": "user", "content": text },
            ],
            "stream": false,
            "options": { "temperature": 0.2 },
        });
        let body: Value = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        body.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow!("local runtime returned no summary"))
    }

    fn destroy(&mut self) {
        // Ask the runtime to unload the model; fire and forget.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        let url = format!("{}/api/generate", self.base_url);
        let payload = json!({ "model": self.model, "keep_alive": 0 });
        handle.spawn(async move {
            let _ = client.post(url).json(&payload).send().await;
        });
    }
}
