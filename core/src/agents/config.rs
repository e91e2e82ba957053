use std::time::Duration;

use anyhow::{Context, Result};
use log::Level;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use super::providers::{Operation, Provider};
use crate::logging::log_event;

const CONFIG_KEY: &str = "engine.config";

/// Endpoint settings for one cloud provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEndpoint {
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
}

/// Local summarisation runtime used as the on-device provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalRuntimeSettings {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    /// Upper bound for downloading a missing model, independent of the
    /// per-request timeout.
    pub pull_timeout_secs: u64,
}

impl Default for LocalRuntimeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.2:1b".to_string(),
            pull_timeout_secs: 30 * 60,
        }
    }
}

/// Read-only settings shared by every orchestration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub openai: CloudEndpoint,
    pub gemini: CloudEndpoint,
    pub on_device: LocalRuntimeSettings,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            openai: CloudEndpoint {
                base_url: "https://api.openai.com".to_string(),
                text_model: "gpt-4o-mini".to_string(),
                vision_model: "gpt-4o-mini".to_string(),
            },
            gemini: CloudEndpoint {
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                text_model: "models/gemini-1.5-flash-latest".to_string(),
                vision_model: "models/gemini-1.5-flash-latest".to_string(),
            },
            on_device: LocalRuntimeSettings::default(),
            request_timeout_secs: 45,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Endpoint settings for a cloud provider; `None` for the on-device one.
    pub fn endpoint(&self, provider: Provider) -> Option<&CloudEndpoint> {
        match provider {
            Provider::OpenAi => Some(&self.openai),
            Provider::Gemini => Some(&self.gemini),
            Provider::OnDevice => None,
        }
    }

    pub fn model_for(&self, provider: Provider, operation: Operation) -> Option<&str> {
        let endpoint = self.endpoint(provider)?;
        if operation.needs_vision() {
            Some(endpoint.vision_model.as_str())
        } else {
            Some(endpoint.text_model.as_str())
        }
    }

    pub fn openai_chat_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.openai.base_url.trim_end_matches('/')
        )
    }

    /// The key is validated against `[0-9A-Za-z_-]` before it gets here, so it
    /// needs no escaping in the query string.
    pub fn gemini_generate_url(&self, model: &str, key: &str) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.gemini.base_url.trim_end_matches('/'),
            model.trim_start_matches('/'),
            key
        )
    }
}

/// Partial update applied on top of the stored configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigUpdate {
    pub openai_base_url: Option<String>,
    pub gemini_base_url: Option<String>,
    pub local_base_url: Option<String>,
    pub local_model: Option<String>,
    pub local_enabled: Option<bool>,
    pub request_timeout_secs: Option<u64>,
}

pub fn load_config(conn: &rusqlite::Connection) -> Result<EngineConfig> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM app_settings WHERE key = ?1",
            params![CONFIG_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        Some(raw) => serde_json::from_str(&raw).context("stored engine configuration is corrupt"),
        None => Ok(EngineConfig::default()),
    }
}

pub fn save_config(conn: &rusqlite::Connection, config: &EngineConfig) -> Result<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let payload = serde_json::to_string(config)?;
    conn.execute(
        "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![CONFIG_KEY, payload, now],
    )?;
    Ok(())
}

pub fn update_config(
    conn: &rusqlite::Connection,
    update: EngineConfigUpdate,
) -> Result<EngineConfig> {
    let mut config = load_config(conn)?;
    if let Some(url) = update.openai_base_url {
        config.openai.base_url = url.trim().to_string();
    }
    if let Some(url) = update.gemini_base_url {
        config.gemini.base_url = url.trim().to_string();
    }
    if let Some(url) = update.local_base_url {
        config.on_device.base_url = url.trim().to_string();
    }
    if let Some(model) = update.local_model {
        config.on_device.model = model.trim().to_string();
    }
    if let Some(enabled) = update.local_enabled {
        config.on_device.enabled = enabled;
    }
    if let Some(secs) = update.request_timeout_secs {
        config.request_timeout_secs = secs;
    }
    save_config(conn, &config)?;
    log_event(
        Level::Info,
        Some("CFG-0001"),
        "visua11y.config",
        "Engine configuration updated",
        None,
        Some(json!({
            "openai_base_url": config.openai.base_url,
            "gemini_base_url": config.gemini.base_url,
            "local_base_url": config.on_device.base_url,
            "local_model": config.on_device.model,
            "local_enabled": config.on_device.enabled,
        })),
    );
    Ok(config)
}
