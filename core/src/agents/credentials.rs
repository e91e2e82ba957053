//! Credential store access and key-format validation.
//!
//! The engine only ever reads credentials; a missing, unreadable or
//! malformed key makes the provider unavailable and is never an error the
//! orchestration has to handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use log::Level;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, OptionalExtension};
use serde_json::json;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::task::spawn_blocking;

use super::providers::Provider;
use crate::db::DbPool;
use crate::errors::Visua11yError;
use crate::logging::log_event;

static OPENAI_KEY_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sk-[A-Za-z0-9_-]{48,}$").expect("static pattern"));
static GEMINI_KEY_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^AIza[0-9A-Za-z_-]{20,}$").expect("static pattern"));

pub fn is_valid_openai_key(raw: &str) -> bool {
    OPENAI_KEY_FORMAT.is_match(raw)
}

pub fn is_valid_gemini_key(raw: &str) -> bool {
    GEMINI_KEY_FORMAT.is_match(raw)
}

/// Pure format check for a provider's key. The on-device provider takes no
/// credential, so nothing validates for it.
pub fn is_valid_credential(provider: Provider, raw: &str) -> bool {
    match provider {
        Provider::OpenAi => is_valid_openai_key(raw),
        Provider::Gemini => is_valid_gemini_key(raw),
        Provider::OnDevice => false,
    }
}

fn key_prefix(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "sk-",
        Provider::Gemini => "AIza",
        Provider::OnDevice => "",
    }
}

/// A validated provider secret. `Debug` only shows a fingerprint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    provider: Provider,
    raw_value: String,
}

impl Credential {
    /// Returns `None` unless `raw_value` passes the provider's format check.
    pub fn new(provider: Provider, raw_value: impl Into<String>) -> Option<Self> {
        let raw_value = raw_value.into();
        is_valid_credential(provider, &raw_value).then_some(Self {
            provider,
            raw_value,
        })
    }

    pub fn expose(&self) -> &str {
        &self.raw_value
    }

    /// Short SHA-256 prefix, safe to put in logs.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.raw_value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

fn fingerprint(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}

/// External key-value persistence for provider secrets.
pub trait CredentialStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Secrets kept in the workspace SQLite database, base64-encoded at rest.
pub struct SqliteCredentialStore {
    pool: DbPool,
}

impl SqliteCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let secret: Option<String> = conn
            .query_row(
                "SELECT secret FROM credentials WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match secret {
            Some(s) => {
                let decoded = B64_ENGINE
                    .decode(s.as_bytes())
                    .map_err(|_| anyhow!("Failed to decode stored credential"))?;
                let value = String::from_utf8(decoded)
                    .map_err(|_| anyhow!("Stored credential was not valid UTF-8"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let encoded = B64_ENGINE.encode(value.as_bytes());
        let now = OffsetDateTime::now_utc().unix_timestamp();
        conn.execute(
            "INSERT INTO credentials (key, secret, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(key) DO UPDATE SET secret = excluded.secret, updated_at = excluded.updated_at",
            params![key, encoded, now],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM credentials WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// In-process store, handy for embedding and tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
        self
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| anyhow!("credential map poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| anyhow!("credential map poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| anyhow!("credential map poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

/// What the settings surface reports for a provider's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    Missing,
    Invalid,
    Valid { fingerprint: String },
}

/// Reads credentials for the engine and writes them for the settings surface.
#[derive(Clone)]
pub struct CredentialAccessor {
    store: Arc<dyn CredentialStore>,
}

impl CredentialAccessor {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Fetch a usable credential, or `None` when the key is missing, the store
    /// read fails, or the value is malformed.
    pub async fn get_credential(&self, provider: Provider) -> Option<Credential> {
        let key = provider.credential_key()?;
        let store = self.store.clone();
        let read = spawn_blocking(move || store.read(key)).await;

        let raw = match read {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => {
                log_event(
                    Level::Info,
                    Some("KEY-0100"),
                    "visua11y.credentials",
                    "No API key configured",
                    None,
                    Some(json!({ "provider": provider.id() })),
                );
                return None;
            }
            Ok(Err(err)) => {
                log_event(
                    Level::Warn,
                    Some("KEY-0101"),
                    "visua11y.credentials",
                    "Credential store read failed",
                    Some("Provider treated as unavailable"),
                    Some(json!({ "provider": provider.id(), "error": err.to_string() })),
                );
                return None;
            }
            Err(join_err) => {
                log_event(
                    Level::Warn,
                    Some("KEY-0101"),
                    "visua11y.credentials",
                    "Credential store read failed",
                    Some("Provider treated as unavailable"),
                    Some(json!({ "provider": provider.id(), "error": join_err.to_string() })),
                );
                return None;
            }
        };

        let credential = Credential::new(provider, raw);
        if credential.is_none() {
            log_event(
                Level::Warn,
                Some("KEY-0102"),
                "visua11y.credentials",
                "Stored API key has an invalid format",
                Some("Provider treated as unavailable"),
                Some(json!({ "provider": provider.id() })),
            );
        }
        credential
    }

    /// Validate and persist a key. An empty value clears the stored key.
    pub fn set_credential(&self, provider: Provider, raw: &str) -> Result<(), Visua11yError> {
        let Some(key) = provider.credential_key() else {
            return Err(Visua11yError::InvalidCredential {
                provider,
                prefix: key_prefix(provider),
            });
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return self.clear_credential(provider);
        }
        let credential =
            Credential::new(provider, trimmed).ok_or(Visua11yError::InvalidCredential {
                provider,
                prefix: key_prefix(provider),
            })?;
        self.store
            .write(key, credential.expose())
            .map_err(|err| Visua11yError::Storage(err.to_string()))?;
        log_event(
            Level::Info,
            Some("KEY-0001"),
            "visua11y.credentials",
            "API key saved",
            None,
            Some(json!({ "provider": provider.id(), "fingerprint": credential.fingerprint() })),
        );
        Ok(())
    }

    pub fn clear_credential(&self, provider: Provider) -> Result<(), Visua11yError> {
        let Some(key) = provider.credential_key() else {
            return Ok(());
        };
        self.store
            .remove(key)
            .map_err(|err| Visua11yError::Storage(err.to_string()))?;
        log_event(
            Level::Info,
            Some("KEY-0002"),
            "visua11y.credentials",
            "API key removed",
            None,
            Some(json!({ "provider": provider.id() })),
        );
        Ok(())
    }

    pub fn status(&self, provider: Provider) -> Result<CredentialStatus, Visua11yError> {
        let Some(key) = provider.credential_key() else {
            return Ok(CredentialStatus::Missing);
        };
        let raw = self
            .store
            .read(key)
            .map_err(|err| Visua11yError::Storage(err.to_string()))?;
        Ok(match raw {
            None => CredentialStatus::Missing,
            Some(raw) => match Credential::new(provider, raw) {
                Some(credential) => CredentialStatus::Valid {
                    fingerprint: credential.fingerprint(),
                },
                None => CredentialStatus::Invalid,
            },
        })
    }
}
