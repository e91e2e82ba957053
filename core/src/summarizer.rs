//! Caller-facing accessibility operations.
//!
//! Each operation runs one fallback orchestration and shapes its outcome for
//! the caller: summarisation always yields displayable text, while digests
//! and screenshot analyses report exhaustion as an error.

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::agents::config::{self, EngineConfig};
use crate::agents::credentials::{CredentialAccessor, CredentialStore, SqliteCredentialStore};
use crate::agents::invoker::ProviderInvoker;
use crate::agents::on_device::{LocalRuntimeCapability, OnDeviceCapability};
use crate::agents::providers::{Operation, Provider};
use crate::agents::transport::{HttpTransport, ReqwestTransport};
use crate::db::DbPool;
use crate::errors::Visua11yError;
use crate::fallback::{FallbackOrchestrator, OrchestrationResult};

/// Designed fallback text when no provider could summarise.
pub const SUMMARY_UNAVAILABLE: &str = "🚫 AI Summary: Unable to generate summary. Configure an OpenAI or Gemini API key in the extension popup, or enable Chrome Built-in AI.";

pub use crate::agents::invoker::SUMMARY_PREFIX;

#[derive(Clone)]
pub struct Summarizer {
    orchestrator: FallbackOrchestrator,
}

impl Summarizer {
    pub fn new(orchestrator: FallbackOrchestrator) -> Arc<Self> {
        Arc::new(Self { orchestrator })
    }

    /// Wire the engine from its collaborators.
    pub fn from_parts(
        config: EngineConfig,
        store: Arc<dyn CredentialStore>,
        on_device: Arc<dyn OnDeviceCapability>,
        transport: Arc<dyn HttpTransport>,
    ) -> Arc<Self> {
        let invoker = ProviderInvoker::new(
            transport,
            CredentialAccessor::new(store),
            on_device,
            Arc::new(config),
        );
        Self::new(FallbackOrchestrator::new(invoker))
    }

    /// Production wiring: credentials and settings from the workspace
    /// database, a local runtime as the on-device provider, reqwest for HTTP.
    pub fn from_workspace(pool: DbPool) -> Result<Arc<Self>> {
        let config = {
            let conn = pool.get().map_err(|err| anyhow!(err.to_string()))?;
            config::load_config(&conn)?
        };
        let transport = ReqwestTransport::new(config.request_timeout())?;
        let on_device = LocalRuntimeCapability::new(&config.on_device, config.request_timeout())?;
        Ok(Self::from_parts(
            config,
            Arc::new(SqliteCredentialStore::new(pool)),
            Arc::new(on_device),
            Arc::new(transport),
        ))
    }

    /// Simplified-language summary of selected text. Never fails: total
    /// exhaustion yields [`SUMMARY_UNAVAILABLE`].
    pub async fn summarize_selection(&self, text: &str) -> String {
        match self.orchestrator.run(Operation::Summarize, text).await {
            OrchestrationResult::Success {
                text,
                provider: Provider::OnDevice,
            } => text,
            OrchestrationResult::Success { text, .. } => format!("{SUMMARY_PREFIX}{text}"),
            OrchestrationResult::Exhausted { .. } => SUMMARY_UNAVAILABLE.to_string(),
        }
    }

    /// Page-level TLDR of already formatted page content.
    pub async fn generate_digest(&self, page_content: &str) -> Result<String, Visua11yError> {
        if page_content.trim().is_empty() {
            return Err(Visua11yError::MissingInput("page content"));
        }
        self.orchestrator
            .run(Operation::GenerateDigest, page_content)
            .await
            .into_result()
    }

    /// Structural description of a screenshot given as a `data:` URL.
    pub async fn analyze_screenshot(&self, data_url: &str) -> Result<String, Visua11yError> {
        if data_url.trim().is_empty() {
            return Err(Visua11yError::MissingInput("screenshot data"));
        }
        self.orchestrator
            .run(Operation::AnalyzeScreenshot, data_url)
            .await
            .into_result()
    }

    /// Raw orchestration outcome, attempts included.
    pub async fn run(&self, operation: Operation, input: &str) -> OrchestrationResult {
        self.orchestrator.run(operation, input).await
    }
}
