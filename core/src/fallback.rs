//! Fallback orchestration across providers.
//!
//! One call walks the providers applicable to its operation in priority
//! order, awaiting each attempt before issuing the next. The first success
//! ends the walk; every other outcome is recorded and the walk moves on.
//! Running out of providers is the only terminal failure.

use log::Level;
use serde_json::json;
use uuid::Uuid;

use crate::agents::invoker::{ProviderAttemptResult, ProviderInvoker};
use crate::agents::providers::{providers_for, Operation, Provider};
use crate::errors::Visua11yError;
use crate::logging::log_event;

/// One recorded attempt of an exhausted orchestration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAttempt {
    pub provider: Provider,
    pub result: ProviderAttemptResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestrationResult {
    Success { text: String, provider: Provider },
    Exhausted { attempts: Vec<ProviderAttempt> },
}

impl OrchestrationResult {
    /// Message of the last `Failure` recorded, if any attempt got that far.
    pub fn last_failure(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Exhausted { attempts } => {
                attempts.iter().rev().find_map(|attempt| match &attempt.result {
                    ProviderAttemptResult::Failure(_, message) => Some(message.as_str()),
                    _ => None,
                })
            }
        }
    }

    /// Surface the outcome as a caller-facing result. Exhaustion without any
    /// failure means no provider was ever usable.
    pub fn into_result(self) -> Result<String, Visua11yError> {
        match self {
            Self::Success { text, .. } => Ok(text),
            exhausted => match exhausted.last_failure() {
                Some(message) => Err(Visua11yError::ProviderFailed(message.to_string())),
                None => Err(Visua11yError::NoValidCredential),
            },
        }
    }
}

/// Top-level engine: fixed priority order, one attempt in flight at a time.
#[derive(Clone)]
pub struct FallbackOrchestrator {
    invoker: ProviderInvoker,
}

impl FallbackOrchestrator {
    pub fn new(invoker: ProviderInvoker) -> Self {
        Self { invoker }
    }

    pub async fn run(&self, operation: Operation, input: &str) -> OrchestrationResult {
        let call_id = Uuid::new_v4().to_string();
        let mut attempts = Vec::new();

        for provider in providers_for(operation) {
            let result = self.invoker.attempt(provider, operation, input).await;
            match result {
                ProviderAttemptResult::Success(text) => {
                    log_invocation_success(&call_id, operation, provider, &text);
                    return OrchestrationResult::Success { text, provider };
                }
                other => {
                    log_invocation_skip(&call_id, operation, provider, &other);
                    attempts.push(ProviderAttempt {
                        provider,
                        result: other,
                    });
                }
            }
        }

        log_event(
            Level::Error,
            Some("AI-0202"),
            "visua11y.fallback",
            "All providers exhausted",
            None,
            Some(json!({
                "call_id": call_id,
                "operation": operation.to_string(),
                "attempts": attempts.len(),
            })),
        );
        OrchestrationResult::Exhausted { attempts }
    }
}

fn log_invocation_success(call_id: &str, operation: Operation, provider: Provider, text: &str) {
    let preview = text.chars().take(200).collect::<String>();
    log_event(
        Level::Info,
        Some("AI-0200"),
        "visua11y.fallback",
        "Provider produced a result",
        None,
        Some(json!({
            "call_id": call_id,
            "operation": operation.to_string(),
            "provider": provider.id(),
            "chars": text.chars().count(),
            "preview": preview,
        })),
    );
}

fn log_invocation_skip(
    call_id: &str,
    operation: Operation,
    provider: Provider,
    result: &ProviderAttemptResult,
) {
    let (level, detail) = match result {
        ProviderAttemptResult::Unavailable(reason) => (Level::Info, reason.to_string()),
        ProviderAttemptResult::Failure(kind, message) => {
            (Level::Warn, format!("{kind:?}: {message}"))
        }
        ProviderAttemptResult::Success(_) => return,
    };
    log_event(
        level,
        Some("AI-0201"),
        "visua11y.fallback",
        "Provider attempt did not succeed",
        Some("Attempting fallback"),
        Some(json!({
            "call_id": call_id,
            "operation": operation.to_string(),
            "provider": provider.id(),
            "detail": detail,
        })),
    );
}
