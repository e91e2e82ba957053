use std::fmt;
use std::sync::Arc;

use log::Level;
use serde_json::json;

use super::config::EngineConfig;
use super::credentials::{Credential, CredentialAccessor};
use super::on_device::{self, OnDeviceCapability, SessionGuard, SHARED_CONTEXT};
use super::payloads;
use super::providers::{Operation, Provider};
use super::transport::{HttpTransport, OutboundRequest};
use crate::logging::log_event;

/// Leads every selection summary shown to the user.
pub const SUMMARY_PREFIX: &str = "🤖 AI Summary: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptErrorKind {
    /// The on-device session could not be created or failed while generating.
    OnDevice,
    Network,
    Http,
    Parse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    NotSupported,
    CapabilityUnavailable,
    NoCredential,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotSupported => "provider does not support this operation",
            Self::CapabilityUnavailable => "on-device capability is not available",
            Self::NoCredential => "no valid API key configured",
        };
        f.write_str(text)
    }
}

/// Outcome of one attempt against one provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderAttemptResult {
    Success(String),
    Unavailable(UnavailableReason),
    Failure(AttemptErrorKind, String),
}

/// Performs single, self-contained provider attempts.
#[derive(Clone)]
pub struct ProviderInvoker {
    transport: Arc<dyn HttpTransport>,
    credentials: CredentialAccessor,
    on_device: Arc<dyn OnDeviceCapability>,
    config: Arc<EngineConfig>,
}

impl ProviderInvoker {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: CredentialAccessor,
        on_device: Arc<dyn OnDeviceCapability>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            transport,
            credentials,
            on_device,
            config,
        }
    }

    pub async fn attempt(
        &self,
        provider: Provider,
        operation: Operation,
        input: &str,
    ) -> ProviderAttemptResult {
        if !provider.supports(operation) {
            return ProviderAttemptResult::Unavailable(UnavailableReason::NotSupported);
        }
        match provider {
            Provider::OnDevice => self.attempt_on_device(input).await,
            Provider::OpenAi | Provider::Gemini => {
                self.attempt_cloud(provider, operation, input).await
            }
        }
    }

    async fn attempt_on_device(&self, input: &str) -> ProviderAttemptResult {
        if !on_device::is_available(self.on_device.as_ref()).await {
            return ProviderAttemptResult::Unavailable(UnavailableReason::CapabilityUnavailable);
        }

        let session = match self.on_device.create(SHARED_CONTEXT).await {
            Ok(session) => session,
            Err(err) => {
                return ProviderAttemptResult::Failure(
                    AttemptErrorKind::OnDevice,
                    format!("On-device session could not be created: {err:#}"),
                )
            }
        };

        let mut guard = SessionGuard::new(session);
        match guard.summarize(input).await {
            Ok(text) if !text.trim().is_empty() => ProviderAttemptResult::Success(format!(
                "{SUMMARY_PREFIX}{}",
                text.trim()
            )),
            Ok(_) => ProviderAttemptResult::Failure(
                AttemptErrorKind::OnDevice,
                "On-device summarizer returned no text".to_string(),
            ),
            Err(err) => ProviderAttemptResult::Failure(
                AttemptErrorKind::OnDevice,
                format!("On-device summarization failed: {err:#}"),
            ),
        }
    }

    async fn attempt_cloud(
        &self,
        provider: Provider,
        operation: Operation,
        input: &str,
    ) -> ProviderAttemptResult {
        let Some(credential) = self.credentials.get_credential(provider).await else {
            return ProviderAttemptResult::Unavailable(UnavailableReason::NoCredential);
        };
        let Some(model) = self.config.model_for(provider, operation) else {
            return ProviderAttemptResult::Unavailable(UnavailableReason::NotSupported);
        };

        let request = match provider {
            Provider::OpenAi => openai_request(&self.config, &credential, operation, input, model),
            _ => gemini_request(&self.config, &credential, operation, input, model),
        };

        log_event(
            Level::Info,
            Some("AI-0100"),
            "visua11y.invoker",
            "Calling provider",
            None,
            Some(json!({
                "provider": provider.id(),
                "operation": operation.to_string(),
                "model": model,
                "input_chars": input.chars().count(),
                "credential": credential.fingerprint(),
            })),
        );

        let reply = match self.transport.post_json(request).await {
            Ok(reply) => reply,
            Err(err) => {
                return ProviderAttemptResult::Failure(
                    AttemptErrorKind::Network,
                    format!("Network error: Unable to reach {provider} API. {err}"),
                )
            }
        };

        if !reply.is_success() {
            let detail = payloads::extract_error_message(&reply.body)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| reply.reason.clone());
            if let Some(hint) = status_hint(reply.status) {
                log_event(
                    Level::Warn,
                    Some("AI-0101"),
                    "visua11y.invoker",
                    "Provider rejected the request",
                    Some(hint),
                    Some(json!({ "provider": provider.id(), "status": reply.status })),
                );
            }
            return ProviderAttemptResult::Failure(
                AttemptErrorKind::Http,
                format!("{provider} API error ({}): {detail}", reply.status),
            );
        }

        let parsed = match provider {
            Provider::OpenAi => payloads::parse_openai_response(operation, &reply.body),
            _ => payloads::parse_gemini_response(operation, &reply.body),
        };
        match parsed {
            Ok(text) => ProviderAttemptResult::Success(text),
            Err(err) => ProviderAttemptResult::Failure(AttemptErrorKind::Parse, err.to_string()),
        }
    }
}

fn openai_request(
    config: &EngineConfig,
    credential: &Credential,
    operation: Operation,
    input: &str,
    model: &str,
) -> OutboundRequest {
    OutboundRequest {
        url: config.openai_chat_url(),
        bearer_token: Some(credential.expose().to_string()),
        body: payloads::build_openai_request(operation, input, model),
    }
}

fn gemini_request(
    config: &EngineConfig,
    credential: &Credential,
    operation: Operation,
    input: &str,
    model: &str,
) -> OutboundRequest {
    OutboundRequest {
        url: config.gemini_generate_url(model, credential.expose()),
        bearer_token: None,
        body: payloads::build_gemini_request(operation, input),
    }
}

/// Refinement for statuses worth calling out. Log-only.
fn status_hint(status: u16) -> Option<&'static str> {
    match status {
        401 => Some("API key might be invalid or expired"),
        403 => Some("API key might not have permission"),
        429 => Some("Rate limit exceeded, try again later"),
        _ => None,
    }
}
