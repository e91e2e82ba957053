use thiserror::Error;

use crate::agents::providers::Provider;

/// Errors surfaced to callers of the engine. Provider-level faults never
/// reach this type directly; they are absorbed by the fallback chain and only
/// the exhaustion outcome is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Visua11yError {
    #[error("No valid API key found. Configure an OpenAI or Gemini API key in the extension popup.")]
    NoValidCredential,
    #[error("{0}")]
    ProviderFailed(String),
    #[error("No {0} provided")]
    MissingInput(&'static str),
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Invalid {provider} API key format (should start with '{prefix}')")]
    InvalidCredential {
        provider: Provider,
        prefix: &'static str,
    },
    #[error("Credential storage unavailable: {0}")]
    Storage(String),
}

impl Visua11yError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoValidCredential => "AI-1001",
            Self::ProviderFailed(_) => "AI-1002",
            Self::MissingInput(_) => "REQ-1001",
            Self::UnknownAction(_) => "REQ-1002",
            Self::InvalidCredential { .. } => "KEY-1001",
            Self::Storage(_) => "KEY-1002",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::NoValidCredential => {
                "No cloud provider had a usable API key and the on-device model was not available."
            }
            Self::ProviderFailed(_) => {
                "Every configured provider was tried and the last one reported this failure."
            }
            Self::MissingInput(_) => "The request did not carry the payload the action needs.",
            Self::UnknownAction(_) => "The request named an action the engine does not handle.",
            Self::InvalidCredential { .. } => "The key does not match the provider's key format.",
            Self::Storage(_) => "The credential store could not be read or written.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Visua11yError::NoValidCredential.code(), "AI-1001");
        assert_eq!(
            Visua11yError::ProviderFailed("boom".into()).code(),
            "AI-1002"
        );
    }

    #[test]
    fn invalid_credential_message_names_prefix() {
        let err = Visua11yError::InvalidCredential {
            provider: Provider::OpenAi,
            prefix: "sk-",
        };
        assert_eq!(
            err.to_string(),
            "Invalid OpenAI API key format (should start with 'sk-')"
        );
    }
}
