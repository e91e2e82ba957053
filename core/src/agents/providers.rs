//! Provider catalogue and per-operation applicability.
//!
//! The fallback order is a fixed list; whether a provider takes part in an
//! operation is decided by [`Provider::supports`] rather than at call sites.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-requested task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Summarize,
    GenerateDigest,
    AnalyzeScreenshot,
}

impl Operation {
    /// Upper bound on generated tokens requested from cloud providers.
    pub fn max_output_tokens(self) -> u32 {
        match self {
            Self::Summarize => 1024,
            Self::GenerateDigest => 300,
            Self::AnalyzeScreenshot => 400,
        }
    }

    pub fn temperature(self) -> f64 {
        match self {
            Self::Summarize | Self::GenerateDigest => 0.3,
            Self::AnalyzeScreenshot => 0.1,
        }
    }

    /// Noun used in "no content received" diagnostics.
    pub fn content_noun(self) -> &'static str {
        match self {
            Self::Summarize => "summary",
            Self::GenerateDigest => "TLDR",
            Self::AnalyzeScreenshot => "analysis",
        }
    }

    pub fn needs_vision(self) -> bool {
        matches!(self, Self::AnalyzeScreenshot)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Summarize => "summarize",
            Self::GenerateDigest => "generate_digest",
            Self::AnalyzeScreenshot => "analyze_screenshot",
        };
        f.write_str(label)
    }
}

/// Backend able to produce a result for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Local summarisation runtime; no credential, summarize only.
    OnDevice,
    /// OpenAI chat completions (text and vision).
    OpenAi,
    /// Google Gemini generateContent (text and vision).
    Gemini,
}

/// Priority order every orchestration walks, first to last.
pub const PROVIDER_ORDER: [Provider; 3] = [Provider::OnDevice, Provider::OpenAi, Provider::Gemini];

impl Provider {
    pub fn id(self) -> &'static str {
        match self {
            Self::OnDevice => "on_device",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::OnDevice => "On-device AI",
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
        }
    }

    pub fn supports(self, operation: Operation) -> bool {
        match self {
            Self::OnDevice => operation == Operation::Summarize,
            Self::OpenAi | Self::Gemini => true,
        }
    }

    /// Key under which the provider's credential lives in the store.
    pub fn credential_key(self) -> Option<&'static str> {
        match self {
            Self::OnDevice => None,
            Self::OpenAi => Some("openaiApiKey"),
            Self::Gemini => Some("geminiApiKey"),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Providers that take part in `operation`, in priority order.
pub fn providers_for(operation: Operation) -> impl Iterator<Item = Provider> {
    PROVIDER_ORDER
        .into_iter()
        .filter(move |provider| provider.supports(operation))
}
