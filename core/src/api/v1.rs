//! Version 1 of the message API.
//!
//! Requests arrive as JSON objects tagged by `action`; responses carry either
//! the result or a human-readable error. Summaries are always plain text,
//! digests and screenshot analyses report success explicitly.

use log::Level;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::Visua11yError;
use crate::logging::log_event;
use crate::summarizer::Summarizer;

/// Characters of page body kept before truncation.
pub const PAGE_TEXT_BUDGET: usize = 8000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action")]
pub enum InboundRequest {
    #[serde(rename = "summarize")]
    Summarize {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "generateTLDR")]
    GenerateTldr {
        #[serde(rename = "pageContent", default)]
        page_content: Option<String>,
    },
    #[serde(rename = "analyzeScreenshot")]
    AnalyzeScreenshot {
        #[serde(default)]
        screenshot: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tldr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutboundResponse {
    pub fn summary(text: String) -> Self {
        Self {
            summary: Some(text),
            ..Default::default()
        }
    }

    pub fn tldr(text: String) -> Self {
        Self {
            success: Some(true),
            tldr: Some(text),
            ..Default::default()
        }
    }

    pub fn analysis(text: String) -> Self {
        Self {
            success: Some(true),
            analysis: Some(text),
            ..Default::default()
        }
    }

    pub fn failure(error: &Visua11yError) -> Self {
        Self {
            success: Some(false),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Page metadata collected by the content extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub text_content: String,
}

impl PageContent {
    /// Render the digest input: title, URL, optional description, and the
    /// body cut to [`PAGE_TEXT_BUDGET`] characters.
    pub fn format(&self) -> String {
        let mut sections = vec![
            format!("Title: {}", self.title),
            format!("URL: {}", self.url),
        ];
        if !self.description.trim().is_empty() {
            sections.push(format!("Description: {}", self.description));
        }
        sections.push(format!(
            "Page Content: {}",
            truncate_body(&self.text_content)
        ));
        sections.join("\n\n").trim().to_string()
    }
}

pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(PAGE_TEXT_BUDGET) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

/// Dispatch one raw message. Never fails: malformed or unknown requests are
/// answered with a failure payload.
pub async fn handle_message(summarizer: &Summarizer, raw: &Value) -> OutboundResponse {
    let action = raw
        .get("action")
        .and_then(|a| a.as_str())
        .unwrap_or_default()
        .to_string();

    let request = match serde_json::from_value::<InboundRequest>(raw.clone()) {
        Ok(request) => request,
        Err(err) => {
            let error = match payload_noun(&action) {
                Some(noun) => Visua11yError::MissingInput(noun),
                None => Visua11yError::UnknownAction(action.clone()),
            };
            log_event(
                Level::Warn,
                Some(error.code()),
                "visua11y.api",
                "Message rejected",
                Some(error.explain()),
                Some(json!({ "action": action, "detail": err.to_string() })),
            );
            return OutboundResponse::failure(&error);
        }
    };

    log_event(
        Level::Debug,
        Some("REQ-0001"),
        "visua11y.api",
        "Message received",
        None,
        Some(json!({ "action": action })),
    );
    handle_request(summarizer, request).await
}

/// What a known action carries, for reporting unusable payloads.
fn payload_noun(action: &str) -> Option<&'static str> {
    match action {
        "summarize" => Some("text"),
        "generateTLDR" => Some("page content"),
        "analyzeScreenshot" => Some("screenshot data"),
        _ => None,
    }
}

pub async fn handle_request(summarizer: &Summarizer, request: InboundRequest) -> OutboundResponse {
    match request {
        InboundRequest::Summarize { text } => {
            OutboundResponse::summary(summarizer.summarize_selection(&text).await)
        }
        InboundRequest::GenerateTldr { page_content } => {
            let result = match page_content {
                Some(content) => summarizer.generate_digest(&content).await,
                None => Err(Visua11yError::MissingInput("page content")),
            };
            respond(result, OutboundResponse::tldr)
        }
        InboundRequest::AnalyzeScreenshot { screenshot } => {
            let result = match screenshot {
                Some(data_url) => summarizer.analyze_screenshot(&data_url).await,
                None => Err(Visua11yError::MissingInput("screenshot data")),
            };
            respond(result, OutboundResponse::analysis)
        }
    }
}

fn respond(
    result: Result<String, Visua11yError>,
    on_success: fn(String) -> OutboundResponse,
) -> OutboundResponse {
    match result {
        Ok(text) => on_success(text),
        Err(err) => {
            log_event(
                Level::Error,
                Some(err.code()),
                "visua11y.api",
                &err.to_string(),
                Some(err.explain()),
                None,
            );
            OutboundResponse::failure(&err)
        }
    }
}
