//! Request builders and response parsers for each cloud provider.
//!
//! Builders are pure functions of (operation, input, model); parsers pull the
//! first textual candidate out of the provider's reply and reject empty text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::providers::{Operation, Provider};

const SUMMARY_SYSTEM_PROMPT: &str = "Your task is to simplify complex information for users with cognitive disabilities, as per accessibility standard WCAG 3.1.5 (Reading Level). Create a version of the following text that is easy to understand, as if for someone at a lower secondary education level. The summary should be concise and clear. Use **bold text** to highlight important terms and concepts.";
const DIGEST_SYSTEM_PROMPT: &str = "You are an accessibility expert helping users with cognitive disabilities understand webpage content. Create a TLDR that explains the page in simple, clear language. Use **bold** for important terms.";
const SCREENSHOT_SYSTEM_PROMPT: &str = "You are an accessibility expert analyzing webpage screenshots. Provide concise visual summaries for screen reader users, focusing on structure and key interactive elements.";

// Gemini has no system role, so its instructions ride in the user turn.
const GEMINI_SUMMARY_PREAMBLE: &str = "Your task is to simplify complex information for users with cognitive disabilities (WCAG 3.1.5). Keep it concise and highlight important words in bold Markdown.";
const GEMINI_DIGEST_PREAMBLE: &str = "You are an accessibility expert helping users with cognitive disabilities. Create a short TLDR that explains what this page is about in simple, clear language. Use **bold** for key terms.";
const GEMINI_SCREENSHOT_PROMPT: &str =
    "Analyze this webpage screenshot for structure and key interactive elements.";

const SCREENSHOT_USER_PROMPT: &str = "Analyze this webpage screenshot.";
const DEFAULT_IMAGE_MIME: &str = "image/png";

static DATA_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:([^;]+);base64,(.*)$").expect("static pattern"));

/// Image bytes split out of a `data:` URL, still base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// Split `data:<mime>;base64,<payload>`. Anything else degrades to an empty
/// PNG payload instead of failing.
pub fn split_data_url(input: &str) -> InlineImage {
    match DATA_URL.captures(input) {
        Some(caps) => InlineImage {
            mime_type: caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
            data: caps
                .get(2)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        },
        None => InlineImage {
            mime_type: DEFAULT_IMAGE_MIME.to_string(),
            data: String::new(),
        },
    }
}

/// Body for `POST /v1/chat/completions`.
pub fn build_openai_request(operation: Operation, input: &str, model: &str) -> Value {
    let messages = match operation {
        Operation::Summarize => json!([
            { "role": "system", "content": SUMMARY_SYSTEM_PROMPT },
            {
                "role": "user",
                "content": format!("Please summarize the following text:\n\n{input}"),
            },
        ]),
        Operation::GenerateDigest => json!([
            { "role": "system", "content": DIGEST_SYSTEM_PROMPT },
            { "role": "user", "content": format!("Provide a TLDR for:\n\n{input}") },
        ]),
        Operation::AnalyzeScreenshot => json!([
            { "role": "system", "content": SCREENSHOT_SYSTEM_PROMPT },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": SCREENSHOT_USER_PROMPT },
                    { "type": "image_url", "image_url": { "url": input, "detail": "high" } },
                ],
            },
        ]),
    };

    json!({
        "model": model,
        "messages": messages,
        "max_tokens": operation.max_output_tokens(),
        "temperature": operation.temperature(),
    })
}

/// Body for `POST {model}:generateContent`.
pub fn build_gemini_request(operation: Operation, input: &str) -> Value {
    let parts = match operation {
        Operation::Summarize => json!([{
            "text": format!(
                "{GEMINI_SUMMARY_PREAMBLE}\n\nPlease summarize the following text:\n\n{input}"
            ),
        }]),
        Operation::GenerateDigest => json!([{
            "text": format!("{GEMINI_DIGEST_PREAMBLE}\n\n{input}"),
        }]),
        Operation::AnalyzeScreenshot => {
            let image = split_data_url(input);
            json!([
                { "text": GEMINI_SCREENSHOT_PROMPT },
                { "inline_data": { "mime_type": image.mime_type, "data": image.data } },
            ])
        }
    };

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "temperature": operation.temperature(),
            "maxOutputTokens": operation.max_output_tokens(),
        },
    })
}

/// Why a 2xx reply did not yield text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("Invalid JSON from {provider} API: {detail}")]
    NotJson { provider: Provider, detail: String },
    #[error("{provider} API error: {message}")]
    Embedded { provider: Provider, message: String },
    #[error("No {noun} content received from {provider} API")]
    Empty {
        provider: Provider,
        noun: &'static str,
    },
}

/// Extract `choices[0].message.content`.
pub fn parse_openai_response(operation: Operation, body: &str) -> Result<String, PayloadError> {
    let value = parse_json(Provider::OpenAi, body)?;
    let content = value
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|val| val.as_str());
    non_empty(Provider::OpenAi, operation, &value, content)
}

/// Extract `candidates[0].content.parts[0].text`.
pub fn parse_gemini_response(operation: Operation, body: &str) -> Result<String, PayloadError> {
    let value = parse_json(Provider::Gemini, body)?;
    let content = value
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|cand| cand.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.get(0))
        .and_then(|part| part.get("text"))
        .and_then(|text| text.as_str());
    non_empty(Provider::Gemini, operation, &value, content)
}

/// `error.message` from an error body, if the provider sent one.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    embedded_error(&value)
}

fn parse_json(provider: Provider, body: &str) -> Result<Value, PayloadError> {
    serde_json::from_str(body).map_err(|err| PayloadError::NotJson {
        provider,
        detail: err.to_string(),
    })
}

fn embedded_error(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(ToOwned::to_owned)
}

fn non_empty(
    provider: Provider,
    operation: Operation,
    value: &Value,
    content: Option<&str>,
) -> Result<String, PayloadError> {
    match content.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => match embedded_error(value) {
            Some(message) => Err(PayloadError::Embedded { provider, message }),
            None => Err(PayloadError::Empty {
                provider,
                noun: operation.content_noun(),
            }),
        },
    }
}
