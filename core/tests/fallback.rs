use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use visua11y_core::agents::config::EngineConfig;
use visua11y_core::agents::credentials::MemoryCredentialStore;
use visua11y_core::agents::invoker::AttemptErrorKind;
use visua11y_core::agents::on_device::{
    Availability, NoOnDeviceCapability, OnDeviceCapability, OnDeviceSession,
};
use visua11y_core::agents::transport::{HttpReply, HttpTransport, OutboundRequest, TransportError};
use visua11y_core::agents::{Operation, Provider, ProviderAttemptResult};
use visua11y_core::api::v1::{handle_message, PageContent};
use visua11y_core::summarizer::{SUMMARY_PREFIX, SUMMARY_UNAVAILABLE};
use visua11y_core::{OrchestrationResult, Summarizer, Visua11yError};

const OPENAI_KEY: &str = "sk-abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWX";
const GEMINI_KEY: &str = "AIzaSyA1234567890abcdefghijklmnopqrs";

fn reply(status: u16, reason: &str, body: serde_json::Value) -> HttpReply {
    HttpReply {
        status,
        reason: reason.to_string(),
        body: body.to_string(),
    }
}

fn openai_ok(text: &str) -> HttpReply {
    reply(200, "OK", json!({ "choices": [{ "message": { "content": text } }] }))
}

fn gemini_ok(text: &str) -> HttpReply {
    reply(
        200,
        "OK",
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }),
    )
}

/// Answers by endpoint and records every request it sees.
#[derive(Default)]
struct RoutingTransport {
    openai: Option<HttpReply>,
    gemini: Option<HttpReply>,
    openai_calls: Mutex<Vec<OutboundRequest>>,
    gemini_calls: Mutex<Vec<OutboundRequest>>,
}

impl RoutingTransport {
    fn openai_calls(&self) -> usize {
        self.openai_calls.lock().unwrap().len()
    }

    fn gemini_calls(&self) -> usize {
        self.gemini_calls.lock().unwrap().len()
    }

    fn total_calls(&self) -> usize {
        self.openai_calls() + self.gemini_calls()
    }
}

#[async_trait]
impl HttpTransport for RoutingTransport {
    async fn post_json(&self, request: OutboundRequest) -> Result<HttpReply, TransportError> {
        let (calls, canned) = if request.url.contains("/chat/completions") {
            (&self.openai_calls, &self.openai)
        } else if request.url.contains(":generateContent") {
            (&self.gemini_calls, &self.gemini)
        } else {
            return Err(TransportError(format!("unexpected url {}", request.url)));
        };
        calls.lock().unwrap().push(request);
        canned
            .clone()
            .ok_or_else(|| TransportError("connection refused".into()))
    }
}

struct ReadyCapability {
    created: AtomicUsize,
    destroyed: Arc<AtomicUsize>,
}

impl ReadyCapability {
    fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct EchoSession {
    destroyed: Arc<AtomicUsize>,
}

#[async_trait]
impl OnDeviceSession for EchoSession {
    async fn summarize(&mut self, text: &str) -> Result<String> {
        Ok(format!("In short: {}", text.split('.').next().unwrap_or_default()))
    }

    fn destroy(&mut self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl OnDeviceCapability for ReadyCapability {
    async fn availability(&self) -> Result<Availability> {
        Ok(Availability::Readily)
    }

    async fn create(&self, _shared_context: &str) -> Result<Box<dyn OnDeviceSession>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(EchoSession {
            destroyed: self.destroyed.clone(),
        }))
    }
}

/// Hands out sessions that crash mid-generation, or refuses to create any.
struct CrashingCapability {
    refuse_create: bool,
    created: AtomicUsize,
    destroyed: Arc<AtomicUsize>,
}

impl CrashingCapability {
    fn new(refuse_create: bool) -> Self {
        Self {
            refuse_create,
            created: AtomicUsize::new(0),
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct CrashingSession {
    destroyed: Arc<AtomicUsize>,
}

#[async_trait]
impl OnDeviceSession for CrashingSession {
    async fn summarize(&mut self, _text: &str) -> Result<String> {
        anyhow::bail!("model process exited")
    }

    fn destroy(&mut self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl OnDeviceCapability for CrashingCapability {
    async fn availability(&self) -> Result<Availability> {
        Ok(Availability::Readily)
    }

    async fn create(&self, _shared_context: &str) -> Result<Box<dyn OnDeviceSession>> {
        if self.refuse_create {
            anyhow::bail!("model failed to load");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CrashingSession {
            destroyed: self.destroyed.clone(),
        }))
    }
}

fn engine(
    store: MemoryCredentialStore,
    on_device: Arc<dyn OnDeviceCapability>,
    transport: Arc<RoutingTransport>,
) -> Arc<Summarizer> {
    Summarizer::from_parts(EngineConfig::default(), Arc::new(store), on_device, transport)
}

fn both_keys() -> MemoryCredentialStore {
    MemoryCredentialStore::new()
        .with("openaiApiKey", OPENAI_KEY)
        .with("geminiApiKey", GEMINI_KEY)
}

#[tokio::test]
async fn on_device_summary_makes_no_network_call() {
    let transport = Arc::new(RoutingTransport {
        openai: Some(openai_ok("cloud")),
        ..Default::default()
    });
    let capability = Arc::new(ReadyCapability::new());
    let summarizer = engine(both_keys(), capability.clone(), transport.clone());

    let summary = summarizer
        .summarize_selection("Cats sleep a lot. They also purr.")
        .await;

    assert_eq!(summary, "🤖 AI Summary: In short: Cats sleep a lot");
    assert_eq!(transport.total_calls(), 0);
    assert_eq!(capability.created.load(Ordering::SeqCst), 1);
    assert_eq!(capability.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn first_cloud_provider_success_skips_the_second() {
    let transport = Arc::new(RoutingTransport {
        openai: Some(openai_ok("Plain words.")),
        gemini: Some(gemini_ok("unused")),
        ..Default::default()
    });
    let summarizer = engine(both_keys(), Arc::new(NoOnDeviceCapability), transport.clone());

    let summary = summarizer.summarize_selection("Dense legal text.").await;

    assert_eq!(summary, format!("{SUMMARY_PREFIX}Plain words."));
    assert_eq!(transport.openai_calls(), 1);
    assert_eq!(transport.gemini_calls(), 0);
}

#[tokio::test]
async fn malformed_openai_key_falls_through_to_gemini() {
    let store = MemoryCredentialStore::new()
        .with("openaiApiKey", "pk-not-an-openai-key-at-all-xxxxxxxxxxxxxxxxxxxxxxxxxx")
        .with("geminiApiKey", GEMINI_KEY);
    let transport = Arc::new(RoutingTransport {
        openai: Some(openai_ok("never")),
        gemini: Some(gemini_ok("A page about cats.")),
        ..Default::default()
    });
    let summarizer = engine(store, Arc::new(NoOnDeviceCapability), transport.clone());

    let tldr = summarizer.generate_digest("Title: Cats").await;

    assert_eq!(tldr, Ok("A page about cats.".to_string()));
    assert_eq!(transport.openai_calls(), 0);
    assert_eq!(transport.gemini_calls(), 1);
}

#[tokio::test]
async fn nothing_configured_yields_sentinel_and_credential_error() {
    let transport = Arc::new(RoutingTransport::default());
    let summarizer = engine(
        MemoryCredentialStore::new(),
        Arc::new(NoOnDeviceCapability),
        transport.clone(),
    );

    assert_eq!(summarizer.summarize_selection("text").await, SUMMARY_UNAVAILABLE);
    assert_eq!(
        summarizer.generate_digest("Title: x").await,
        Err(Visua11yError::NoValidCredential)
    );
    assert_eq!(
        summarizer.analyze_screenshot("data:image/png;base64,AAAA").await,
        Err(Visua11yError::NoValidCredential)
    );
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn screenshots_never_use_on_device() {
    let transport = Arc::new(RoutingTransport {
        openai: Some(openai_ok("Header, nav, main column.")),
        ..Default::default()
    });
    let capability = Arc::new(ReadyCapability::new());
    let summarizer = engine(both_keys(), capability.clone(), transport.clone());

    let analysis = summarizer
        .analyze_screenshot("data:image/png;base64,iVBORw0KGgo=")
        .await;

    assert_eq!(analysis, Ok("Header, nav, main column.".to_string()));
    assert_eq!(capability.created.load(Ordering::SeqCst), 0);
    let calls = transport.openai_calls.lock().unwrap();
    assert_eq!(calls[0].body["max_tokens"], 400);
}

#[tokio::test]
async fn malformed_data_url_is_sent_with_default_mime() {
    let store = MemoryCredentialStore::new().with("geminiApiKey", GEMINI_KEY);
    let transport = Arc::new(RoutingTransport {
        gemini: Some(gemini_ok("Blank image.")),
        ..Default::default()
    });
    let summarizer = engine(store, Arc::new(NoOnDeviceCapability), transport.clone());

    let analysis = summarizer.analyze_screenshot("not a data url").await;

    assert_eq!(analysis, Ok("Blank image.".to_string()));
    let calls = transport.gemini_calls.lock().unwrap();
    let inline = &calls[0].body["contents"][0]["parts"][1]["inline_data"];
    assert_eq!(inline["mime_type"], "image/png");
    assert_eq!(inline["data"], "");
}

#[tokio::test]
async fn long_selection_end_to_end() {
    let transport = Arc::new(RoutingTransport {
        openai: Some(openai_ok("Simple summary.")),
        gemini: Some(gemini_ok("unused")),
        ..Default::default()
    });
    let store = MemoryCredentialStore::new().with("openaiApiKey", OPENAI_KEY);
    let summarizer = engine(store, Arc::new(NoOnDeviceCapability), transport.clone());
    let input = "x".repeat(500);

    let outcome = summarizer.run(Operation::Summarize, &input).await;

    assert_eq!(
        outcome,
        OrchestrationResult::Success {
            text: "Simple summary.".into(),
            provider: Provider::OpenAi,
        }
    );
    assert_eq!(transport.gemini_calls(), 0);
    let calls = transport.openai_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].bearer_token.as_deref(), Some(OPENAI_KEY));
    assert_eq!(calls[0].body["max_tokens"], 1024);
}

#[tokio::test]
async fn rate_limit_then_failure_exhausts_with_last_error() {
    let transport = Arc::new(RoutingTransport {
        openai: Some(reply(
            429,
            "Too Many Requests",
            json!({ "error": { "message": "Rate limit reached" } }),
        )),
        gemini: Some(reply(
            500,
            "Internal Server Error",
            json!({ "error": { "message": "Backend unavailable" } }),
        )),
        ..Default::default()
    });
    let summarizer = engine(both_keys(), Arc::new(NoOnDeviceCapability), transport.clone());

    let outcome = summarizer.run(Operation::GenerateDigest, "Title: x").await;
    let OrchestrationResult::Exhausted { attempts } = &outcome else {
        panic!("expected exhaustion, got {outcome:?}");
    };
    let failures: Vec<_> = attempts
        .iter()
        .filter_map(|attempt| match &attempt.result {
            ProviderAttemptResult::Failure(kind, message) => Some((attempt.provider, *kind, message)),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].0, Provider::OpenAi);
    assert_eq!(failures[0].1, AttemptErrorKind::Http);
    assert!(failures[0].2.contains("429"));
    assert_eq!(failures[1].0, Provider::Gemini);

    let digest = summarizer.generate_digest("Title: x").await;
    assert_eq!(
        digest,
        Err(Visua11yError::ProviderFailed(
            "Gemini API error (500): Backend unavailable".into()
        ))
    );
    assert_eq!(transport.openai_calls(), 2);
    assert_eq!(transport.gemini_calls(), 2);
}

#[tokio::test]
async fn network_failure_falls_back() {
    let transport = Arc::new(RoutingTransport {
        openai: None,
        gemini: Some(gemini_ok("Recovered.")),
        ..Default::default()
    });
    let summarizer = engine(both_keys(), Arc::new(NoOnDeviceCapability), transport.clone());

    assert_eq!(
        summarizer.generate_digest("Title: x").await,
        Ok("Recovered.".to_string())
    );
    assert_eq!(transport.openai_calls(), 1);
}

#[tokio::test]
async fn message_contract_round_trip() {
    let transport = Arc::new(RoutingTransport {
        openai: Some(openai_ok("Short page.")),
        ..Default::default()
    });
    let summarizer = engine(both_keys(), Arc::new(NoOnDeviceCapability), transport.clone());
    let page = PageContent {
        title: "Cats".into(),
        url: "https://cats.test".into(),
        description: String::new(),
        text_content: "Cats are mammals.".into(),
    };

    let response = handle_message(
        &summarizer,
        &json!({ "action": "generateTLDR", "pageContent": page.format() }),
    )
    .await;
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({ "success": true, "tldr": "Short page." })
    );

    let response = handle_message(&summarizer, &json!({ "action": "analyzeScreenshot" })).await;
    assert_eq!(response.success, Some(false));
    assert_eq!(response.error.as_deref(), Some("No screenshot data provided"));

    let response =
        handle_message(&summarizer, &json!({ "action": "generateTLDR", "pageContent": "" })).await;
    assert_eq!(response.error.as_deref(), Some("No page content provided"));

    let response = handle_message(&summarizer, &json!({ "action": "translate" })).await;
    assert_eq!(response.error.as_deref(), Some("Unknown action: translate"));

    let response =
        handle_message(&summarizer, &json!({ "action": "summarize", "text": null })).await;
    assert_eq!(response.success, Some(false));
    assert_eq!(response.error.as_deref(), Some("No text provided"));

    let response =
        handle_message(&summarizer, &json!({ "action": "generateTLDR", "pageContent": 42 })).await;
    assert_eq!(response.error.as_deref(), Some("No page content provided"));

    let response =
        handle_message(&summarizer, &json!({ "action": "summarize", "text": "Hard words." })).await;
    assert_eq!(
        response.summary,
        Some(format!("{SUMMARY_PREFIX}Short page."))
    );
    assert_eq!(transport.gemini_calls(), 0);
}

#[tokio::test]
async fn crashing_on_device_generation_falls_back_to_cloud() {
    let transport = Arc::new(RoutingTransport {
        openai: Some(openai_ok("Plain words.")),
        gemini: Some(gemini_ok("unused")),
        ..Default::default()
    });
    let capability = Arc::new(CrashingCapability::new(false));
    let summarizer = engine(both_keys(), capability.clone(), transport.clone());

    let outcome = summarizer.run(Operation::Summarize, "Dense text.").await;
    assert_eq!(
        outcome,
        OrchestrationResult::Success {
            text: "Plain words.".into(),
            provider: Provider::OpenAi,
        }
    );
    assert_eq!(capability.created.load(Ordering::SeqCst), 1);
    assert_eq!(capability.destroyed.load(Ordering::SeqCst), 1);

    let summary = summarizer.summarize_selection("Dense text.").await;
    assert_eq!(summary, "🤖 AI Summary: Plain words.");
    assert_eq!(capability.destroyed.load(Ordering::SeqCst), 2);
    assert_eq!(transport.openai_calls(), 2);
    assert_eq!(transport.gemini_calls(), 0);
}

#[tokio::test]
async fn on_device_session_creation_failure_falls_back_to_cloud() {
    let transport = Arc::new(RoutingTransport {
        openai: Some(openai_ok("Plain words.")),
        ..Default::default()
    });
    let capability = Arc::new(CrashingCapability::new(true));
    let summarizer = engine(both_keys(), capability.clone(), transport.clone());

    let summary = summarizer.summarize_selection("Dense text.").await;

    assert_eq!(summary, "🤖 AI Summary: Plain words.");
    assert_eq!(capability.created.load(Ordering::SeqCst), 0);
    assert_eq!(capability.destroyed.load(Ordering::SeqCst), 0);
    assert_eq!(transport.openai_calls(), 1);
}

#[tokio::test]
async fn blank_digest_and_screenshot_inputs_are_rejected_without_calls() {
    let transport = Arc::new(RoutingTransport {
        openai: Some(openai_ok("unused")),
        ..Default::default()
    });
    let summarizer = engine(both_keys(), Arc::new(NoOnDeviceCapability), transport.clone());

    assert_eq!(
        summarizer.generate_digest(" \n\t ").await,
        Err(Visua11yError::MissingInput("page content"))
    );
    assert_eq!(
        summarizer.analyze_screenshot("").await,
        Err(Visua11yError::MissingInput("screenshot data"))
    );
    assert_eq!(transport.total_calls(), 0);
}
