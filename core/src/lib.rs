//! Core library for the Visua11y accessibility engine.
//!
//! Three operations (selection summary, page digest, screenshot analysis)
//! are served by whichever provider answers first in a fixed order:
//! - [`agents`] holds providers, credentials, payload codecs and transports.
//! - [`fallback`] walks the providers for one call.
//! - [`summarizer`] shapes orchestration outcomes for callers.
//! - [`api`] exposes the `action`-tagged message contract.
//! - [`db`] initialises the SQLite workspace and applies migrations.
//! - [`errors`] keeps the error catalogue with human friendly metadata.
//! - [`logging`] emits structured diagnostics through `log`.

pub mod agents;
pub mod api;
pub mod db;
pub mod errors;
pub mod fallback;
pub mod logging;
pub mod summarizer;

pub use errors::Visua11yError;
pub use fallback::{FallbackOrchestrator, OrchestrationResult};
pub use summarizer::Summarizer;
