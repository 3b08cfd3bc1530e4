//! quantcli
//!
//! Turns a natural-language question about one ticker's price history into a
//! deterministic metric, or into a structured refusal:
//! - An LLM only extracts a typed intent; it never computes anything
//! - Intents are decoded strictly and validated before any data is fetched
//! - Metrics are pure kernels over adjusted close prices
//! - Every failure surfaces as a refusal listing the supported capabilities
//!
//! PIPELINE:
//! QUERY → ROUTE → DECODE → VALIDATE → FETCH → COMPUTE → RESULT | REFUSAL

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod router;
pub mod tools;
pub mod validation;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use orchestrator::Orchestrator;
pub use validation::validate_intent;
