//! Router: natural-language query → structurally valid intent or refusal
//!
//! Exactly one model call per non-empty query. Internal failure detail (model
//! error kind, decode code) goes to the logs; the user only ever sees the
//! stable messages below.

pub mod decode;
pub mod prompt;

pub use decode::{decode_model_output, Decoded};
pub use prompt::build_messages;

use crate::error::DecodeError;
use crate::llm::ModelClient;
use crate::models::{Intent, Refusal};
use crate::observability::{CorrelationId, DebugLog};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

pub const EMPTY_QUERY_REASON: &str = "USER_QUERY_EMPTY";
pub const MODEL_UNAVAILABLE_REASON: &str = "Unable to process this request right now.";
pub const UNPARSEABLE_OUTPUT_REASON: &str =
    "Model output could not be parsed. Please try running the command again or rephrasing your request.";

static DECODE_REASONS: OnceLock<HashMap<DecodeError, &'static str>> = OnceLock::new();

/// User-facing text for each decode code.
fn decode_reasons() -> &'static HashMap<DecodeError, &'static str> {
    DECODE_REASONS.get_or_init(|| {
        [
            DecodeError::OutputEmpty,
            DecodeError::OutputNotJson,
            DecodeError::OutputNotObject,
            DecodeError::WrapperInvalidType,
            DecodeError::WrapperInvalidKeys,
            DecodeError::IntentNotObject,
            DecodeError::IntentSchemaInvalid,
            DecodeError::RefusalNotObject,
            DecodeError::RefusalSchemaInvalid,
        ]
        .into_iter()
        .map(|code| (code, UNPARSEABLE_OUTPUT_REASON))
        .collect()
    })
}

/// Refusal for a decode failure; unmapped codes surface as the code itself.
pub fn refusal_for_decode_error(error: DecodeError) -> Refusal {
    let reason = decode_reasons()
        .get(&error)
        .copied()
        .unwrap_or_else(|| error.code());
    Refusal::reason_only(reason)
}

pub struct Router {
    model: Arc<dyn ModelClient>,
    debug: DebugLog,
    prefill: bool,
}

impl Router {
    pub fn new(model: Arc<dyn ModelClient>, debug: DebugLog) -> Self {
        Self {
            model,
            debug,
            prefill: false,
        }
    }

    pub fn with_prefill(mut self, prefill: bool) -> Self {
        self.prefill = prefill;
        self
    }

    /// Route a query. The returned intent is structurally valid but not yet
    /// semantically validated.
    pub async fn route(&self, user_text: &str, cid: &CorrelationId) -> Result<Intent, Refusal> {
        let text = user_text.trim();
        if text.is_empty() {
            info!(cid = %cid, "Empty query refused before model call");
            return Err(Refusal::reason_only(EMPTY_QUERY_REASON));
        }

        let messages = build_messages(text, self.prefill);

        let raw = match self.model.complete(&messages).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(cid = %cid, kind = e.kind.as_str(), error = %e.message, "Model call failed");
                self.debug.event("llm_error", cid, json!({ "kind": e.kind }));
                return Err(Refusal::reason_only(MODEL_UNAVAILABLE_REASON));
            }
        };

        match decode_model_output(&raw) {
            Ok(Decoded::Intent(intent)) => {
                info!(cid = %cid, tool = %intent.tool, "Model produced intent");
                Ok(intent)
            }
            Ok(Decoded::Refusal(refusal)) => {
                info!(cid = %cid, "Model refused query");
                Err(Refusal::reason_only(refusal.reason))
            }
            Err(code) => {
                warn!(cid = %cid, code = code.code(), output_len = raw.len(), "Model output rejected");
                self.debug.event(
                    "decode_error",
                    cid,
                    json!({ "code": code.code(), "output_len": raw.len() }),
                );
                Err(refusal_for_decode_error(code))
            }
        }
    }
}
