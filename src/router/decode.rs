//! Strict decoding of raw model text into an intent or a model refusal.

use crate::error::DecodeError;
use crate::models::{Intent, ModelRefusal};
use serde_json::{Map, Value};

/// Structurally valid model output.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Intent(Intent),
    Refusal(ModelRefusal),
}

/// Decode model output. Checks short-circuit in a fixed order, so the first
/// structural problem found determines the error.
pub fn decode_model_output(raw: &str) -> Result<Decoded, DecodeError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(DecodeError::OutputEmpty);
    }

    let value: Value = serde_json::from_str(text).map_err(|_| DecodeError::OutputNotJson)?;
    let wrapper = match value {
        Value::Object(map) => map,
        _ => return Err(DecodeError::OutputNotObject),
    };

    let payload_key = match wrapper.get("type").and_then(Value::as_str) {
        Some("intent") => "intent",
        Some("refusal") => "refusal",
        _ => return Err(DecodeError::WrapperInvalidType),
    };

    if !has_exact_keys(&wrapper, payload_key) {
        return Err(DecodeError::WrapperInvalidKeys);
    }

    let payload = wrapper
        .get(payload_key)
        .cloned()
        .unwrap_or(Value::Null);

    if payload_key == "intent" {
        decode_intent(payload).map(Decoded::Intent)
    } else {
        decode_refusal(payload).map(Decoded::Refusal)
    }
}

fn has_exact_keys(wrapper: &Map<String, Value>, payload_key: &str) -> bool {
    wrapper.len() == 2 && wrapper.contains_key("type") && wrapper.contains_key(payload_key)
}

fn decode_intent(payload: Value) -> Result<Intent, DecodeError> {
    if !payload.is_object() {
        return Err(DecodeError::IntentNotObject);
    }

    let intent: Intent =
        serde_json::from_value(payload).map_err(|_| DecodeError::IntentSchemaInvalid)?;
    intent
        .check_schema()
        .map_err(|_| DecodeError::IntentSchemaInvalid)?;
    Ok(intent)
}

fn decode_refusal(payload: Value) -> Result<ModelRefusal, DecodeError> {
    if !payload.is_object() {
        return Err(DecodeError::RefusalNotObject);
    }

    serde_json::from_value(payload).map_err(|_| DecodeError::RefusalSchemaInvalid)
}
