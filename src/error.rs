//! Error types for the quantcli pipeline

use crate::models::ToolName;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for plumbing operations (I/O, HTTP, serialization)
pub type Result<T> = std::result::Result<T, QuantError>;

#[derive(Error, Debug)]
pub enum QuantError {

    // =============================
    // Pipeline Errors
    // =============================

    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),

    #[error("Price provider error: {0}")]
    PriceProvider(#[from] PriceProviderError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Why a window parameter was rejected by a window-based kernel
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowIssue {
    #[error("missing")]
    Missing,

    #[error("must be >= 2, got {0}")]
    TooSmall(u32),
}

/// Kernel contract violations. Never downgraded to a sentinel value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("invalid price input: {0}")]
    InvalidInput(String),

    #[error("parameter `{param}` is not supported by {tool}")]
    UnsupportedParam { tool: ToolName, param: &'static str },

    #[error("at least {required} price points required, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("invalid window: {0}")]
    InvalidWindow(WindowIssue),

    #[error("invalid parameter `{param}`: {detail}")]
    InvalidParam { param: &'static str, detail: String },

    #[error("computed {0} is not finite")]
    NonFiniteResult(&'static str),
}

/// Internal decode codes. Stable identifiers; never shown to the user verbatim.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeError {
    #[error("LLM_OUTPUT_EMPTY")]
    OutputEmpty,
    #[error("LLM_OUTPUT_NOT_JSON")]
    OutputNotJson,
    #[error("LLM_OUTPUT_NOT_OBJECT")]
    OutputNotObject,
    #[error("LLM_WRAPPER_INVALID_TYPE")]
    WrapperInvalidType,
    #[error("LLM_WRAPPER_INVALID_KEYS")]
    WrapperInvalidKeys,
    #[error("LLM_INTENT_NOT_OBJECT")]
    IntentNotObject,
    #[error("LLM_INTENT_SCHEMA_INVALID")]
    IntentSchemaInvalid,
    #[error("LLM_REFUSAL_NOT_OBJECT")]
    RefusalNotObject,
    #[error("LLM_REFUSAL_SCHEMA_INVALID")]
    RefusalSchemaInvalid,
}

impl DecodeError {
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::OutputEmpty => "LLM_OUTPUT_EMPTY",
            DecodeError::OutputNotJson => "LLM_OUTPUT_NOT_JSON",
            DecodeError::OutputNotObject => "LLM_OUTPUT_NOT_OBJECT",
            DecodeError::WrapperInvalidType => "LLM_WRAPPER_INVALID_TYPE",
            DecodeError::WrapperInvalidKeys => "LLM_WRAPPER_INVALID_KEYS",
            DecodeError::IntentNotObject => "LLM_INTENT_NOT_OBJECT",
            DecodeError::IntentSchemaInvalid => "LLM_INTENT_SCHEMA_INVALID",
            DecodeError::RefusalNotObject => "LLM_REFUSAL_NOT_OBJECT",
            DecodeError::RefusalSchemaInvalid => "LLM_REFUSAL_SCHEMA_INVALID",
        }
    }
}

/// Single failure kind for price providers. The message is for logs only.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct PriceProviderError(pub String);

impl PriceProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelErrorKind {
    Auth,
    RateLimited,
    Unavailable,
}

impl ModelErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelErrorKind::Auth => "auth",
            ModelErrorKind::RateLimited => "rate_limited",
            ModelErrorKind::Unavailable => "unavailable",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("model error ({}): {message}", kind.as_str())]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Unavailable, message)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("LLM authentication failed.")]
    MissingApiKey,

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}
