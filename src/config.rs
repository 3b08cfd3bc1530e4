//! Environment-driven configuration for the live model client

use crate::error::ConfigError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const MODEL_VAR: &str = "QUANTCLI_ANTHROPIC_MODEL";
pub const MAX_TOKENS_VAR: &str = "QUANTCLI_LLM_MAX_TOKENS";
pub const TIMEOUT_VAR: &str = "QUANTCLI_LLM_TIMEOUT_SECS";
pub const PREFILL_VAR: &str = "QUANTCLI_LLM_PREFILL";

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5";
pub const DEFAULT_MAX_TOKENS: u32 = 256;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    /// Send a trailing assistant `{` turn.
    pub prefill: bool,
}

impl LlmConfig {
    /// Read from the process environment (call `dotenv` first if wanted).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = non_empty(lookup(API_KEY_VAR)).ok_or(ConfigError::MissingApiKey)?;

        let model = non_empty(lookup(MODEL_VAR)).unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens: u32 = parse_or(&lookup, MAX_TOKENS_VAR, DEFAULT_MAX_TOKENS)?;
        if max_tokens < 1 {
            return Err(ConfigError::InvalidValue {
                var: MAX_TOKENS_VAR,
                value: max_tokens.to_string(),
            });
        }

        let timeout_secs: u64 = parse_or(&lookup, TIMEOUT_VAR, DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: TIMEOUT_VAR,
                value: timeout_secs.to_string(),
            });
        }

        let prefill = non_empty(lookup(PREFILL_VAR)).as_deref() == Some("1");

        Ok(Self {
            api_key,
            model,
            max_tokens,
            timeout: Duration::from_secs(timeout_secs),
            prefill,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup(var)) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}
