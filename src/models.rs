//! Core data models for the intent pipeline

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound for `n_days` and `window` (roughly twenty years of sessions).
pub const MAX_TRADING_DAYS: u32 = 5000;

pub const DEFAULT_ANNUALIZATION_FACTOR: u32 = 252;

/// Version tag reported in result metadata.
pub const TOOL_VERSION: &str = "1.0.0";

//
// ================= Tools =================
//

/// Closed set of supported metric computations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    MaxDrawdown,
    RealizedVolatility,
    SharpeRatio,
    TotalReturn,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::MaxDrawdown,
        ToolName::RealizedVolatility,
        ToolName::SharpeRatio,
        ToolName::TotalReturn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::MaxDrawdown => "max_drawdown",
            ToolName::RealizedVolatility => "realized_volatility",
            ToolName::SharpeRatio => "sharpe_ratio",
            ToolName::TotalReturn => "total_return",
        }
    }

    /// Tools that need a trailing `window` of returns.
    pub fn is_window_based(&self) -> bool {
        matches!(self, ToolName::RealizedVolatility | ToolName::SharpeRatio)
    }

    /// Whether `annualization_factor` is meaningful (and reported) for this tool.
    pub fn is_annualized(&self) -> bool {
        self.is_window_based()
    }

    /// Human label used in refusal wording.
    pub fn label(&self) -> &'static str {
        match self {
            ToolName::MaxDrawdown => "Max drawdown",
            ToolName::RealizedVolatility => "Realized volatility",
            ToolName::SharpeRatio => "Sharpe ratio",
            ToolName::TotalReturn => "Total return",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Intent =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TimeRange {
    /// Most recent N trading days, oldest to newest downstream.
    #[serde(deserialize_with = "integral")]
    pub n_days: u32,
}

impl TimeRange {
    pub fn new(n_days: u32) -> Self {
        Self { n_days }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Params {
    /// Number of return observations used by window-based tools.
    #[serde(deserialize_with = "optional_integral")]
    pub window: Option<u32>,

    #[serde(deserialize_with = "integral")]
    pub annualization_factor: u32,

    /// Annualized continuously-compounded rate, as a decimal (0.01 = 1%).
    pub risk_free_rate: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            window: None,
            annualization_factor: DEFAULT_ANNUALIZATION_FACTOR,
            risk_free_rate: 0.0,
        }
    }
}

impl Params {
    pub fn with_window(window: u32) -> Self {
        Self {
            window: Some(window),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Intent {
    pub tool: ToolName,
    pub tickers: Vec<String>,
    pub time_range: TimeRange,
    #[serde(default)]
    pub params: Params,
}

impl Intent {
    pub fn new(tool: ToolName, tickers: Vec<String>, n_days: u32, params: Params) -> Self {
        Self {
            tool,
            tickers,
            time_range: TimeRange::new(n_days),
            params,
        }
    }

    /// Field-level constraints that serde cannot express.
    pub fn check_schema(&self) -> std::result::Result<(), String> {
        if self.tickers.is_empty() {
            return Err("tickers must contain at least one symbol".to_string());
        }

        let n_days = self.time_range.n_days;
        if n_days == 0 || n_days > MAX_TRADING_DAYS {
            return Err(format!(
                "time_range.n_days must be in 1..={}, got {}",
                MAX_TRADING_DAYS, n_days
            ));
        }

        if let Some(window) = self.params.window {
            if window == 0 || window > MAX_TRADING_DAYS {
                return Err(format!(
                    "params.window must be in 1..={}, got {}",
                    MAX_TRADING_DAYS, window
                ));
            }
        }

        if self.params.annualization_factor == 0 {
            return Err("params.annualization_factor must be > 0".to_string());
        }

        if !self.params.risk_free_rate.is_finite() {
            return Err("params.risk_free_rate must be finite".to_string());
        }

        Ok(())
    }
}

/// Refusal produced by the model itself (`{"type":"refusal", ...}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ModelRefusal {
    pub reason: String,
}

//
// ================= Terminal outputs =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Refusal {
    pub reason: String,
    pub clarifying_question: Option<String>,
    pub allowed_capabilities: Vec<ToolName>,
}

impl Refusal {
    /// Build a refusal that advertises the full supported capability set.
    pub fn new(reason: impl Into<String>, clarifying_question: Option<String>) -> Self {
        Self {
            reason: reason.into(),
            clarifying_question,
            allowed_capabilities: crate::tools::supported_tools(),
        }
    }

    pub fn reason_only(reason: impl Into<String>) -> Self {
        Self::new(reason, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMetadata {
    pub range_n_days: u32,
    pub window: Option<u32>,
    pub annualization_factor: Option<u32>,
    pub data_points: usize,
    pub price_source: String,
    pub tool_version: String,
    pub interpretation_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricResult {
    pub tool: ToolName,
    pub tickers: Vec<String>,
    pub value: f64,
    pub metadata: ResultMetadata,
}

/// Exactly one of a result or a refusal; serialized as the bare inner document.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Outcome {
    Success(MetricResult),
    Refused(Refusal),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn refusal(&self) -> Option<&Refusal> {
        match self {
            Outcome::Refused(refusal) => Some(refusal),
            Outcome::Success(_) => None,
        }
    }

    pub fn result(&self) -> Option<&MetricResult> {
        match self {
            Outcome::Success(result) => Some(result),
            Outcome::Refused(_) => None,
        }
    }
}

impl From<Refusal> for Outcome {
    fn from(refusal: Refusal) -> Self {
        Outcome::Refused(refusal)
    }
}

//
// ================= Wire integers =================
//

/// Accepts JSON integers and integral floats (`252.0`); rejects anything else.
fn integral<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    number_to_u32(&number)
        .ok_or_else(|| de::Error::custom(format!("expected a non-negative integer, got {}", number)))
}

fn optional_integral<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Number>::deserialize(deserializer)? {
        None => Ok(None),
        Some(number) => number_to_u32(&number).map(Some).ok_or_else(|| {
            de::Error::custom(format!("expected a non-negative integer, got {}", number))
        }),
    }
}

fn number_to_u32(number: &serde_json::Number) -> Option<u32> {
    if let Some(value) = number.as_u64() {
        return u32::try_from(value).ok();
    }
    if number.is_i64() {
        return None;
    }
    let value = number.as_f64()?;
    if value.fract() == 0.0 && value >= 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}
