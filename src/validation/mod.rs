//! Semantic validation of decoded intents
//!
//! Rules-based gate between routing and execution. Rules run in a fixed order
//! and the first failing rule produces the refusal. No I/O happens here.

use crate::models::{Intent, Refusal, ToolName};
use tracing::{debug, info};

/// Trait for intent validation rules
pub trait IntentRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the intent passes this rule.
    fn check(&self, intent: &Intent) -> Option<Refusal>;
}

/// Validator that applies rules in registration order
pub struct IntentValidator {
    rules: Vec<Box<dyn IntentRule>>,
}

impl IntentValidator {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn IntentRule>) {
        self.rules.push(rule);
    }

    pub fn validate(&self, intent: Intent) -> Result<Intent, Refusal> {
        for rule in &self.rules {
            if let Some(refusal) = rule.check(&intent) {
                info!(
                    rule = rule.name(),
                    tool = %intent.tool,
                    "Intent rejected by validation rule"
                );
                return Err(refusal);
            }
            debug!(rule = rule.name(), "Validation rule passed");
        }

        Ok(intent)
    }
}

impl Default for IntentValidator {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Rules =================
//

/// Single-asset metrics only.
pub struct SingleTickerRule;

impl IntentRule for SingleTickerRule {
    fn name(&self) -> &'static str {
        "single_ticker"
    }

    fn check(&self, intent: &Intent) -> Option<Refusal> {
        if intent.tickers.len() == 1 {
            return None;
        }
        Some(Refusal::new(
            "Only single-asset metrics currently supported.",
            Some("Provide exactly one ticker symbol.".to_string()),
        ))
    }
}

/// A return needs two prices.
pub struct MinimumRangeRule;

impl IntentRule for MinimumRangeRule {
    fn name(&self) -> &'static str {
        "minimum_range"
    }

    fn check(&self, intent: &Intent) -> Option<Refusal> {
        if intent.time_range.n_days >= 2 {
            return None;
        }
        Some(Refusal::new(
            "Time range must include at least 2 trading days.",
            Some("Provide time range with at least 2 trading days.".to_string()),
        ))
    }
}

/// Window must be present, and shorter than the range, for one window-based tool.
pub struct WindowRule {
    tool: ToolName,
}

impl WindowRule {
    pub fn new(tool: ToolName) -> Self {
        Self { tool }
    }

    fn noun(&self) -> &'static str {
        match self.tool {
            ToolName::SharpeRatio => "Sharpe ratio",
            ToolName::RealizedVolatility => "realized volatility",
            ToolName::MaxDrawdown => "max drawdown",
            ToolName::TotalReturn => "total return",
        }
    }
}

impl IntentRule for WindowRule {
    fn name(&self) -> &'static str {
        match self.tool {
            ToolName::SharpeRatio => "sharpe_ratio_window",
            ToolName::RealizedVolatility => "realized_volatility_window",
            ToolName::MaxDrawdown => "max_drawdown_window",
            ToolName::TotalReturn => "total_return_window",
        }
    }

    fn check(&self, intent: &Intent) -> Option<Refusal> {
        if intent.tool != self.tool {
            return None;
        }

        let n_days = intent.time_range.n_days;
        match intent.params.window {
            None => Some(Refusal::new(
                format!("{} requires a window parameter.", self.tool.label()),
                Some(format!("Provide window parameter for {}.", self.noun())),
            )),
            Some(window) if window >= n_days => Some(Refusal::new(
                "Window parameter must be less than the number of trading days in the time range.",
                Some(format!("Provide a window parameter less than {}.", n_days)),
            )),
            Some(_) => None,
        }
    }
}

/// Window is meaningless for non-window tools.
pub struct WindowNotApplicableRule;

impl IntentRule for WindowNotApplicableRule {
    fn name(&self) -> &'static str {
        "window_not_applicable"
    }

    fn check(&self, intent: &Intent) -> Option<Refusal> {
        if intent.tool.is_window_based() || intent.params.window.is_none() {
            return None;
        }
        Some(Refusal::new(
            format!("Window parameter is not applicable for {}.", intent.tool),
            Some(format!("Remove window parameter for {}.", intent.tool)),
        ))
    }
}

/// Only the Sharpe ratio consumes a risk-free rate.
pub struct RiskFreeRateRule;

impl IntentRule for RiskFreeRateRule {
    fn name(&self) -> &'static str {
        "risk_free_rate_not_applicable"
    }

    fn check(&self, intent: &Intent) -> Option<Refusal> {
        if intent.tool == ToolName::SharpeRatio || intent.params.risk_free_rate == 0.0 {
            return None;
        }
        Some(Refusal::new(
            format!("risk_free_rate parameter is not applicable for {}.", intent.tool),
            Some(format!("Remove risk_free_rate parameter for {}.", intent.tool)),
        ))
    }
}

/// Create a validator with the standard rule order
pub fn create_default_validator() -> IntentValidator {
    let mut validator = IntentValidator::new();
    validator.add_rule(Box::new(SingleTickerRule));
    validator.add_rule(Box::new(MinimumRangeRule));
    validator.add_rule(Box::new(WindowRule::new(ToolName::RealizedVolatility)));
    validator.add_rule(Box::new(WindowRule::new(ToolName::SharpeRatio)));
    validator.add_rule(Box::new(WindowNotApplicableRule));
    validator.add_rule(Box::new(RiskFreeRateRule));
    validator
}

/// Validate with the default rule set.
pub fn validate_intent(intent: Intent) -> Result<Intent, Refusal> {
    create_default_validator().validate(intent)
}

//
// ================= Tests =================
//
