//! Metric kernels: pure functions from a price series to a scalar.
//!
//! Every kernel enforces the shared price contract (all values finite) before
//! computing, and reports every precondition violation as a `MetricError`.
//! Kernels never return a sentinel value for input they cannot handle.

use crate::error::{MetricError, WindowIssue};
use crate::models::{Params, ToolName};

/// Sample standard deviations at or below this are treated as zero.
const ZERO_VARIANCE_TOLERANCE: f64 = 1e-15;

/// Signature shared by all kernels.
pub type MetricFn = fn(&[f64], &Params) -> Result<f64, MetricError>;

/// Total return as a fraction: 0.1 is a 10% gain.
pub fn total_return(prices: &[f64], params: &Params) -> Result<f64, MetricError> {
    check_finite(prices)?;
    reject_window(ToolName::TotalReturn, params)?;
    require_len(prices, 2)?;
    require_positive(prices)?;

    let first = prices[0];
    let last = prices[prices.len() - 1];
    Ok((last - first) / first)
}

/// Maximum peak-to-trough drawdown, in [0, 1].
pub fn max_drawdown(prices: &[f64], params: &Params) -> Result<f64, MetricError> {
    check_finite(prices)?;
    reject_window(ToolName::MaxDrawdown, params)?;
    require_len(prices, 2)?;
    require_positive(prices)?;

    let mut running_max = prices[0];
    let mut worst = 0.0_f64;
    for &price in prices {
        running_max = running_max.max(price);
        let drawdown = (running_max - price) / running_max;
        if drawdown > worst {
            worst = drawdown;
        }
    }
    Ok(worst)
}

/// Annualized realized volatility: sample std (ddof=1) of the last `window`
/// log returns, scaled by sqrt(annualization_factor).
pub fn realized_volatility(prices: &[f64], params: &Params) -> Result<f64, MetricError> {
    check_finite(prices)?;
    let window = require_window(params)?;
    require_positive(prices)?;
    require_len(prices, window + 1)?;

    let returns = trailing_log_returns(prices, window);
    let vol = sample_std(&returns);
    if !vol.is_finite() {
        return Err(MetricError::NonFiniteResult("volatility"));
    }

    Ok(vol * f64::from(params.annualization_factor).sqrt())
}

/// Annualized Sharpe ratio of trailing excess log returns.
///
/// `risk_free_rate` is annual and continuously compounded; it is converted to
/// a per-period rate by dividing by `annualization_factor`.
pub fn sharpe_ratio(prices: &[f64], params: &Params) -> Result<f64, MetricError> {
    check_finite(prices)?;
    let window = require_window(params)?;

    if params.annualization_factor == 0 {
        return Err(MetricError::InvalidParam {
            param: "annualization_factor",
            detail: "must be > 0".to_string(),
        });
    }
    if !params.risk_free_rate.is_finite() {
        return Err(MetricError::InvalidParam {
            param: "risk_free_rate",
            detail: format!("must be finite, got {}", params.risk_free_rate),
        });
    }

    require_positive(prices)?;
    require_len(prices, window + 1)?;

    let annualization = f64::from(params.annualization_factor);
    let rf_per_period = params.risk_free_rate / annualization;

    let excess: Vec<f64> = trailing_log_returns(prices, window)
        .into_iter()
        .map(|r| r - rf_per_period)
        .collect();

    let std = sample_std(&excess);
    if !(std > ZERO_VARIANCE_TOLERANCE) {
        return Err(MetricError::InvalidInput(
            "excess returns have zero variance; Sharpe ratio is undefined".to_string(),
        ));
    }

    let sharpe = (mean(&excess) / std) * annualization.sqrt();
    if !sharpe.is_finite() {
        return Err(MetricError::NonFiniteResult("sharpe ratio"));
    }
    Ok(sharpe)
}

// ─── Preconditions ──────────────────────────────────────────────────

fn check_finite(prices: &[f64]) -> Result<(), MetricError> {
    match prices.iter().position(|p| !p.is_finite()) {
        Some(idx) => Err(MetricError::InvalidInput(format!(
            "price at index {} is not finite",
            idx
        ))),
        None => Ok(()),
    }
}

fn require_positive(prices: &[f64]) -> Result<(), MetricError> {
    match prices.iter().position(|&p| p <= 0.0) {
        Some(idx) => Err(MetricError::InvalidInput(format!(
            "price at index {} is not strictly positive",
            idx
        ))),
        None => Ok(()),
    }
}

fn require_len(prices: &[f64], required: usize) -> Result<(), MetricError> {
    if prices.len() < required {
        return Err(MetricError::InsufficientData {
            required,
            available: prices.len(),
        });
    }
    Ok(())
}

fn reject_window(tool: ToolName, params: &Params) -> Result<(), MetricError> {
    if params.window.is_some() {
        return Err(MetricError::UnsupportedParam {
            tool,
            param: "window",
        });
    }
    Ok(())
}

/// ddof=1 needs at least two observations, hence window >= 2.
fn require_window(params: &Params) -> Result<usize, MetricError> {
    match params.window {
        None => Err(MetricError::InvalidWindow(WindowIssue::Missing)),
        Some(w) if w < 2 => Err(MetricError::InvalidWindow(WindowIssue::TooSmall(w))),
        Some(w) => Ok(w as usize),
    }
}

// ─── Statistics ─────────────────────────────────────────────────────

/// Log returns of the whole series, last `window` kept. Caller guarantees
/// `prices.len() > window`.
fn trailing_log_returns(prices: &[f64], window: usize) -> Vec<f64> {
    let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    returns[returns.len() - window..].to_vec()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}
