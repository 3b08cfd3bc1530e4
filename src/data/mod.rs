//! Price data providers
//!
//! A provider returns adjusted close prices for one ticker, oldest first.
//! Any failure is a single `PriceProviderError`; the orchestrator never
//! inspects its message beyond logging it.

pub mod yahoo;

pub use yahoo::YahooPriceProvider;

use crate::error::PriceProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Adjusted close prices for one ticker, oldest to newest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSeries {
    pub ticker: String,
    pub prices: Vec<f64>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, prices: Vec<f64>) -> Self {
        Self {
            ticker: ticker.into(),
            prices,
        }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.prices
    }
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Reported as `price_source` in result metadata.
    fn name(&self) -> &str;

    /// Most recent `n_days` trading-day adjusted closes for `ticker`.
    async fn get_adjusted_close(
        &self,
        ticker: &str,
        n_days: u32,
    ) -> Result<PriceSeries, PriceProviderError>;
}

//
// ================= Fake provider =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixture {
    /// 100, 101, 102, ...
    MonotonicUp,
    /// Linear 100 → 120 up to index n/2, then linear down to 80.
    Drawdown,
    /// Always [100, 101], whatever was asked.
    Short2,
    /// All zeros.
    InvalidNonPositive,
}

/// Deterministic in-process provider with an injectable failure.
pub struct FakePriceProvider {
    fixture: Fixture,
    fail: bool,
    calls: AtomicUsize,
}

impl FakePriceProvider {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fixture: Fixture::MonotonicUp,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn generate(&self, n_days: usize) -> Vec<f64> {
        match self.fixture {
            Fixture::MonotonicUp => (0..n_days).map(|i| 100.0 + i as f64).collect(),
            Fixture::Drawdown => drawdown_series(n_days),
            Fixture::Short2 => vec![100.0, 101.0],
            Fixture::InvalidNonPositive => vec![0.0; n_days],
        }
    }
}

impl Default for FakePriceProvider {
    fn default() -> Self {
        Self::new(Fixture::MonotonicUp)
    }
}

fn drawdown_series(n_days: usize) -> Vec<f64> {
    const START: f64 = 100.0;
    const PEAK: f64 = 120.0;
    const TROUGH: f64 = 80.0;

    match n_days {
        0 => Vec::new(),
        1 => vec![START],
        n => {
            let peak_idx = n / 2;
            (0..n)
                .map(|i| {
                    if i <= peak_idx {
                        START + (PEAK - START) * (i as f64 / peak_idx as f64)
                    } else {
                        let span = (n - 1 - peak_idx) as f64;
                        PEAK + (TROUGH - PEAK) * ((i - peak_idx) as f64 / span)
                    }
                })
                .collect()
        }
    }
}

#[async_trait]
impl PriceProvider for FakePriceProvider {
    fn name(&self) -> &str {
        "FakePriceProvider"
    }

    async fn get_adjusted_close(
        &self,
        ticker: &str,
        n_days: u32,
    ) -> Result<PriceSeries, PriceProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PriceProviderError::new("Injected provider failure for testing."));
        }
        Ok(PriceSeries::new(ticker, self.generate(n_days as usize)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_monotonic_up() {
        let provider = FakePriceProvider::new(Fixture::MonotonicUp);
        let series = assert_ok!(provider.get_adjusted_close("AAPL", 4).await);
        assert_eq!(series.ticker, "AAPL");
        assert_eq!(series.prices, vec![100.0, 101.0, 102.0, 103.0]);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_drawdown_fixture_shape() {
        let provider = FakePriceProvider::new(Fixture::Drawdown);
        let prices = provider.get_adjusted_close("SPY", 10).await.unwrap().prices;

        assert_eq!(prices.len(), 10);
        assert_eq!(prices[0], 100.0);
        assert_eq!(prices[5], 120.0);
        assert_eq!(prices[9], 80.0);
        assert!(prices[..=5].windows(2).all(|w| w[1] > w[0]));
        assert!(prices[5..].windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_drawdown_small_sizes() {
        assert!(drawdown_series(0).is_empty());
        assert_eq!(drawdown_series(1), vec![100.0]);
        assert_eq!(drawdown_series(2), vec![100.0, 120.0]);
        assert_eq!(drawdown_series(3), vec![100.0, 120.0, 80.0]);
    }

    #[tokio::test]
    async fn test_fixed_and_invalid_fixtures() {
        let short = FakePriceProvider::new(Fixture::Short2);
        assert_eq!(short.get_adjusted_close("X", 30).await.unwrap().prices, vec![100.0, 101.0]);

        let zeros = FakePriceProvider::new(Fixture::InvalidNonPositive);
        assert_eq!(zeros.get_adjusted_close("X", 3).await.unwrap().prices, vec![0.0; 3]);
    }

    #[tokio::test]
    async fn test_injected_failure_counts_call() {
        let provider = FakePriceProvider::failing();
        assert_err!(provider.get_adjusted_close("AAPL", 5).await);
        assert_eq!(provider.calls(), 1);
        assert_eq!(provider.name(), "FakePriceProvider");
    }
}
