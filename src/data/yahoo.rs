//! Yahoo Finance price provider.
//!
//! Fetches daily adjusted closes from Yahoo's v8 chart API. Yahoo has no
//! official API and may change format without notice; every surprise is
//! reported as a `PriceProviderError`.

use super::{PriceProvider, PriceSeries};
use crate::error::PriceProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as CalendarSpan, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Lower bound on NYSE sessions per calendar year (weekends and holidays removed).
const SESSIONS_PER_YEAR: i64 = 250;
const SLACK_DAYS: i64 = 14;

/// Calendar days that contain at least `n_days` trading sessions.
fn calendar_days(n_days: u32) -> i64 {
    i64::from(n_days) * 365 / SESSIONS_PER_YEAR + SLACK_DAYS
}

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

pub struct YahooPriceProvider {
    client: Client,
}

impl YahooPriceProvider {
    pub fn new() -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Calendar window wide enough to contain `n_days` trading sessions.
    fn chart_url(symbol: &str, n_days: u32, now: DateTime<Utc>) -> String {
        let start = now - CalendarSpan::days(calendar_days(n_days));
        format!(
            "{CHART_URL}/{symbol}?period1={}&period2={}&interval=1d&includeAdjustedClose=true",
            start.timestamp(),
            now.timestamp()
        )
    }
}

#[async_trait]
impl PriceProvider for YahooPriceProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    async fn get_adjusted_close(
        &self,
        ticker: &str,
        n_days: u32,
    ) -> Result<PriceSeries, PriceProviderError> {
        check_symbol(ticker)?;

        let url = Self::chart_url(ticker, n_days, Utc::now());
        info!(ticker = ticker, n_days = n_days, "Fetching prices from Yahoo Finance");

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(error = %e, "Yahoo Finance request failed");
            PriceProviderError::new(format!("request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceProviderError::new(format!(
                "Yahoo Finance returned HTTP {}",
                status.as_u16()
            )));
        }

        let chart: ChartResponse = response
            .json()
            .await
            .map_err(|e| PriceProviderError::new(format!("invalid chart response: {}", e)))?;

        let prices = parse_closes(chart, n_days as usize)?;
        debug!(ticker = ticker, points = prices.len(), "Yahoo Finance prices parsed");

        Ok(PriceSeries::new(ticker, prices))
    }
}

/// Keeps the symbol safe to place in a URL path.
fn check_symbol(ticker: &str) -> Result<(), PriceProviderError> {
    let valid = !ticker.is_empty()
        && ticker.len() <= 16
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if valid {
        Ok(())
    } else {
        Err(PriceProviderError::new(format!("invalid ticker symbol: {:?}", ticker)))
    }
}

/// Adjusted closes (falling back to closes), nulls dropped, most recent
/// `n_days` kept.
fn parse_closes(resp: ChartResponse, n_days: usize) -> Result<Vec<f64>, PriceProviderError> {
    let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) => PriceProviderError::new(format!("{}: {}", err.code, err.description)),
        None => PriceProviderError::new("empty result with no error"),
    })?;

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| PriceProviderError::new("result array is empty"))?;

    let adjusted = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose)
        .filter(|v| !v.is_empty());

    let raw = match adjusted {
        Some(values) => values,
        None => data
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .ok_or_else(|| PriceProviderError::new("no close data"))?,
    };

    let mut prices: Vec<f64> = raw.into_iter().flatten().collect();
    if prices.len() > n_days {
        prices.drain(..prices.len() - n_days);
    }

    if prices.len() < 2 {
        return Err(PriceProviderError::new("insufficient price points"));
    }
    if prices.iter().any(|p| !p.is_finite()) {
        return Err(PriceProviderError::new("non finite prices"));
    }
    if prices.iter().any(|&p| p <= 0.0) {
        return Err(PriceProviderError::new("non positive prices"));
    }

    Ok(prices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Weekday};
    use serde_json::json;

    fn chart(adjclose: serde_json::Value, close: serde_json::Value) -> ChartResponse {
        serde_json::from_value(json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL"},
                    "timestamp": [1, 2, 3, 4],
                    "indicators": {
                        "quote": [{"close": close, "open": [], "volume": []}],
                        "adjclose": [{"adjclose": adjclose}]
                    }
                }],
                "error": null
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_prefers_adjclose_and_drops_nulls() {
        let resp = chart(json!([10.0, null, 11.0, 12.0]), json!([20.0, 21.0, 22.0, 23.0]));
        assert_eq!(parse_closes(resp, 10).unwrap(), vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_falls_back_to_close() {
        let resp = chart(json!([]), json!([20.0, 21.0, null, 23.0]));
        assert_eq!(parse_closes(resp, 10).unwrap(), vec![20.0, 21.0, 23.0]);
    }

    #[test]
    fn test_keeps_most_recent_n_days() {
        let resp = chart(json!([1.0, 2.0, 3.0, 4.0]), json!([]));
        assert_eq!(parse_closes(resp, 2).unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_rejects_bad_series() {
        let too_short = chart(json!([null, null, 5.0, null]), json!([]));
        assert!(parse_closes(too_short, 10).is_err());

        let non_positive = chart(json!([1.0, 0.0, 3.0, 4.0]), json!([]));
        assert!(parse_closes(non_positive, 10).is_err());
    }

    #[test]
    fn test_chart_error_is_provider_error() {
        let resp: ChartResponse = serde_json::from_value(json!({
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        }))
        .unwrap();
        let err = parse_closes(resp, 10).unwrap_err();
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn test_chart_url_window() {
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();
        let url = YahooPriceProvider::chart_url("AAPL", 5, now);
        // 5 * 365 / 250 + 14 = 21 calendar days
        let start = now - CalendarSpan::days(21);
        assert!(url.starts_with("https://query2.finance.yahoo.com/v8/finance/chart/AAPL?"));
        assert!(url.contains(&format!("period1={}", start.timestamp())));
        assert!(url.contains(&format!("period2={}", now.timestamp())));

        let long = YahooPriceProvider::chart_url("AAPL", 5000, now);
        let start = now - CalendarSpan::days(7314);
        assert!(long.contains(&format!("period1={}", start.timestamp())));
    }

    #[test]
    fn test_calendar_window_holds_enough_sessions() {
        const HOLIDAYS_PER_YEAR: i64 = 9;
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();

        for n_days in [2_u32, 30, 252, 1000, 2500, 5000] {
            let days = calendar_days(n_days);
            let weekdays = (1..=days)
                .map(|offset| (now - CalendarSpan::days(offset)).weekday())
                .filter(|day| !matches!(day, Weekday::Sat | Weekday::Sun))
                .count() as i64;
            let sessions = weekdays - HOLIDAYS_PER_YEAR * days / 365;
            assert!(
                sessions >= i64::from(n_days),
                "n_days={} calendar_days={} sessions={}",
                n_days,
                days,
                sessions
            );
        }
    }

    #[test]
    fn test_symbol_check() {
        assert!(check_symbol("AAPL").is_ok());
        assert!(check_symbol("BRK-B").is_ok());
        assert!(check_symbol("^GSPC").is_ok());
        assert!(check_symbol("").is_err());
        assert!(check_symbol("AAPL/../x").is_err());
        assert!(check_symbol("A B").is_err());
    }
}
