//! Orchestrator - runs one query through the pipeline
//!
//! RECEIVED → ROUTED → VALIDATED → PRICED → COMPUTED → SUCCEEDED
//!
//! Any stage may short-circuit to REFUSED. Every failure becomes a refusal
//! with a stable, user-facing reason; details go to tracing and the debug log.

use crate::data::PriceProvider;
use crate::models::{Intent, MetricResult, Outcome, Refusal, ResultMetadata, TOOL_VERSION};
use crate::observability::{query_fingerprint, CorrelationId, DebugLog, Stage, StageTracker};
use crate::router::Router;
use crate::tools::MetricRegistry;
use crate::validation::{create_default_validator, IntentValidator};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const UNSUPPORTED_TOOL_REASON: &str = "Requested tool is not supported.";
pub const PRICE_DATA_REASON: &str = "Unable to retrieve valid price data.";
pub const COMPUTE_REASON: &str = "Unable to compute metric from available price data.";

/// Main orchestrator that coordinates the pipeline
pub struct Orchestrator {
    router: Router,
    prices: Arc<dyn PriceProvider>,
    validator: IntentValidator,
    registry: MetricRegistry,
    debug: DebugLog,
}

impl Orchestrator {
    pub fn new(router: Router, prices: Arc<dyn PriceProvider>, debug: DebugLog) -> Self {
        Self {
            router,
            prices,
            validator: create_default_validator(),
            registry: MetricRegistry::standard(),
            debug,
        }
    }

    pub fn with_registry(mut self, registry: MetricRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_validator(mut self, validator: IntentValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Full pipeline from free text.
    pub async fn run_query(&self, user_text: &str, cid: &CorrelationId) -> Outcome {
        let mut stages = StageTracker::new(&self.debug, cid, Stage::Received);

        info!(
            cid = %cid,
            query_len = user_text.len(),
            query_fp = %query_fingerprint(user_text),
            "Orchestrator: query received"
        );

        let intent = match self.router.route(user_text, cid).await {
            Ok(intent) => intent,
            Err(refusal) => return self.refuse(&mut stages, refusal),
        };
        stages.advance(Stage::Routed);

        self.execute(intent, cid, &mut stages).await
    }

    /// Pipeline from an already-decoded intent (routing skipped).
    pub async fn run_intent(&self, intent: Intent, cid: &CorrelationId) -> Outcome {
        let mut stages = StageTracker::new(&self.debug, cid, Stage::Routed);
        self.execute(intent, cid, &mut stages).await
    }

    async fn execute(
        &self,
        intent: Intent,
        cid: &CorrelationId,
        stages: &mut StageTracker<'_>,
    ) -> Outcome {
        // === VALIDATE ===
        let intent = match self.validator.validate(intent) {
            Ok(intent) => intent,
            Err(refusal) => return self.refuse(stages, refusal),
        };
        stages.advance(Stage::Validated);

        let Some(tool) = self.registry.get(intent.tool) else {
            warn!(cid = %cid, tool = %intent.tool, "No kernel registered for tool");
            return self.refuse(stages, Refusal::reason_only(UNSUPPORTED_TOOL_REASON));
        };

        let Some(ticker) = intent.tickers.first() else {
            return self.refuse(stages, Refusal::reason_only(PRICE_DATA_REASON));
        };
        let n_days = intent.time_range.n_days;

        // === FETCH ===
        debug!(cid = %cid, ticker = %ticker, n_days = n_days, provider = self.prices.name(), "Fetching prices");

        let series = match self.prices.get_adjusted_close(ticker, n_days).await {
            Ok(series) => series,
            Err(e) => {
                warn!(cid = %cid, provider = self.prices.name(), error = %e, "Price provider failed");
                self.debug.event(
                    "provider_error",
                    cid,
                    json!({ "provider": self.prices.name(), "error": e.to_string() }),
                );
                return self.refuse(stages, Refusal::reason_only(PRICE_DATA_REASON));
            }
        };
        stages.advance(Stage::Priced);

        // === COMPUTE ===
        let value = match tool.compute(series.as_slice(), &intent.params) {
            Ok(value) if value.is_finite() => value,
            Ok(value) => {
                warn!(cid = %cid, tool = %intent.tool, value = value, "Kernel returned non-finite value");
                self.debug.event(
                    "metric_error",
                    cid,
                    json!({ "tool": intent.tool, "error": "non-finite value" }),
                );
                return self.refuse(stages, Refusal::reason_only(COMPUTE_REASON));
            }
            Err(e) => {
                warn!(cid = %cid, tool = %intent.tool, error = %e, "Kernel rejected price data");
                self.debug.event(
                    "metric_error",
                    cid,
                    json!({ "tool": intent.tool, "error": e.to_string() }),
                );
                return self.refuse(stages, Refusal::reason_only(COMPUTE_REASON));
            }
        };
        stages.advance(Stage::Computed);

        let metadata = ResultMetadata {
            range_n_days: n_days,
            window: intent.params.window,
            annualization_factor: intent
                .tool
                .is_annualized()
                .then_some(intent.params.annualization_factor),
            data_points: series.len(),
            price_source: self.prices.name().to_string(),
            tool_version: TOOL_VERSION.to_string(),
            interpretation_notes: None,
        };

        info!(cid = %cid, tool = %intent.tool, data_points = series.len(), "Metric computed");
        stages.advance(Stage::Succeeded);

        Outcome::Success(MetricResult {
            tool: intent.tool,
            tickers: intent.tickers,
            value,
            metadata,
        })
    }

    /// Refusals advertise only the tools this orchestrator can run.
    fn refuse(&self, stages: &mut StageTracker<'_>, mut refusal: Refusal) -> Outcome {
        refusal.allowed_capabilities = self.registry.supported();
        info!(at = stages.current().as_str(), reason = %refusal.reason, "Orchestrator: refused");
        stages.advance(Stage::Refused);
        Outcome::Refused(refusal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FakePriceProvider, Fixture};
    use crate::llm::FakeModelClient;
    use crate::models::{Params, ToolName};
    use crate::observability::MemorySink;

    fn orchestrator(provider: Arc<FakePriceProvider>, model_output: &str) -> Orchestrator {
        let model = Arc::new(FakeModelClient::responding(model_output));
        Orchestrator::new(Router::new(model, DebugLog::disabled()), provider, DebugLog::disabled())
    }

    fn intent(tool: ToolName, n_days: u32, params: Params) -> Intent {
        Intent::new(tool, vec!["AAPL".to_string()], n_days, params)
    }

    fn refusal_reason(outcome: &Outcome) -> &str {
        outcome.refusal().map(|r| r.reason.as_str()).unwrap_or("")
    }

    #[tokio::test]
    async fn test_total_return_happy_path() {
        let provider = Arc::new(FakePriceProvider::new(Fixture::MonotonicUp));
        let orch = orchestrator(provider.clone(), "");

        let outcome = orch
            .run_intent(intent(ToolName::TotalReturn, 10, Params::default()), &CorrelationId::new())
            .await;

        let result = outcome.result().expect("result");
        assert_eq!(result.tool, ToolName::TotalReturn);
        assert_eq!(result.tickers, vec!["AAPL".to_string()]);
        assert!((result.value - 0.09).abs() < 1e-12);
        assert_eq!(result.metadata.range_n_days, 10);
        assert_eq!(result.metadata.window, None);
        assert_eq!(result.metadata.annualization_factor, None);
        assert_eq!(result.metadata.data_points, 10);
        assert_eq!(result.metadata.price_source, "FakePriceProvider");
        assert_eq!(result.metadata.tool_version, "1.0.0");
        assert_eq!(result.metadata.interpretation_notes, None);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_max_drawdown_fixture() {
        let provider = Arc::new(FakePriceProvider::new(Fixture::Drawdown));
        let outcome = orchestrator(provider, "")
            .run_intent(intent(ToolName::MaxDrawdown, 10, Params::default()), &CorrelationId::new())
            .await;

        let value = outcome.result().expect("result").value;
        assert!((value - 1.0 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_realized_volatility_metadata() {
        let provider = Arc::new(FakePriceProvider::new(Fixture::MonotonicUp));
        let outcome = orchestrator(provider, "")
            .run_intent(
                intent(ToolName::RealizedVolatility, 10, Params::with_window(5)),
                &CorrelationId::new(),
            )
            .await;

        let prices: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
        let last = &returns[returns.len() - 5..];
        let mean = last.iter().sum::<f64>() / 5.0;
        let var = last.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 4.0;
        let expected = var.sqrt() * 252.0_f64.sqrt();

        let result = outcome.result().expect("result");
        assert!((result.value - expected).abs() < 1e-12);
        assert_eq!(result.metadata.window, Some(5));
        assert_eq!(result.metadata.annualization_factor, Some(252));
    }

    #[tokio::test]
    async fn test_sharpe_reports_annualization() {
        let provider = Arc::new(FakePriceProvider::new(Fixture::Drawdown));
        let params = Params {
            risk_free_rate: 0.02,
            ..Params::with_window(5)
        };
        let outcome = orchestrator(provider, "")
            .run_intent(intent(ToolName::SharpeRatio, 12, params), &CorrelationId::new())
            .await;

        let result = outcome.result().expect("result");
        assert!(result.value.is_finite());
        assert_eq!(result.metadata.annualization_factor, Some(252));
    }

    #[tokio::test]
    async fn test_invalid_intent_never_fetches_prices() {
        let provider = Arc::new(FakePriceProvider::new(Fixture::MonotonicUp));
        let orch = orchestrator(provider.clone(), "");

        let two_tickers = Intent::new(
            ToolName::TotalReturn,
            vec!["AAPL".into(), "MSFT".into()],
            30,
            Params::default(),
        );
        let outcome = orch.run_intent(two_tickers, &CorrelationId::new()).await;

        assert_eq!(refusal_reason(&outcome), "Only single-asset metrics currently supported.");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_refusal() {
        let provider = Arc::new(FakePriceProvider::failing());
        let outcome = orchestrator(provider.clone(), "")
            .run_intent(intent(ToolName::TotalReturn, 10, Params::default()), &CorrelationId::new())
            .await;

        assert_eq!(refusal_reason(&outcome), PRICE_DATA_REASON);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_kernel_failure_refusal() {
        for fixture in [Fixture::InvalidNonPositive, Fixture::Short2] {
            let provider = Arc::new(FakePriceProvider::new(fixture));
            let outcome = orchestrator(provider, "")
                .run_intent(
                    intent(ToolName::RealizedVolatility, 30, Params::with_window(20)),
                    &CorrelationId::new(),
                )
                .await;
            assert_eq!(refusal_reason(&outcome), COMPUTE_REASON);
        }
    }

    #[tokio::test]
    async fn test_window_of_one_fails_in_kernel() {
        let provider = Arc::new(FakePriceProvider::new(Fixture::MonotonicUp));
        let outcome = orchestrator(provider.clone(), "")
            .run_intent(
                intent(ToolName::RealizedVolatility, 10, Params::with_window(1)),
                &CorrelationId::new(),
            )
            .await;
        assert_eq!(refusal_reason(&outcome), COMPUTE_REASON);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_tool_refusal() {
        let provider = Arc::new(FakePriceProvider::new(Fixture::MonotonicUp));
        let outcome = orchestrator(provider.clone(), "")
            .with_registry(MetricRegistry::new())
            .run_intent(intent(ToolName::TotalReturn, 10, Params::default()), &CorrelationId::new())
            .await;

        assert_eq!(refusal_reason(&outcome), UNSUPPORTED_TOOL_REASON);
        assert!(outcome.refusal().unwrap().allowed_capabilities.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_refusal_advertises_own_registry() {
        let mut registry = MetricRegistry::new();
        if let Some(tool) = MetricRegistry::standard().get(ToolName::TotalReturn) {
            registry.register(tool);
        }
        let provider = Arc::new(FakePriceProvider::new(Fixture::MonotonicUp));
        let orch = orchestrator(provider.clone(), "").with_registry(registry);

        let outcome = orch
            .run_intent(intent(ToolName::MaxDrawdown, 10, Params::default()), &CorrelationId::new())
            .await;

        let refusal = outcome.refusal().unwrap();
        assert_eq!(refusal.reason, UNSUPPORTED_TOOL_REASON);
        assert_eq!(refusal.allowed_capabilities, vec![ToolName::TotalReturn]);

        let outcome = orch
            .run_intent(intent(ToolName::TotalReturn, 1, Params::default()), &CorrelationId::new())
            .await;
        assert_eq!(outcome.refusal().unwrap().allowed_capabilities, vec![ToolName::TotalReturn]);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_every_tool_is_wired() {
        for tool in ToolName::ALL {
            let params = if tool.is_window_based() {
                Params::with_window(5)
            } else {
                Params::default()
            };
            let provider = Arc::new(FakePriceProvider::new(Fixture::Drawdown));
            let outcome = orchestrator(provider, "")
                .run_intent(intent(tool, 20, params), &CorrelationId::new())
                .await;
            assert_eq!(outcome.result().map(|r| r.tool), Some(tool), "{}", tool);
        }
    }

    #[tokio::test]
    async fn test_run_query_end_to_end() {
        let provider = Arc::new(FakePriceProvider::new(Fixture::MonotonicUp));
        let orch = orchestrator(
            provider.clone(),
            r#"{"type":"intent","intent":{"tool":"total_return","tickers":["AAPL"],"time_range":{"n_days":10}}}"#,
        );

        let outcome = orch
            .run_query("total return of AAPL over the last 10 days", &CorrelationId::new())
            .await;
        assert!(outcome.is_success());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_run_query_two_tickers_never_fetches() {
        let provider = Arc::new(FakePriceProvider::new(Fixture::MonotonicUp));
        let orch = orchestrator(
            provider.clone(),
            r#"{"type":"intent","intent":{"tool":"max_drawdown","tickers":["AAPL","MSFT"],"time_range":{"n_days":30}}}"#,
        );

        let outcome = orch.run_query("max drawdown of AAPL and MSFT", &CorrelationId::new()).await;
        assert!(!outcome.is_success());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_stage_events_logged() {
        let sink = Arc::new(MemorySink::new());
        let debug = DebugLog::with_sink(sink.clone());
        let model = Arc::new(FakeModelClient::responding(
            r#"{"type":"intent","intent":{"tool":"total_return","tickers":["AAPL"],"time_range":{"n_days":5}}}"#,
        ));
        let orch = Orchestrator::new(
            Router::new(model, debug.clone()),
            Arc::new(FakePriceProvider::default()),
            debug,
        );

        let outcome = orch.run_query("total return AAPL 5 days", &CorrelationId::from("cid000000001")).await;
        assert!(outcome.is_success());

        let transitions: Vec<String> = sink
            .records()
            .iter()
            .filter(|r| r["event"] == "stage")
            .map(|r| r["to"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(transitions, vec!["routed", "validated", "priced", "computed", "succeeded"]);
        assert!(sink.records().iter().all(|r| r["cid"] == "cid000000001"));
    }

    #[tokio::test]
    async fn test_refusal_stage_and_provider_event_logged() {
        let sink = Arc::new(MemorySink::new());
        let debug = DebugLog::with_sink(sink.clone());
        let model = Arc::new(FakeModelClient::responding(""));
        let orch = Orchestrator::new(
            Router::new(model, debug.clone()),
            Arc::new(FakePriceProvider::failing()),
            debug,
        );

        let outcome = orch
            .run_intent(intent(ToolName::TotalReturn, 5, Params::default()), &CorrelationId::new())
            .await;
        assert_eq!(refusal_reason(&outcome), PRICE_DATA_REASON);

        let events: Vec<String> = sink
            .records()
            .iter()
            .map(|r| r["event"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(events, vec!["stage", "provider_error", "stage"]);
        assert_eq!(sink.records()[2]["to"], "refused");
    }
}
