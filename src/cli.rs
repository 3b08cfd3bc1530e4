//! Command-line driver
//!
//! One query per process. stdout carries exactly one JSON document (a result
//! or a refusal); everything else goes to stderr.

use crate::config::{LlmConfig, API_KEY_VAR};
use crate::data::{PriceProvider, YahooPriceProvider};
use crate::error::{ConfigError, QuantError};
use crate::llm::{AnthropicClient, ModelClient};
use crate::models::{Outcome, Refusal};
use crate::observability::{query_fingerprint, CorrelationId, DebugLog};
use crate::orchestrator::Orchestrator;
use crate::router::Router;
use clap::Parser;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const EXIT_RESULT: u8 = 0;
pub const EXIT_REFUSAL: u8 = 2;

pub const INTERNAL_ERROR_REASON: &str = "Unexpected internal error.";

#[derive(Parser, Debug)]
#[command(
    name = "quantcli",
    version,
    about = "Answer a natural-language question about one ticker's price history"
)]
pub struct Cli {
    /// Natural-language query, e.g. `total return of AAPL over the last 30 days`
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub query: Vec<String>,
}

impl Cli {
    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }
}

/// External collaborators for one invocation.
pub struct Services {
    pub model: Arc<dyn ModelClient>,
    pub prices: Arc<dyn PriceProvider>,
    pub prefill: bool,
}

impl Services {
    /// Live Anthropic client and Yahoo provider, configured from the environment.
    pub fn from_env() -> crate::Result<Self> {
        let config = LlmConfig::from_env()?;
        let model = AnthropicClient::new(&config)?;
        let prices = YahooPriceProvider::new()?;

        info!(model = model.model(), prefill = config.prefill, "Live services configured");

        Ok(Self {
            model: Arc::new(model),
            prices: Arc::new(prices),
            prefill: config.prefill,
        })
    }
}

/// Run one query end to end, write the JSON document to `out`, return the exit code.
pub async fn run<F, W>(query: &str, debug: DebugLog, services: F, out: &mut W) -> u8
where
    F: FnOnce() -> crate::Result<Services>,
    W: Write,
{
    let cid = CorrelationId::new();
    debug.event(
        "invocation_start",
        &cid,
        json!({ "query_len": query.len(), "query_fp": query_fingerprint(query) }),
    );

    let outcome = match services() {
        Ok(services) => run_pipeline(query.to_string(), cid.clone(), debug.clone(), services).await,
        Err(e) => {
            warn!(cid = %cid, error = %e, "Failed to set up services");
            Outcome::Refused(refusal_for_setup_error(&e))
        }
    };

    let exit_code = if outcome.is_success() {
        EXIT_RESULT
    } else {
        EXIT_REFUSAL
    };

    emit(out, &outcome);

    debug.event(
        "invocation_end",
        &cid,
        json!({
            "outcome": if outcome.is_success() { "result" } else { "refusal" },
            "exit_code": exit_code,
        }),
    );

    exit_code
}

/// The pipeline runs in its own task so a panic becomes a refusal.
async fn run_pipeline(
    query: String,
    cid: CorrelationId,
    debug: DebugLog,
    services: Services,
) -> Outcome {
    let task_cid = cid.clone();
    let handle = tokio::spawn(async move {
        let router = Router::new(services.model, debug.clone()).with_prefill(services.prefill);
        let orchestrator = Orchestrator::new(router, services.prices, debug);
        orchestrator.run_query(&query, &task_cid).await
    });

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(cid = %cid, error = %e, "Pipeline task failed");
            Outcome::Refused(Refusal::reason_only(INTERNAL_ERROR_REASON))
        }
    }
}

fn refusal_for_setup_error(error: &QuantError) -> Refusal {
    match error {
        QuantError::Config(config) => {
            let question = match config {
                ConfigError::MissingApiKey => format!("Set {}.", API_KEY_VAR),
                ConfigError::InvalidValue { var, .. } => format!("Set {} to a valid value.", var),
            };
            Refusal::new(config.to_string(), Some(question))
        }
        _ => Refusal::reason_only(INTERNAL_ERROR_REASON),
    }
}

fn emit<W: Write>(out: &mut W, outcome: &Outcome) {
    let document = serde_json::to_string(outcome).unwrap_or_else(|e| {
        error!(error = %e, "Failed to serialize outcome");
        serde_json::to_string(&Refusal::reason_only(INTERNAL_ERROR_REASON)).unwrap_or_default()
    });

    if let Err(e) = writeln!(out, "{}", document).and_then(|_| out.flush()) {
        error!(error = %e, "Failed to write output");
    }
}
