//! Metric tool trait and registry
//!
//! Tools are deterministic, side-effect-free computations over a price series.
//! The registry is the single source of truth for what the pipeline supports:
//! refusals advertise exactly the tools registered here.

use crate::error::MetricError;
use crate::metrics::{self, MetricFn};
use crate::models::{Params, ToolName};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Trait for a single metric tool
pub trait MetricTool: Send + Sync {
    fn name(&self) -> ToolName;
    fn description(&self) -> &'static str;
    fn compute(&self, prices: &[f64], params: &Params) -> Result<f64, MetricError>;
}

/// A tool backed by one of the pure kernels in `metrics`.
pub struct KernelTool {
    name: ToolName,
    description: &'static str,
    kernel: MetricFn,
}

impl KernelTool {
    pub fn new(name: ToolName, description: &'static str, kernel: MetricFn) -> Self {
        Self {
            name,
            description,
            kernel,
        }
    }
}

impl MetricTool for KernelTool {
    fn name(&self) -> ToolName {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn compute(&self, prices: &[f64], params: &Params) -> Result<f64, MetricError> {
        (self.kernel)(prices, params)
    }
}

/// Registry for looking up metric tools by name
pub struct MetricRegistry {
    tools: HashMap<ToolName, Arc<dyn MetricTool>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with every built-in kernel.
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(KernelTool::new(
            ToolName::TotalReturn,
            "Total return over the range, as a fraction",
            metrics::total_return,
        )));
        registry.register(Arc::new(KernelTool::new(
            ToolName::MaxDrawdown,
            "Largest peak-to-trough decline over the range",
            metrics::max_drawdown,
        )));
        registry.register(Arc::new(KernelTool::new(
            ToolName::RealizedVolatility,
            "Annualized standard deviation of trailing log returns",
            metrics::realized_volatility,
        )));
        registry.register(Arc::new(KernelTool::new(
            ToolName::SharpeRatio,
            "Annualized Sharpe ratio of trailing excess log returns",
            metrics::sharpe_ratio,
        )));

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn MetricTool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn MetricTool>> {
        self.tools.get(&name).cloned()
    }

    /// Registered tool names, sorted by wire name.
    pub fn supported(&self) -> Vec<ToolName> {
        let mut names: Vec<ToolName> = self.tools.keys().copied().collect();
        names.sort_by_key(|name| name.as_str());
        names
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static STANDARD_REGISTRY: OnceLock<MetricRegistry> = OnceLock::new();

/// Process-wide registry of built-in kernels.
pub fn standard_registry() -> &'static MetricRegistry {
    STANDARD_REGISTRY.get_or_init(MetricRegistry::standard)
}

/// Capabilities advertised in every refusal.
pub fn supported_tools() -> Vec<ToolName> {
    standard_registry().supported()
}
