use std::collections::HashMap;

use opentelemetry::{
    trace::{Link, SamplingResult, SpanKind, TraceId},
    Context, KeyValue,
};
use opentelemetry_sdk::trace::ShouldSample;

use super::sampling_strategy::consistent_probabilistic;
use super::strategy::PerOperationSamplingStrategies;
use crate::composable::CompositeSampler;
use crate::error::ConfigError;

/// Routes on span name to an independently configured ratio per operation.
///
/// Every operation's rate is decided on its own; no budget is shared between
/// operations. Names without an entry use the default sampler.
#[derive(Clone, Debug)]
pub struct PerOperationSampler {
    default: CompositeSampler,
    default_ratio: f64,
    operations: HashMap<String, CompositeSampler>,
}

impl PerOperationSampler {
    /// Create a per-operation sampler from locally configured ratios.
    ///
    /// All ratios must lie in `[0.0, 1.0]`.
    pub fn new(
        default_ratio: f64,
        operation_ratios: impl IntoIterator<Item = (String, f64)>,
    ) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&default_ratio) {
            return Err(ConfigError::InvalidRatio(default_ratio));
        }
        let mut operations = HashMap::new();
        for (operation, ratio) in operation_ratios {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::InvalidRatio(ratio));
            }
            operations.insert(operation, consistent_probabilistic(ratio));
        }
        Ok(PerOperationSampler {
            default: consistent_probabilistic(default_ratio),
            default_ratio,
            operations,
        })
    }

    /// Build from a remote strategy document, clamping out-of-range ratios
    /// (remote input is untrusted wire data and must not stall updates).
    pub(crate) fn from_strategies(strategies: &PerOperationSamplingStrategies) -> Self {
        let default_ratio = strategies.default_sampling_probability;
        let operations = strategies
            .per_operation_strategies
            .iter()
            .map(|strategy| {
                (
                    strategy.operation.clone(),
                    consistent_probabilistic(strategy.probabilistic_sampling.sampling_rate),
                )
            })
            .collect();
        PerOperationSampler {
            default: consistent_probabilistic(default_ratio),
            default_ratio,
            operations,
        }
    }

    fn sampler_for(&self, name: &str) -> &CompositeSampler {
        self.operations.get(name).unwrap_or(&self.default)
    }

    /// A description naming the default ratio and the number of operations.
    pub fn description(&self) -> String {
        format!(
            "PerOperation{{default={:.6},operations={}}}",
            self.default_ratio,
            self.operations.len()
        )
    }
}

impl ShouldSample for PerOperationSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        self.sampler_for(name)
            .should_sample(parent_context, trace_id, name, span_kind, attributes, links)
    }
}
