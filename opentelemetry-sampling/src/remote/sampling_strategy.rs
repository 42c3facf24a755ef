use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use opentelemetry::{
    otel_debug, otel_warn,
    trace::{Link, SamplingResult, SpanKind, TraceId},
    Context, KeyValue,
};
use opentelemetry_sdk::trace::ShouldSample;

use super::per_operation::PerOperationSampler;
use super::rate_limiting::RateLimitingSampler;
use super::strategy::SamplingStrategyResponse;
use crate::composable::{ComposableSampler, CompositeSampler, TraceIdRatio};

/// The decision function currently in effect.
///
/// Either the caller-supplied fallback (before the first successful poll) or
/// the translation of the latest remote strategy. Always fully constructed
/// before it becomes visible to readers.
#[derive(Debug)]
pub(crate) enum ActivePolicy {
    Fallback(Box<dyn ShouldSample>),
    Probabilistic {
        ratio: f64,
        sampler: CompositeSampler,
    },
    RateLimiting(RateLimitingSampler),
    PerOperation(PerOperationSampler),
}

impl ActivePolicy {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        match self {
            ActivePolicy::Fallback(sampler) => {
                sampler.should_sample(parent_context, trace_id, name, span_kind, attributes, links)
            }
            ActivePolicy::Probabilistic { sampler, .. } => {
                sampler.should_sample(parent_context, trace_id, name, span_kind, attributes, links)
            }
            ActivePolicy::RateLimiting(sampler) => {
                sampler.should_sample(parent_context, trace_id, name, span_kind, attributes, links)
            }
            ActivePolicy::PerOperation(sampler) => {
                sampler.should_sample(parent_context, trace_id, name, span_kind, attributes, links)
            }
        }
    }

    pub(crate) fn description(&self) -> String {
        match self {
            ActivePolicy::Fallback(sampler) => format!("Fallback{{{sampler:?}}}"),
            ActivePolicy::Probabilistic { ratio, .. } => format!("Probabilistic({ratio:.2})"),
            ActivePolicy::RateLimiting(sampler) => sampler.description(),
            ActivePolicy::PerOperation(sampler) => sampler.description(),
        }
    }
}

/// Owns the active policy and swaps it atomically on every successful poll.
///
/// Readers take a single lock-free load; a reader concurrent with an update
/// observes either the previous or the new policy, never a partial one.
pub(crate) struct SamplingStrategy {
    active: ArcSwap<ActivePolicy>,
}

impl SamplingStrategy {
    pub(crate) fn new(fallback: Box<dyn ShouldSample>) -> Self {
        SamplingStrategy {
            active: ArcSwap::from_pointee(ActivePolicy::Fallback(fallback)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        self.active
            .load()
            .should_sample(parent_context, trace_id, name, span_kind, attributes, links)
    }

    pub(crate) fn description(&self) -> String {
        self.active.load().description()
    }

    /// Translate a strategy response and publish it. A response carrying no
    /// usable strategy leaves the current policy untouched.
    pub(crate) fn update(&self, response: SamplingStrategyResponse) {
        match translate(response) {
            Some(policy) => {
                otel_debug!(
                    name: "AdaptiveSampler.StrategyInstalled",
                    description = policy.description()
                );
                self.active.store(Arc::new(policy));
            }
            None => {
                otel_warn!(name: "AdaptiveSampler.NoUsableStrategy");
            }
        }
    }
}

impl fmt::Debug for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingStrategy")
            .field("active", &self.description())
            .finish()
    }
}

fn translate(response: SamplingStrategyResponse) -> Option<ActivePolicy> {
    if let Some(operations) = response.operation_sampling {
        return Some(ActivePolicy::PerOperation(
            PerOperationSampler::from_strategies(&operations),
        ));
    }
    if let Some(rate_limiting) = response.rate_limiting_sampling {
        return match RateLimitingSampler::new(rate_limiting.max_traces_per_second) {
            Ok(sampler) => Some(ActivePolicy::RateLimiting(sampler)),
            Err(err) => {
                otel_warn!(name: "AdaptiveSampler.InvalidStrategy", reason = err.to_string());
                None
            }
        };
    }
    if let Some(probabilistic) = response.probabilistic_sampling {
        let rate = probabilistic.sampling_rate;
        if !(0.0..=1.0).contains(&rate) {
            otel_warn!(name: "AdaptiveSampler.ProbabilityClamped", sampling_rate = rate);
        }
        let ratio = if rate.is_finite() {
            rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        return Some(ActivePolicy::Probabilistic {
            ratio,
            sampler: consistent_probabilistic(ratio),
        });
    }
    None
}

/// A consistent-probability sampler for one remotely configured ratio:
/// parent-threshold inheritance over a trace-id ratio leaf, annotated with
/// the jaeger client sampler tags.
pub(crate) fn consistent_probabilistic(ratio: f64) -> CompositeSampler {
    let ratio = if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    CompositeSampler::new(ComposableSampler::Annotating(
        Box::new(ComposableSampler::ParentThreshold(Box::new(
            ComposableSampler::TraceIdRatio(TraceIdRatio::new_clamped(ratio)),
        ))),
        vec![
            KeyValue::new("sampler.type", "probabilistic"),
            KeyValue::new("sampler.param", ratio),
        ],
    ))
}
