use opentelemetry::{
    trace::{Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState},
    Context, KeyValue,
};
use opentelemetry_sdk::trace::ShouldSample;

use crate::error::ConfigError;
use crate::rate_limit::RateLimiter;

/// Samples spans until a per-second budget is exhausted.
///
/// Each sampled span spends one credit; the budget refills continuously at
/// `max_traces_per_second`, with bursts bounded by the same value (at least
/// one).
#[derive(Clone, Debug)]
pub struct RateLimitingSampler {
    limiter: RateLimiter,
    max_traces_per_second: f64,
    attributes: Vec<KeyValue>,
}

impl RateLimitingSampler {
    /// Create a sampler admitting at most `max_traces_per_second`.
    pub fn new(max_traces_per_second: f64) -> Result<Self, ConfigError> {
        let limiter = RateLimiter::new(max_traces_per_second, max_traces_per_second.max(1.0))?;
        Ok(RateLimitingSampler {
            limiter,
            max_traces_per_second,
            attributes: vec![
                KeyValue::new("sampler.type", "ratelimiting"),
                KeyValue::new("sampler.param", max_traces_per_second),
            ],
        })
    }

    /// A description of the configured rate, e.g. `RateLimiting(150.00)`.
    pub fn description(&self) -> String {
        format!("RateLimiting({:.2})", self.max_traces_per_second)
    }
}

impl ShouldSample for RateLimitingSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        _trace_id: TraceId,
        _name: &str,
        _span_kind: &SpanKind,
        _attributes: &[KeyValue],
        _links: &[Link],
    ) -> SamplingResult {
        let decision = if self.limiter.check_credit(1.0) {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        };
        SamplingResult {
            attributes: if decision == SamplingDecision::RecordAndSample {
                self.attributes.clone()
            } else {
                Vec::new()
            },
            decision,
            trace_state: match parent_context {
                Some(ctx) => ctx.span().span_context().trace_state().clone(),
                None => TraceState::default(),
            },
        }
    }
}
