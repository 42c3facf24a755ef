use std::cell::RefCell;

use opentelemetry::{
    trace::{
        Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
    },
    Context, KeyValue,
};
use opentelemetry_sdk::trace::ShouldSample;
use rand::{rngs, Rng, SeedableRng};

use super::{ComposableSampler, SamplingParameters, SamplingPolicy};
use crate::trace_state::{OtelTraceState, MAX_THRESHOLD};

/// Bridges a [`ComposableSampler`] policy tree to a final sampling decision.
///
/// On every span start the parent's sampling trace state is parsed, the
/// policy tree is asked for its intent, and the intent's threshold is
/// compared against the trace's shared random draw. The updated trace state
/// carries the draw forward unconditionally; the threshold is carried only
/// when the span is sampled with a reliable threshold, so descendants never
/// mistake an inferred boundary for a calibrated rate.
#[derive(Clone, Debug)]
pub struct CompositeSampler {
    sampler: ComposableSampler,
}

impl CompositeSampler {
    /// Wrap a composable policy tree.
    pub fn new(sampler: ComposableSampler) -> Self {
        CompositeSampler { sampler }
    }

    /// A description of the wrapped policy tree.
    pub fn description(&self) -> String {
        format!("CompositeSampler{{{}}}", self.sampler.description())
    }
}

impl ShouldSample for CompositeSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let params = SamplingParameters {
            parent_context,
            trace_id,
            name,
            span_kind,
            attributes,
            links,
        };
        let parent_trace_state = match parent_context.filter(|cx| cx.has_active_span()) {
            Some(cx) => cx.span().span_context().trace_state().clone(),
            None => TraceState::default(),
        };
        let mut state = OtelTraceState::parse(&parent_trace_state);
        let intent = self.sampler.sampling_intent(&params);

        let random_value = if state.has_valid_random_value() {
            // An explicit draw made by an ancestor wins: every span of the
            // trace compares against the same point.
            state.random_value()
        } else if intent.threshold_reliable {
            trace_id_random_value(trace_id)
        } else {
            // An unreliable threshold must not be paired with a reproducible
            // source, or downstream span-count extrapolation is biased.
            fresh_random_value()
        };

        // The invalid sentinel is u64::MAX and can never satisfy this.
        let sampled = intent.threshold <= random_value;
        let decision = if sampled {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        };

        state.set_random_value(random_value);
        if sampled && intent.threshold_reliable {
            state.set_threshold(intent.threshold);
        } else {
            state.clear_threshold();
        }

        let base = match &intent.trace_state_updater {
            Some(updater) => updater(parent_trace_state),
            None => parent_trace_state,
        };
        SamplingResult {
            decision,
            attributes: intent.attributes,
            trace_state: state.apply_to(&base),
        }
    }
}

/// The deterministic draw shared by every span of a trace that has not yet
/// recorded an explicit one: the low 56 bits of the trace id.
fn trace_id_random_value(trace_id: TraceId) -> u64 {
    let bytes = trace_id.to_bytes();
    let (_, low) = bytes.split_at(8);
    u64::from_be_bytes(low.try_into().unwrap()) & (MAX_THRESHOLD - 1)
}

fn fresh_random_value() -> u64 {
    CURRENT_RNG.with(|rng| rng.borrow_mut().random::<u64>()) & (MAX_THRESHOLD - 1)
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}
