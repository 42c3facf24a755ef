//! Composable sampling policies.
//!
//! A composable policy does not make a final decision; it produces a
//! [`SamplingIntent`] (a 56-bit rejection threshold plus bookkeeping)
//! which [`CompositeSampler`] compares against the trace's shared random
//! draw. Policies compose: rules route to sub-policies, parent-threshold
//! inheritance wraps a root fallback, annotation adds attributes without
//! touching the decision.

use std::fmt;
use std::sync::Arc;

use opentelemetry::{
    trace::{Link, SpanKind, TraceContextExt, TraceId, TraceState},
    Context, KeyValue,
};

use crate::error::ConfigError;
use crate::trace_state::{OtelTraceState, INVALID_THRESHOLD, MAX_THRESHOLD};

mod composite;

pub use composite::CompositeSampler;

/// The inputs available to a sampling policy for one span-start call.
#[derive(Clone, Debug)]
pub struct SamplingParameters<'a> {
    /// Context of the parent span, if any.
    pub parent_context: Option<&'a Context>,
    /// Trace id of the span to be created.
    pub trace_id: TraceId,
    /// Name of the span to be created.
    pub name: &'a str,
    /// Kind of the span to be created.
    pub span_kind: &'a SpanKind,
    /// Initial attributes of the span to be created.
    pub attributes: &'a [KeyValue],
    /// Links of the span to be created.
    pub links: &'a [Link],
}

/// A composable policy's opinion about one span.
///
/// `threshold` is a 56-bit rejection boundary: lower values sample more, `0`
/// samples everything, anything above the maximum sample point samples
/// nothing, and [`INVALID_THRESHOLD`] means "no usable opinion".
#[derive(Clone)]
pub struct SamplingIntent {
    /// The rejection threshold to compare against the trace's random draw.
    pub threshold: u64,
    /// True only when the threshold comes from configured probability and is
    /// therefore safe for statistical span-count extrapolation. A threshold
    /// inferred from a legacy sampled/unsampled flag is not.
    pub threshold_reliable: bool,
    /// Attributes recording why the span was (not) sampled.
    pub attributes: Vec<KeyValue>,
    /// Maps the parent's trace state to the child's, for policies that need
    /// to adjust vendor entries other than the sampling member. `None` means
    /// identity.
    pub trace_state_updater: Option<Arc<dyn Fn(TraceState) -> TraceState + Send + Sync>>,
}

impl SamplingIntent {
    /// An intent with the given threshold and no attributes.
    pub fn new(threshold: u64, threshold_reliable: bool) -> Self {
        SamplingIntent {
            threshold,
            threshold_reliable,
            attributes: Vec::new(),
            trace_state_updater: None,
        }
    }

    /// The "no usable opinion" intent shared by `AlwaysOff` and an
    /// unmatched rule set.
    pub fn no_opinion() -> Self {
        Self::new(INVALID_THRESHOLD, false)
    }

    /// Attach attributes to this intent.
    pub fn with_attributes(mut self, attributes: Vec<KeyValue>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Attach a trace-state updater to this intent.
    pub fn with_trace_state_updater<F>(mut self, updater: F) -> Self
    where
        F: Fn(TraceState) -> TraceState + Send + Sync + 'static,
    {
        self.trace_state_updater = Some(Arc::new(updater));
        self
    }
}

impl fmt::Debug for SamplingIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingIntent")
            .field("threshold", &self.threshold)
            .field("threshold_reliable", &self.threshold_reliable)
            .field("attributes", &self.attributes)
            .field(
                "trace_state_updater",
                &self.trace_state_updater.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

/// A policy that yields a [`SamplingIntent`] for a span about to start.
///
/// Implementations must be deterministic given their inputs and must not
/// panic: a failing policy is a programming defect, and the span-creation
/// hot path has no way to recover from one.
pub trait SamplingPolicy: Send + Sync + fmt::Debug {
    /// Produce this policy's intent for the described span.
    fn sampling_intent(&self, params: &SamplingParameters<'_>) -> SamplingIntent;

    /// A human-readable description of the configured policy, used in
    /// diagnostics.
    fn description(&self) -> String;
}

/// A trace-id-ratio policy with its threshold precomputed at construction.
#[derive(Clone, Debug)]
pub struct TraceIdRatio {
    threshold: u64,
    description: String,
}

impl TraceIdRatio {
    /// Create a ratio policy sampling the given fraction of traces.
    ///
    /// The ratio must lie in `[0.0, 1.0]`; anything else is rejected here,
    /// not at decision time.
    pub fn new(ratio: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::InvalidRatio(ratio));
        }
        Ok(Self::from_ratio(ratio))
    }

    /// Like [`TraceIdRatio::new`] but clamping out-of-range input, for
    /// ratios arriving from untrusted remote configuration.
    pub(crate) fn new_clamped(ratio: f64) -> Self {
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self::from_ratio(ratio)
    }

    fn from_ratio(ratio: f64) -> Self {
        // Ratio 0 lands exactly on MAX_THRESHOLD, the "never" boundary; the
        // description still names the ratio so a collapsed configuration
        // remains distinguishable from AlwaysOff in diagnostics.
        let threshold = ((MAX_THRESHOLD as f64) * (1.0 - ratio)).round() as u64;
        TraceIdRatio {
            threshold,
            description: format!("TraceIdRatio({ratio:.6})"),
        }
    }

    /// The precomputed rejection threshold.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

/// A predicate over span-start parameters, used by rule-based policies.
#[derive(Clone)]
pub struct Predicate {
    matcher: Arc<dyn Fn(&SamplingParameters<'_>) -> bool + Send + Sync>,
    description: String,
}

impl Predicate {
    /// A predicate from an arbitrary matching function.
    pub fn custom<F>(description: impl Into<String>, matcher: F) -> Self
    where
        F: Fn(&SamplingParameters<'_>) -> bool + Send + Sync + 'static,
    {
        Predicate {
            matcher: Arc::new(matcher),
            description: description.into(),
        }
    }

    /// Matches every span.
    pub fn match_all() -> Self {
        Self::custom("true", |_: &SamplingParameters<'_>| true)
    }

    /// Matches spans whose name equals `name`.
    pub fn span_name_equals(name: impl Into<String>) -> Self {
        let name = name.into();
        let description = format!("Span.Name == {name:?}");
        Self::custom(description, move |params: &SamplingParameters<'_>| {
            params.name == name
        })
    }

    /// Matches spans of the given kind.
    pub fn span_kind_is(kind: SpanKind) -> Self {
        let description = format!("Span.Kind == {kind:?}");
        Self::custom(description, move |params: &SamplingParameters<'_>| {
            *params.span_kind == kind
        })
    }

    /// Evaluate the predicate.
    pub fn matches(&self, params: &SamplingParameters<'_>) -> bool {
        (self.matcher)(params)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.description)
    }
}

/// One `(predicate, policy)` pair of a rule-based policy.
#[derive(Clone, Debug)]
pub struct SamplingRule {
    predicate: Predicate,
    sampler: ComposableSampler,
}

impl SamplingRule {
    /// Pair a predicate with the policy applied when it matches.
    pub fn new(predicate: Predicate, sampler: ComposableSampler) -> Self {
        SamplingRule { predicate, sampler }
    }
}

/// The built-in composable policies.
///
/// Evaluation is a single dispatch over this closed set; user-defined
/// policies plug in through [`ComposableSampler::Custom`].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ComposableSampler {
    /// Sample everything: threshold `0`, reliable.
    AlwaysOn,
    /// Sample nothing: no usable opinion.
    AlwaysOff,
    /// Sample a fixed fraction of traces.
    TraceIdRatio(TraceIdRatio),
    /// Inherit the parent's reliable threshold when there is one, fall back
    /// to the wrapped policy for root spans. This is what keeps the sampling
    /// decision consistent across every span of a trace.
    ParentThreshold(Box<ComposableSampler>),
    /// Ordered first-match rules; a span matching no rule is not sampled.
    RuleBased(Vec<SamplingRule>),
    /// Pass the delegate's decision through, merging extra attributes into
    /// the intent. Useful for labelling which rule or policy fired.
    Annotating(Box<ComposableSampler>, Vec<KeyValue>),
    /// A user-provided policy.
    Custom(Arc<dyn SamplingPolicy>),
}

impl SamplingPolicy for ComposableSampler {
    fn sampling_intent(&self, params: &SamplingParameters<'_>) -> SamplingIntent {
        match self {
            ComposableSampler::AlwaysOn => SamplingIntent::new(0, true),
            ComposableSampler::AlwaysOff => SamplingIntent::no_opinion(),
            ComposableSampler::TraceIdRatio(ratio) => {
                SamplingIntent::new(ratio.threshold(), true)
            }
            ComposableSampler::ParentThreshold(fallback) => {
                parent_threshold_intent(fallback, params)
            }
            ComposableSampler::RuleBased(rules) => rules
                .iter()
                .find(|rule| rule.predicate.matches(params))
                .map(|rule| rule.sampler.sampling_intent(params))
                .unwrap_or_else(SamplingIntent::no_opinion),
            ComposableSampler::Annotating(delegate, attributes) => {
                let mut intent = delegate.sampling_intent(params);
                intent.attributes.extend(attributes.iter().cloned());
                intent
            }
            ComposableSampler::Custom(policy) => policy.sampling_intent(params),
        }
    }

    fn description(&self) -> String {
        match self {
            ComposableSampler::AlwaysOn => "AlwaysOn".to_string(),
            ComposableSampler::AlwaysOff => "AlwaysOff".to_string(),
            ComposableSampler::TraceIdRatio(ratio) => ratio.description.clone(),
            ComposableSampler::ParentThreshold(fallback) => {
                format!("ParentThreshold{{root={}}}", fallback.description())
            }
            ComposableSampler::RuleBased(rules) => {
                let rules = rules
                    .iter()
                    .map(|rule| {
                        format!(
                            "({})=>{}",
                            rule.predicate.description,
                            rule.sampler.description()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                format!("RuleBased{{{rules}}}")
            }
            ComposableSampler::Annotating(delegate, _) => {
                format!("Annotating{{{}}}", delegate.description())
            }
            ComposableSampler::Custom(policy) => policy.description(),
        }
    }
}

fn parent_threshold_intent(
    fallback: &ComposableSampler,
    params: &SamplingParameters<'_>,
) -> SamplingIntent {
    let parent = match params.parent_context.filter(|cx| cx.has_active_span()) {
        Some(cx) => cx.span().span_context().clone(),
        None => return fallback.sampling_intent(params),
    };
    if !parent.is_valid() {
        return fallback.sampling_intent(params);
    }
    let state = OtelTraceState::parse(parent.trace_state());
    if state.has_valid_threshold() {
        // Serialized thresholds only ever come from configured probability,
        // so an inherited one stays reliable.
        SamplingIntent::new(state.threshold(), true)
    } else if parent.is_sampled() {
        // A single legacy flag cannot reconstruct a probability.
        SamplingIntent::new(0, false)
    } else {
        SamplingIntent::no_opinion()
    }
}
