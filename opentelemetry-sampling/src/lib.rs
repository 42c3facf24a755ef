//! # OpenTelemetry Sampling
//!
//! Sampling decision functions for the [OpenTelemetry] Rust SDK, beyond the
//! built-in set:
//!
//! * **Composable samplers** ([`ComposableSampler`]): a small algebra of
//!   policies (always on/off, trace-id ratio, parent-threshold inheritance,
//!   first-match rules, attribute annotation) that agree on one 56-bit
//!   rejection threshold and one shared random draw, so every service in a
//!   distributed trace reaches the same sampled/not-sampled outcome. The
//!   threshold and the draw travel in the `ot` member of the W3C trace
//!   state, encoded by [`OtelTraceState`].
//! * **A composite bridge** ([`CompositeSampler`]) turning a composable
//!   policy tree into a regular [`ShouldSample`] implementation.
//! * **Classic decision functions**: [`RateLimitingSampler`] (token-bucket
//!   bounded traces per second, built on [`RateLimiter`]) and
//!   [`PerOperationSampler`] (an independent ratio per span name).
//! * **Remotely-configured sampling** ([`AdaptiveSampler`]): a background
//!   task polls a strategy endpoint speaking the Jaeger remote-sampling
//!   protocol and atomically swaps the active policy, without ever blocking
//!   a span-creation call.
//!
//! ```
//! use opentelemetry_sampling::{
//!     ComposableSampler, CompositeSampler, Predicate, SamplingRule, TraceIdRatio,
//! };
//!
//! // Drop health checks, sample a quarter of everything else, and respect
//! // the sampling threshold of the parent span when there is one.
//! let sampler = CompositeSampler::new(ComposableSampler::ParentThreshold(Box::new(
//!     ComposableSampler::RuleBased(vec![
//!         SamplingRule::new(Predicate::span_name_equals("health"), ComposableSampler::AlwaysOff),
//!         SamplingRule::new(
//!             Predicate::match_all(),
//!             ComposableSampler::TraceIdRatio(TraceIdRatio::new(0.25).unwrap()),
//!         ),
//!     ]),
//! )));
//! ```
//!
//! The resulting samplers plug into
//! `opentelemetry_sdk::trace::SdkTracerProvider` via `with_sampler`.
//!
//! ## Crate Feature Flags
//!
//! * `internal-logs` (default): self-diagnostics of the strategy poller via
//!   `tracing`.
//!
//! [OpenTelemetry]: https://opentelemetry.io
//! [`ShouldSample`]: opentelemetry_sdk::trace::ShouldSample
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

mod composable;
mod error;
mod rate_limit;
mod remote;
mod trace_state;

pub use composable::{
    ComposableSampler, CompositeSampler, Predicate, SamplingIntent, SamplingParameters,
    SamplingPolicy, SamplingRule, TraceIdRatio,
};
pub use error::ConfigError;
pub use rate_limit::RateLimiter;
pub use remote::{
    AdaptiveSampler, AdaptiveSamplerBuilder, FetchError, HttpStrategyFetcher,
    OperationSamplingStrategy, PerOperationSampler, PerOperationSamplingStrategies,
    ProbabilisticSamplingStrategy, RateLimitingSampler, RateLimitingSamplingStrategy,
    SamplingStrategyResponse, SamplingStrategyType, StrategyFetcher,
};
pub use trace_state::{OtelTraceState, INVALID_RANDOM_VALUE, INVALID_THRESHOLD, MAX_THRESHOLD};
