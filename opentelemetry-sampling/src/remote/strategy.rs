//! Wire types for the Jaeger remote-sampling strategy response.
//!
//! The response is treated as a union: consumers check `operation_sampling`
//! first, then `rate_limiting_sampling`, then `probabilistic_sampling`. The
//! legacy `strategy_type` discriminator predates per-operation strategies
//! and is parsed but not trusted.

use serde::{Deserialize, Serialize};

/// Samples traces with a fixed probability.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbabilisticSamplingStrategy {
    /// Sampling probability in `[0.0, 1.0]`.
    pub sampling_rate: f64,
}

/// Samples a bounded number of traces per second.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitingSamplingStrategy {
    /// Upper bound of sampled traces per second.
    pub max_traces_per_second: f64,
}

/// The sampling strategy for one operation (span name).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationSamplingStrategy {
    /// The operation this strategy applies to.
    pub operation: String,
    /// Only probabilistic sampling is supported per operation.
    pub probabilistic_sampling: ProbabilisticSamplingStrategy,
}

/// Per-operation strategies plus service-wide defaults, for services whose
/// endpoints receive vastly different traffic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerOperationSamplingStrategies {
    /// Probability for spans matching none of the per-operation strategies.
    pub default_sampling_probability: f64,
    /// Lower-bound traces per second, local to one service instance. Almost
    /// no SDK honors it; accepted for wire compatibility.
    pub default_lower_bound_traces_per_second: f64,
    /// Strategies for individual operations.
    pub per_operation_strategies: Vec<OperationSamplingStrategy>,
    /// Upper-bound traces per second. Accepted for wire compatibility.
    pub default_upper_bound_traces_per_second: f64,
}

/// The overall strategy for one service, as returned by the remote endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingStrategyResponse {
    /// Legacy discriminator; prefer checking the strategy fields directly.
    pub strategy_type: SamplingStrategyType,
    /// Present for probabilistic strategies.
    pub probabilistic_sampling: Option<ProbabilisticSamplingStrategy>,
    /// Present for rate-limiting strategies.
    pub rate_limiting_sampling: Option<RateLimitingSamplingStrategy>,
    /// Present for per-operation strategies; wins over the other two.
    pub operation_sampling: Option<PerOperationSamplingStrategies>,
}

/// See [`SamplingStrategyResponse::strategy_type`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplingStrategyType {
    /// Fixed-probability sampling.
    #[default]
    Probabilistic,
    /// Bounded traces per second.
    RateLimiting,
}
