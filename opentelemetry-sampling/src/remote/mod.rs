//! Remotely-configured (adaptive) sampling.
//!
//! A background task polls a strategy endpoint speaking the Jaeger
//! remote-sampling protocol, translates each response into a concrete
//! decision function and publishes it atomically; span-start calls read the
//! active policy with a single atomic load and are never blocked by a poll.

mod fetcher;
mod per_operation;
mod rate_limiting;
mod sampler;
mod sampling_strategy;
mod strategy;

pub use fetcher::{FetchError, HttpStrategyFetcher, StrategyFetcher};
pub use per_operation::PerOperationSampler;
pub use rate_limiting::RateLimitingSampler;
pub use sampler::{AdaptiveSampler, AdaptiveSamplerBuilder};
pub use strategy::{
    OperationSamplingStrategy, PerOperationSamplingStrategies, ProbabilisticSamplingStrategy,
    RateLimitingSamplingStrategy, SamplingStrategyResponse, SamplingStrategyType,
};
