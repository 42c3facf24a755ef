use thiserror::Error;

/// Construction-time configuration failures.
///
/// All sampler configuration is validated eagerly, before any traffic is
/// processed; a decision function that constructed successfully cannot fail
/// at decision time.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A sampling ratio outside the closed interval `[0.0, 1.0]`.
    #[error("sampling ratio must be within [0.0, 1.0], got {0}")]
    InvalidRatio(f64),

    /// A rate or balance that is not a positive, finite number.
    #[error("{name} must be positive and finite, got {value}")]
    InvalidRate {
        /// Name of the offending parameter.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The remote sampling service name is empty.
    #[error("service name cannot be empty")]
    EmptyServiceName,

    /// The remote sampling endpoint could not be parsed as a URL.
    #[error("invalid remote sampling endpoint: {0}")]
    InvalidEndpoint(String),

    /// The strategy polling interval is zero.
    #[error("polling interval must be greater than zero")]
    InvalidInterval,

    /// The strategy request timeout is zero.
    #[error("request timeout must be greater than zero")]
    InvalidTimeout,
}
