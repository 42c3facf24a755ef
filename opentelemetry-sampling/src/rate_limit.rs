//! Token-bucket credit primitive backing rate-limited sampling.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::ConfigError;

/// A token bucket accruing `credits_per_second` up to `max_balance`.
///
/// The balance and timestamp live behind one short critical section; callers
/// never suspend while holding it, so the limiter is safe under arbitrary
/// concurrent use with no lost credit and no over-admission.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    credits_per_second: f64,
    max_balance: f64,
    inner: Arc<Mutex<RateLimiterState>>,
}

#[derive(Debug)]
struct RateLimiterState {
    balance: f64,
    last_timestamp: Instant,
}

impl RateLimiter {
    /// Create a limiter starting at full balance.
    ///
    /// Both parameters must be positive and finite; invalid values are a
    /// configuration defect and are rejected here, not at use time.
    pub fn new(credits_per_second: f64, max_balance: f64) -> Result<Self, ConfigError> {
        if !credits_per_second.is_finite() || credits_per_second <= 0.0 {
            return Err(ConfigError::InvalidRate {
                name: "credits_per_second",
                value: credits_per_second,
            });
        }
        if !max_balance.is_finite() || max_balance <= 0.0 {
            return Err(ConfigError::InvalidRate {
                name: "max_balance",
                value: max_balance,
            });
        }
        Ok(RateLimiter {
            credits_per_second,
            max_balance,
            inner: Arc::new(Mutex::new(RateLimiterState {
                balance: max_balance,
                last_timestamp: Instant::now(),
            })),
        })
    }

    /// Admit the request and spend `cost` credits if the balance allows it.
    pub fn check_credit(&self, cost: f64) -> bool {
        self.check_credit_at(cost, Instant::now())
    }

    fn check_credit_at(&self, cost: f64, now: Instant) -> bool {
        let mut state = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Instant is monotonic; duration_since saturates to zero if another
        // caller already advanced the timestamp past `now`.
        let elapsed = now.duration_since(state.last_timestamp);
        state.balance = (state.balance + elapsed.as_secs_f64() * self.credits_per_second)
            .min(self.max_balance);
        state.last_timestamp = now;
        if state.balance >= cost {
            state.balance -= cost;
            true
        } else {
            false
        }
    }
}
