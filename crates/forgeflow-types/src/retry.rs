//! Retry policies for the retry combinator.
//!
//! A policy is a pure function of the 1-based attempt number: whether
//! another attempt is permitted and how long to wait before it. The
//! retry combinator in `forgeflow-core` owns the attempt counter;
//! policies carry no state across calls.
//!
//! `max_attempts` is an inclusive cap on *invocations*, not retries:
//! `max_attempts = 3` means at most 3 forward calls total.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default invocation cap when a policy omits `max_attempts`.
fn default_max_attempts() -> u32 {
    3
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Strategy for retrying a failed operation.
///
/// Tagged by `strategy` to keep TOML/JSON configuration flat:
/// ```toml
/// strategy = "exponential_backoff"
/// base_delay_ms = 100
/// multiplier = 2.0
/// max_delay_ms = 5000
/// max_attempts = 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Constant delay between attempts.
    FixedInterval {
        delay_ms: u64,
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
    },
    /// Delay grows as `base * multiplier^(attempt - 1)`, capped.
    ExponentialBackoff {
        base_delay_ms: u64,
        multiplier: f64,
        max_delay_ms: u64,
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
    },
    /// Uniformly random delay in `[min_delay_ms, max_delay_ms]`.
    RandomInterval {
        min_delay_ms: u64,
        max_delay_ms: u64,
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
    },
}

impl RetryPolicy {
    /// Maximum number of forward invocations this policy allows.
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::FixedInterval { max_attempts, .. }
            | RetryPolicy::ExponentialBackoff { max_attempts, .. }
            | RetryPolicy::RandomInterval { max_attempts, .. } => *max_attempts,
        }
    }

    /// Whether another attempt may follow the given (1-based) attempt.
    pub fn permits(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            RetryPolicy::FixedInterval { delay_ms, .. } => Duration::from_millis(*delay_ms),
            RetryPolicy::ExponentialBackoff {
                base_delay_ms,
                multiplier,
                max_delay_ms,
                ..
            } => {
                let exp = multiplier.powi(attempt.saturating_sub(1) as i32);
                let raw = (*base_delay_ms as f64 * exp).round();
                let capped = raw.min(*max_delay_ms as f64).max(0.0) as u64;
                Duration::from_millis(capped)
            }
            RetryPolicy::RandomInterval {
                min_delay_ms,
                max_delay_ms,
                ..
            } => {
                let (lo, hi) = (
                    (*min_delay_ms).min(*max_delay_ms),
                    (*min_delay_ms).max(*max_delay_ms),
                );
                let ms = rand::rng().random_range(lo..=hi);
                Duration::from_millis(ms)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
