//! Retry combinator: policy-driven re-invocation of one inner
//! operation.
//!
//! The combinator owns the 1-based attempt counter; the policy is pure.
//! `max_attempts` caps invocations inclusively, so a policy with
//! `max_attempts = 3` makes at most 3 forward calls. When attempts are
//! exhausted the *last* underlying error propagates unmodified, so
//! callers can match the original cause. The inter-attempt delay is a
//! cancellable suspension point.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::foundry::Foundry;
use forgeflow_types::retry::RetryPolicy;

use super::{Operation, OperationError};

/// Wraps one inner operation with a [`RetryPolicy`].
pub struct Retry {
    id: Uuid,
    name: String,
    inner: Arc<dyn Operation>,
    policy: RetryPolicy,
}

impl Retry {
    pub fn new(name: impl Into<String>, inner: Arc<dyn Operation>, policy: RetryPolicy) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            inner,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Operation for Retry {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_restore(&self) -> bool {
        self.inner.supports_restore()
    }

    async fn execute(&self, input: Value, ctx: &Foundry) -> Result<Value, OperationError> {
        let token = ctx.cancellation_token();
        let mut attempt: u32 = 1;

        loop {
            match self.inner.execute(input.clone(), ctx).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_cancellation() => return Err(err),
                Err(err) => {
                    if !self.policy.permits(attempt) {
                        tracing::warn!(
                            operation = self.name.as_str(),
                            inner = self.inner.name(),
                            attempts = attempt,
                            error = %err,
                            "retry attempts exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.policy.delay(attempt);
                    tracing::debug!(
                        operation = self.name.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying after delay"
                    );
                    tokio::select! {
                        _ = token.cancelled() => return Err(OperationError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Delegates directly to the inner operation's reverse action.
    async fn restore(&self, output: Value, ctx: &Foundry) -> Result<(), OperationError> {
        self.inner.restore(output, ctx).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::FnOperation;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fixed(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::FixedInterval {
            delay_ms: 5,
            max_attempts,
        }
    }

    /// Operation that fails until a set number of invocations.
    fn flaky(succeed_on: u32, calls: Arc<AtomicU32>) -> Arc<dyn Operation> {
        Arc::new(FnOperation::new("flaky", move |input, _| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= succeed_on {
                Ok(input)
            } else {
                Err(OperationError::Failed(format!("attempt {n} failed")))
            }
        }))
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let foundry = Foundry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let retry = Retry::new("flaky-retry", flaky(3, Arc::clone(&calls)), fixed(3));

        let out = retry.execute(json!("payload"), &foundry).await.unwrap();
        assert_eq!(out, json!("payload"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_propagates_last_error_unmodified() {
        let foundry = Foundry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let retry = Retry::new("doomed", flaky(10, Arc::clone(&calls)), fixed(3));

        let err = retry.execute(json!(null), &foundry).await.unwrap_err();
        // Exactly 3 invocations, and the surfaced error is attempt 3's
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, OperationError::Failed(msg) if msg == "attempt 3 failed"));
    }

    #[tokio::test]
    async fn max_attempts_one_means_single_invocation() {
        let foundry = Foundry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let retry = Retry::new("once", flaky(10, Arc::clone(&calls)), fixed(1));

        retry.execute(json!(null), &foundry).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_is_not_retried() {
        let foundry = Foundry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let inner: Arc<dyn Operation> = Arc::new(FnOperation::new("cancelled", move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Err(OperationError::Cancelled)
        }));
        let retry = Retry::new("no-retry-on-cancel", inner, fixed(5));

        let err = retry.execute(json!(null), &foundry).await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_during_delay_aborts() {
        let foundry = Foundry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let retry = Retry::new(
            "slow-retry",
            flaky(10, Arc::clone(&calls)),
            RetryPolicy::FixedInterval {
                delay_ms: 10_000,
                max_attempts: 3,
            },
        );

        let cancel_after = {
            let foundry_token = foundry.cancellation_token();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                foundry_token.cancel();
            })
        };

        let err = retry.execute(json!(null), &foundry).await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        cancel_after.await.unwrap();
    }

    #[tokio::test]
    async fn restore_delegates_to_inner() {
        let foundry = Foundry::new();
        let inner: Arc<dyn Operation> = Arc::new(
            FnOperation::new("reserve", |input, _| Ok(input)).with_restore(|output, ctx| {
                ctx.set_property("released", output.clone());
                Ok(())
            }),
        );
        let retry = Retry::new("retryable-reserve", inner, fixed(3));

        assert!(retry.supports_restore());
        retry.restore(json!("res-42"), &foundry).await.unwrap();
        assert_eq!(foundry.property("released"), Some(json!("res-42")));
    }
}
