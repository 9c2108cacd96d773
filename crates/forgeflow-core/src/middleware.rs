//! Middleware pipeline: a chain-of-responsibility around one operation
//! invocation.
//!
//! Registration order defines wrapping order: the first-registered link
//! is outermost (runs first on the way in, last on the way out); the
//! last-registered link sits closest to the operation. A link receives
//! a [`Next`] continuation it may call at most once -- not calling it
//! short-circuits the operation.
//!
//! Built-in links: [`ErrorHandlingLink`] (the single place an error may
//! be swallowed), [`TimingLink`], [`LoggingLink`], [`ValidationLink`].
//! [`default_chain`] assembles them in the conventional order:
//! error-handling outermost, then timing, then logging innermost.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::Instrument;

use crate::foundry::Foundry;
use crate::operation::{Operation, OperationError};
use forgeflow_types::config::MiddlewareToggles;

// ---------------------------------------------------------------------------
// MiddlewareLink
// ---------------------------------------------------------------------------

/// Decorator around a single operation's forward invocation.
#[async_trait]
pub trait MiddlewareLink: Send + Sync {
    /// Display name used in logs.
    fn name(&self) -> &str;

    /// Run code around (or instead of) the rest of the chain.
    async fn handle(
        &self,
        op: &dyn Operation,
        ctx: &Foundry,
        input: Value,
        next: Next<'_>,
    ) -> Result<Value, OperationError>;
}

/// The rest of the chain for one invocation. Consuming `run` enforces
/// the call-at-most-once contract.
pub struct Next<'a> {
    chain: &'a [Arc<dyn MiddlewareLink>],
    op: &'a dyn Operation,
}

impl<'a> Next<'a> {
    /// Invoke the remaining links and, innermost, the operation itself.
    pub async fn run(self, ctx: &Foundry, input: Value) -> Result<Value, OperationError> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    chain: rest,
                    op: self.op,
                };
                head.handle(self.op, ctx, input, next).await
            }
            None => self.op.execute(input, ctx).await,
        }
    }
}

/// Drive one operation through a middleware chain.
pub async fn run_chain(
    chain: &[Arc<dyn MiddlewareLink>],
    op: &dyn Operation,
    ctx: &Foundry,
    input: Value,
) -> Result<Value, OperationError> {
    Next { chain, op }.run(ctx, input).await
}

// ---------------------------------------------------------------------------
// Built-in links
// ---------------------------------------------------------------------------

/// Outermost link: sees every error from the inner layers and the
/// operation. With a fallback configured it swallows the error and
/// substitutes the fallback value; cancellation is never swallowed.
pub struct ErrorHandlingLink {
    fallback: Option<Value>,
}

impl ErrorHandlingLink {
    pub fn new() -> Self {
        Self { fallback: None }
    }

    /// Substitute this value for any non-cancellation error.
    pub fn with_fallback(fallback: Value) -> Self {
        Self {
            fallback: Some(fallback),
        }
    }
}

impl Default for ErrorHandlingLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MiddlewareLink for ErrorHandlingLink {
    fn name(&self) -> &str {
        "error-handling"
    }

    async fn handle(
        &self,
        op: &dyn Operation,
        ctx: &Foundry,
        input: Value,
        next: Next<'_>,
    ) -> Result<Value, OperationError> {
        match next.run(ctx, input).await {
            Err(err) if !err.is_cancellation() => {
                if let Some(fallback) = &self.fallback {
                    tracing::warn!(
                        operation = op.name(),
                        error = %err,
                        "operation failed, substituting fallback value"
                    );
                    Ok(fallback.clone())
                } else {
                    Err(err)
                }
            }
            other => other,
        }
    }
}

/// Measures everything inside it and annotates the property store with
/// `timing.<operation>.ms`.
pub struct TimingLink;

#[async_trait]
impl MiddlewareLink for TimingLink {
    fn name(&self) -> &str {
        "timing"
    }

    async fn handle(
        &self,
        op: &dyn Operation,
        ctx: &Foundry,
        input: Value,
        next: Next<'_>,
    ) -> Result<Value, OperationError> {
        let started = Instant::now();
        let result = next.run(ctx, input).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        ctx.set_property(format!("timing.{}.ms", op.name()), json!(elapsed_ms));
        tracing::debug!(operation = op.name(), elapsed_ms, "operation timed");
        result
    }
}

/// Innermost link: records start/finish/failure inside a span carrying
/// the execution and operation fields, so nested calls inherit them.
pub struct LoggingLink;

#[async_trait]
impl MiddlewareLink for LoggingLink {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(
        &self,
        op: &dyn Operation,
        ctx: &Foundry,
        input: Value,
        next: Next<'_>,
    ) -> Result<Value, OperationError> {
        let span = tracing::info_span!(
            "operation",
            execution_id = %ctx.id(),
            operation = op.name(),
        );
        async {
            tracing::debug!("operation starting");
            let result = next.run(ctx, input).await;
            match &result {
                Ok(_) => tracing::debug!("operation completed"),
                Err(err) if err.is_cancellation() => {
                    tracing::debug!("operation cancelled");
                }
                Err(err) => tracing::error!(error = %err, "operation failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

type CheckFn = dyn Fn(&Value, &Foundry) -> Result<(), String> + Send + Sync;

/// Rejects an invocation before the operation runs. A failing check
/// short-circuits the chain: the continuation is never called.
pub struct ValidationLink {
    check: Box<CheckFn>,
}

impl ValidationLink {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&Value, &Foundry) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            check: Box::new(check),
        }
    }
}

#[async_trait]
impl MiddlewareLink for ValidationLink {
    fn name(&self) -> &str {
        "validation"
    }

    async fn handle(
        &self,
        op: &dyn Operation,
        ctx: &Foundry,
        input: Value,
        next: Next<'_>,
    ) -> Result<Value, OperationError> {
        if let Err(message) = (self.check)(&input, ctx) {
            tracing::warn!(operation = op.name(), reason = %message, "input rejected by validation");
            return Err(OperationError::Validation(message));
        }
        next.run(ctx, input).await
    }
}

// ---------------------------------------------------------------------------
// Default assembly
// ---------------------------------------------------------------------------

/// Build the conventional chain from config toggles: error-handling
/// outermost, then timing, then logging innermost.
pub fn default_chain(toggles: &MiddlewareToggles) -> Vec<Arc<dyn MiddlewareLink>> {
    let mut chain: Vec<Arc<dyn MiddlewareLink>> = Vec::new();
    if toggles.error_handling {
        chain.push(Arc::new(ErrorHandlingLink::new()));
    }
    if toggles.timing {
        chain.push(Arc::new(TimingLink));
    }
    if toggles.logging {
        chain.push(Arc::new(LoggingLink));
    }
    chain
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
