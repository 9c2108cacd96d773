//! The operation abstraction and its structural combinators.
//!
//! An [`Operation`] is a named unit of work with a forward action and
//! an optional reverse (restore) action used during compensation.
//! Combinators are operations built from other operations:
//! - `conditional` -- predicate-routed branch between two children
//! - `for_each` -- per-item iteration, sequential or bounded-concurrent
//! - `retry` -- policy-driven re-invocation of one inner operation

pub mod conditional;
pub mod for_each;
pub mod retry;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::foundry::Foundry;

pub use conditional::Conditional;
pub use for_each::{ForEach, IterationMode};
pub use retry::Retry;

// ---------------------------------------------------------------------------
// OperationError
// ---------------------------------------------------------------------------

/// Errors raised by an operation's forward or restore action.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The action failed with a plain message.
    #[error("{0}")]
    Failed(String),

    /// A precondition check rejected the input before the operation ran.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The execution was cancelled at a suspension point. Never
    /// triggers compensation.
    #[error("operation cancelled")]
    Cancelled,

    /// An opaque underlying cause from caller code.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OperationError {
    /// True when this error is a cancellation signal rather than a
    /// real failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, OperationError::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Operation trait
// ---------------------------------------------------------------------------

/// A named unit of work driven by the orchestrator.
///
/// Operations are constructed before the workflow is built and never
/// mutated afterward: any per-execution state belongs in the foundry's
/// property store, not on the operation. The same operation value may
/// be invoked zero or more times across executions.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Stable identity of this operation instance.
    fn id(&self) -> Uuid;

    /// Display name used in events, logs, and reports.
    fn name(&self) -> &str;

    /// Whether this operation has a meaningful restore action. Only
    /// capable operations are invoked during compensation.
    fn supports_restore(&self) -> bool {
        false
    }

    /// Forward action: consumes the previous operation's output and
    /// produces a new output.
    async fn execute(&self, input: Value, ctx: &Foundry) -> Result<Value, OperationError>;

    /// Reverse action: undoes a successful forward run, given that
    /// run's output. No-op unless [`supports_restore`] is true.
    ///
    /// [`supports_restore`]: Operation::supports_restore
    async fn restore(&self, _output: Value, _ctx: &Foundry) -> Result<(), OperationError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FnOperation
// ---------------------------------------------------------------------------

type ForwardFn = dyn Fn(Value, &Foundry) -> Result<Value, OperationError> + Send + Sync;
type RestoreFn = dyn Fn(Value, &Foundry) -> Result<(), OperationError> + Send + Sync;

/// Closure-backed operation for synchronous work.
///
/// Operations with real I/O should implement [`Operation`] directly;
/// this adapter covers the common case of pure transformations and
/// property-store bookkeeping.
pub struct FnOperation {
    id: Uuid,
    name: String,
    forward: Box<ForwardFn>,
    restore: Option<Box<RestoreFn>>,
}

impl FnOperation {
    /// Create an operation from a forward closure. The result has no
    /// restore action until [`with_restore`] adds one.
    ///
    /// [`with_restore`]: FnOperation::with_restore
    pub fn new<F>(name: impl Into<String>, forward: F) -> Self
    where
        F: Fn(Value, &Foundry) -> Result<Value, OperationError> + Send + Sync + 'static,
    {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            forward: Box::new(forward),
            restore: None,
        }
    }

    /// Attach a restore closure, making the operation compensation-capable.
    pub fn with_restore<R>(mut self, restore: R) -> Self
    where
        R: Fn(Value, &Foundry) -> Result<(), OperationError> + Send + Sync + 'static,
    {
        self.restore = Some(Box::new(restore));
        self
    }
}

#[async_trait]
impl Operation for FnOperation {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_restore(&self) -> bool {
        self.restore.is_some()
    }

    async fn execute(&self, input: Value, ctx: &Foundry) -> Result<Value, OperationError> {
        (self.forward)(input, ctx)
    }

    async fn restore(&self, output: Value, ctx: &Foundry) -> Result<(), OperationError> {
        match &self.restore {
            Some(restore) => restore(output, ctx),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for FnOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnOperation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("supports_restore", &self.restore.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
