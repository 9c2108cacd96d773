//! Forgeflow execution engine.
//!
//! The engine drives a named sequence of operations against a shared
//! execution context (the [`Foundry`]), with branching, iteration,
//! retry, bounded parallel fan-out, and automatic reverse-order
//! compensation when execution fails partway through.
//!
//! - `operation` -- the operation trait and its structural combinators
//! - `middleware` -- per-operation decorator chain
//! - `foundry` -- per-execution context: property store, ledger, events
//! - `workflow` -- immutable operation sequence + builder
//! - `smith` -- the orchestrator state machine
//! - `gate` -- process-wide workflow admission control
//! - `event` -- lifecycle event bus
//!
//! This crate depends only on `forgeflow-types` -- observability and
//! the CLI layer on top of it.

pub mod event;
pub mod foundry;
pub mod gate;
pub mod ledger;
pub mod middleware;
pub mod operation;
pub mod smith;
pub mod workflow;

pub use event::EventBus;
pub use foundry::{Foundry, FoundryError, ServiceRegistry};
pub use gate::{AdmissionError, AdmissionGate, AdmissionPermit};
pub use ledger::{CompensationLedger, LedgerEntry};
pub use middleware::{default_chain, MiddlewareLink, Next};
pub use operation::{
    Conditional, FnOperation, ForEach, IterationMode, Operation, OperationError, Retry,
};
pub use smith::{ForgeError, ForgeReport, Smith};
pub use workflow::{Workflow, WorkflowBuilder};
