//! Shared domain types for the Forgeflow workflow engine.
//!
//! Everything here is plain data: serde-able configuration, retry
//! policies, lifecycle events, and execution reports. The engine itself
//! (operations, combinators, orchestrator) lives in `forgeflow-core`.

pub mod config;
pub mod event;
pub mod retry;
pub mod workflow;
