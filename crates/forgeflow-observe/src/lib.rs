//! Observability for the Forgeflow engine: subscriber setup, the
//! event-to-log bridge, and the JSONL audit trail.

pub mod audit;
pub mod event_log;
pub mod tracing_setup;
