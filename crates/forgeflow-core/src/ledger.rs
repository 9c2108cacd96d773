//! The compensation ledger: which operations completed, in what order.
//!
//! Append-only during forward execution. Each entry pairs an operation
//! with the forward output it produced, so the reverse action gets the
//! exact value it must undo. The smith drains the ledger exactly once,
//! in reverse completion order, when a failure triggers compensation.
//! Appends may come from concurrent for-each items, so the ledger
//! serializes internally.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::operation::Operation;

/// One successfully completed forward action.
#[derive(Clone)]
pub struct LedgerEntry {
    /// The operation that completed.
    pub operation: Arc<dyn Operation>,
    /// Output of the forward action, passed to `restore` verbatim.
    pub output: Value,
    /// When the forward action completed.
    pub completed_at: DateTime<Utc>,
}

impl std::fmt::Debug for LedgerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEntry")
            .field("operation", &self.operation.name())
            .field("completed_at", &self.completed_at)
            .finish()
    }
}

/// Ordered record of completed operations awaiting possible compensation.
#[derive(Default)]
pub struct CompensationLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl CompensationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed forward action. Called by the smith for
    /// top-level operations and by combinators for their children.
    pub fn record(&self, operation: Arc<dyn Operation>, output: Value) {
        self.entries
            .lock()
            .expect("ledger lock poisoned")
            .push(LedgerEntry {
                operation,
                output,
                completed_at: Utc::now(),
            });
    }

    /// Number of recorded completions.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("ledger lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display names of completed operations, in completion order.
    pub fn completed_names(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("ledger lock poisoned")
            .iter()
            .map(|entry| entry.operation.name().to_string())
            .collect()
    }

    /// Discard all entries. Called when a new execution begins on a
    /// reused foundry, so only the current run's work is ever
    /// compensated.
    pub(crate) fn clear(&self) {
        self.entries.lock().expect("ledger lock poisoned").clear();
    }

    /// Take every entry in reverse completion order, leaving the
    /// ledger empty. Each entry is compensated at most once.
    pub(crate) fn drain_reverse(&self) -> Vec<LedgerEntry> {
        let mut entries = self.entries.lock().expect("ledger lock poisoned");
        let mut drained = std::mem::take(&mut *entries);
        drained.reverse();
        drained
    }
}

impl std::fmt::Debug for CompensationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompensationLedger")
            .field("entries", &self.completed_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
