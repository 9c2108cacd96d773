//! Workflow-level options and execution reporting types.
//!
//! The workflow itself (an ordered list of operation trait objects) is
//! built in `forgeflow-core`; this module holds the plain-data parts
//! that travel with it: execution options, run status, and the
//! compensation report attached to failed executions.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// WorkflowOptions
// ---------------------------------------------------------------------------

/// Execution options attached to a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowOptions {
    /// When true, a failing operation does not stop the run; failures
    /// are collected and surfaced in aggregate at the end.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Per-workflow timeout in seconds (None = engine default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            timeout_secs: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionStatus
// ---------------------------------------------------------------------------

/// State machine position of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Execution has not begun; the foundry is still mutable.
    NotStarted,
    /// Operations are being driven forward.
    Running,
    /// All operations completed.
    Completed,
    /// A failure occurred and the ledger is being walked in reverse.
    CompensationRunning,
    /// Compensation finished; the original failure is being surfaced.
    CompensatedFailure,
    /// Execution was cancelled; compensation never ran.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Compensation reporting
// ---------------------------------------------------------------------------

/// Outcome of one reverse-order compensation walk.
///
/// Restore failures are best-effort: they are collected here rather
/// than halting the walk, and the report rides along with the original
/// triggering failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompensationReport {
    /// Number of operations restored successfully.
    pub restored: u32,
    /// Number of restore attempts that failed.
    pub failed: u32,
    /// Details for each failed restore, in walk (LIFO) order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RestoreFailure>,
    /// Total wall-clock duration of the walk.
    pub duration_ms: u64,
}

impl CompensationReport {
    /// True when every capable ledger entry restored cleanly.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// A single failed restore attempt during compensation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestoreFailure {
    /// Display name of the operation whose restore failed.
    pub operation: String,
    /// Error message from the restore action.
    pub error: String,
}

/// One recorded operation failure in a continue-on-error run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationFailure {
    /// Display name of the failed operation.
    pub operation: String,
    /// Error message from the forward action.
    pub error: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_is_fail_fast() {
        let opts = WorkflowOptions::default();
        assert!(!opts.continue_on_error);
        assert!(opts.timeout_secs.is_none());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: WorkflowOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, WorkflowOptions::default());
    }

    #[test]
    fn compensation_report_clean() {
        let report = CompensationReport {
            restored: 2,
            ..Default::default()
        };
        assert!(report.is_clean());

        let report = CompensationReport {
            restored: 1,
            failed: 1,
            failures: vec![RestoreFailure {
                operation: "reserve-stock".to_string(),
                error: "connection refused".to_string(),
            }],
            duration_ms: 12,
        };
        assert!(!report.is_clean());
    }

    #[test]
    fn execution_status_serde_roundtrip() {
        let json = serde_json::to_string(&ExecutionStatus::CompensationRunning).unwrap();
        assert_eq!(json, "\"compensation_running\"");
        let back: ExecutionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ExecutionStatus::CompensationRunning);
    }
}
