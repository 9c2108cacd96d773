//! Lifecycle event types for the Forgeflow event bus.
//!
//! `ForgeEvent` is the unified event type broadcast during workflow
//! execution. Consumers (audit writer, structured-logging bridge,
//! metrics) subscribe without the engine knowing they exist. All
//! variants are Clone + Send + Sync for use with tokio broadcast
//! channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted while the orchestrator drives a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForgeEvent {
    /// A workflow execution has started (the foundry is now frozen).
    WorkflowStarted {
        execution_id: Uuid,
        workflow: String,
        version: String,
        at: DateTime<Utc>,
    },

    /// An operation is about to run through the middleware chain.
    OperationStarted {
        execution_id: Uuid,
        operation_id: Uuid,
        operation: String,
    },

    /// An operation's forward action completed successfully.
    OperationCompleted {
        execution_id: Uuid,
        operation_id: Uuid,
        operation: String,
        duration_ms: u64,
    },

    /// An operation's forward action failed.
    OperationFailed {
        execution_id: Uuid,
        operation_id: Uuid,
        operation: String,
        error: String,
        /// False in continue-on-error runs where the loop keeps going.
        halts_workflow: bool,
    },

    /// A failure triggered the reverse-order compensation walk.
    CompensationTriggered {
        execution_id: Uuid,
        /// Operation whose failure triggered compensation.
        trigger_operation: String,
        /// Number of ledger entries about to be walked.
        pending: u32,
    },

    /// A ledger entry's restore action is starting.
    RestoreStarted {
        execution_id: Uuid,
        operation: String,
    },

    /// A ledger entry restored successfully.
    RestoreCompleted {
        execution_id: Uuid,
        operation: String,
        duration_ms: u64,
    },

    /// A ledger entry's restore action failed (walk continues).
    RestoreFailed {
        execution_id: Uuid,
        operation: String,
        error: String,
    },

    /// The compensation walk finished.
    CompensationCompleted {
        execution_id: Uuid,
        restored: u32,
        failed: u32,
        duration_ms: u64,
    },

    /// All operations completed; the foundry has been thawed.
    WorkflowCompleted {
        execution_id: Uuid,
        workflow: String,
        duration_ms: u64,
        operations_completed: u32,
    },

    /// The workflow failed (after compensation, if any ran).
    WorkflowFailed {
        execution_id: Uuid,
        workflow: String,
        error: String,
    },

    /// The workflow was cancelled; compensation never ran.
    WorkflowCancelled {
        execution_id: Uuid,
        workflow: String,
    },
}

impl ForgeEvent {
    /// The execution this event belongs to.
    pub fn execution_id(&self) -> Uuid {
        match self {
            ForgeEvent::WorkflowStarted { execution_id, .. }
            | ForgeEvent::OperationStarted { execution_id, .. }
            | ForgeEvent::OperationCompleted { execution_id, .. }
            | ForgeEvent::OperationFailed { execution_id, .. }
            | ForgeEvent::CompensationTriggered { execution_id, .. }
            | ForgeEvent::RestoreStarted { execution_id, .. }
            | ForgeEvent::RestoreCompleted { execution_id, .. }
            | ForgeEvent::RestoreFailed { execution_id, .. }
            | ForgeEvent::CompensationCompleted { execution_id, .. }
            | ForgeEvent::WorkflowCompleted { execution_id, .. }
            | ForgeEvent::WorkflowFailed { execution_id, .. }
            | ForgeEvent::WorkflowCancelled { execution_id, .. } => *execution_id,
        }
    }

    /// True for the failure-shaped variants.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ForgeEvent::OperationFailed { .. }
                | ForgeEvent::RestoreFailed { .. }
                | ForgeEvent::WorkflowFailed { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_started_serde_roundtrip() {
        let event = ForgeEvent::WorkflowStarted {
            execution_id: Uuid::now_v7(),
            workflow: "order-fulfilment".to_string(),
            version: "1.0.0".to_string(),
            at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"workflow_started\""));
        let parsed: ForgeEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ForgeEvent::WorkflowStarted { .. }));
    }

    #[test]
    fn execution_id_accessor_covers_all_variants() {
        let id = Uuid::now_v7();
        let event = ForgeEvent::CompensationCompleted {
            execution_id: id,
            restored: 2,
            failed: 0,
            duration_ms: 7,
        };
        assert_eq!(event.execution_id(), id);
    }

    #[test]
    fn failure_classification() {
        let id = Uuid::now_v7();
        let failed = ForgeEvent::OperationFailed {
            execution_id: id,
            operation_id: Uuid::now_v7(),
            operation: "charge-card".to_string(),
            error: "declined".to_string(),
            halts_workflow: true,
        };
        assert!(failed.is_failure());

        let completed = ForgeEvent::WorkflowCompleted {
            execution_id: id,
            workflow: "order-fulfilment".to_string(),
            duration_ms: 42,
            operations_completed: 3,
        };
        assert!(!completed.is_failure());
    }
}
