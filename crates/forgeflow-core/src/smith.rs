//! The smith: orchestrator that drives one workflow execution against
//! a foundry.
//!
//! State machine per execution:
//! `NotStarted -> Running -> (Completed | CompensationRunning ->
//! CompensatedFailure)`, with a cancellation path that bypasses
//! compensation entirely. The smith freezes the foundry for the
//! duration of one `forge` call, routes every operation through the
//! middleware chain, appends successes to the compensation ledger, and
//! walks the ledger in reverse (best-effort) when a failure stops
//! forward progress. Process-wide workflow concurrency is throttled by
//! a shared [`AdmissionGate`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::foundry::{Foundry, FoundryError};
use crate::gate::AdmissionGate;
use crate::middleware;
use crate::operation::OperationError;
use crate::workflow::Workflow;
use forgeflow_types::event::ForgeEvent;
use forgeflow_types::workflow::{
    CompensationReport, ExecutionStatus, OperationFailure, RestoreFailure,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default workflow-level timeout (30 minutes).
pub const DEFAULT_WORKFLOW_TIMEOUT_SECS: u64 = 1800;

// ---------------------------------------------------------------------------
// ForgeReport
// ---------------------------------------------------------------------------

/// Result of a completed workflow execution.
#[derive(Debug, Clone)]
pub struct ForgeReport {
    /// The execution (foundry) ID.
    pub execution_id: Uuid,
    /// Terminal state machine position (always `Completed` here; the
    /// failing positions ride on [`ForgeError`]).
    pub status: ExecutionStatus,
    /// Workflow name.
    pub workflow: String,
    /// Output of the final operation.
    pub output: Value,
    /// Names of completed operations, in completion order (including
    /// combinator children).
    pub completed_operations: Vec<String>,
    /// Total wall-clock duration.
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// ForgeError
// ---------------------------------------------------------------------------

/// Errors surfaced by one `forge` call.
///
/// Failures that stopped forward progress carry the compensation
/// report for the reverse walk that followed; the original triggering
/// cause is preserved, never replaced by a synthetic error.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// An operation failed and the workflow is fail-fast.
    #[error("operation '{operation}' failed: {source}")]
    OperationFailed {
        operation: String,
        #[source]
        source: OperationError,
        compensation: CompensationReport,
    },

    /// One or more operations failed in a continue-on-error workflow.
    #[error("workflow failed: {} operation(s) failed, first '{}'",
        failures.len(),
        failures.first().map(|f| f.operation.as_str()).unwrap_or("?"))]
    Aggregate {
        failures: Vec<OperationFailure>,
        compensation: CompensationReport,
    },

    /// The workflow exceeded its timeout.
    #[error("workflow timed out")]
    Timeout { compensation: CompensationReport },

    /// The execution was cancelled; compensation never ran.
    #[error("workflow cancelled")]
    Cancelled,

    /// Precondition failure from the foundry (frozen, already bound).
    #[error("foundry error: {0}")]
    Foundry(#[from] FoundryError),
}

impl ForgeError {
    /// The compensation report, for the variants that compensated.
    pub fn compensation(&self) -> Option<&CompensationReport> {
        match self {
            ForgeError::OperationFailed { compensation, .. }
            | ForgeError::Aggregate { compensation, .. }
            | ForgeError::Timeout { compensation } => Some(compensation),
            ForgeError::Cancelled | ForgeError::Foundry(_) => None,
        }
    }

    /// Terminal state machine position for this failure.
    pub fn status(&self) -> ExecutionStatus {
        match self {
            ForgeError::OperationFailed { .. }
            | ForgeError::Aggregate { .. }
            | ForgeError::Timeout { .. } => ExecutionStatus::CompensatedFailure,
            ForgeError::Cancelled => ExecutionStatus::Cancelled,
            ForgeError::Foundry(_) => ExecutionStatus::NotStarted,
        }
    }
}

/// Why the forward loop stopped.
enum DriveFailure {
    Halted {
        operation: String,
        source: OperationError,
    },
    Aggregate(Vec<OperationFailure>),
    TimedOut,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Smith
// ---------------------------------------------------------------------------

/// Orchestrator driving workflow executions.
///
/// Smiths that must share a process-wide concurrency limit share one
/// `Arc<AdmissionGate>`.
pub struct Smith {
    gate: Arc<AdmissionGate>,
    default_timeout: Duration,
    /// Cancellation tokens keyed by execution id.
    executions: DashMap<Uuid, CancellationToken>,
}

impl Smith {
    /// Create a smith throttled by the given admission gate.
    pub fn new(gate: Arc<AdmissionGate>) -> Self {
        Self {
            gate,
            default_timeout: Duration::from_secs(DEFAULT_WORKFLOW_TIMEOUT_SECS),
            executions: DashMap::new(),
        }
    }

    /// A smith with no process-wide concurrency limit.
    pub fn unlimited() -> Self {
        Self::new(Arc::new(AdmissionGate::unlimited()))
    }

    /// Override the timeout used for workflows that set none.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The shared admission gate.
    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    /// Cancel a running execution by id. Returns false when the id is
    /// unknown (never started, or already finished).
    pub fn cancel(&self, execution_id: Uuid) -> bool {
        if let Some((_, token)) = self.executions.remove(&execution_id) {
            token.cancel();
            tracing::info!(execution_id = %execution_id, "execution cancelled");
            true
        } else {
            false
        }
    }

    /// Drive the workflow through the foundry to completion, failure,
    /// or cancellation.
    ///
    /// The foundry is borrowed for the duration of the call: it is
    /// frozen on entry and thawed on every exit path, so it remains
    /// inspectable (and in principle reusable) afterward.
    pub async fn forge(
        &self,
        workflow: Arc<Workflow>,
        foundry: &Foundry,
        input: Value,
    ) -> Result<ForgeReport, ForgeError> {
        let token = foundry.cancellation_token();

        // Admission is a suspension point; waiting here honors
        // cancellation and counts whole workflows, not operations. The
        // permit is held for the rest of this call.
        let _permit = self
            .gate
            .admit(&token)
            .await
            .map_err(|_| ForgeError::Cancelled)?;

        match foundry.workflow() {
            None => foundry.bind(Arc::clone(&workflow))?,
            Some(bound) if bound.id() == workflow.id() => {}
            Some(_) => return Err(ForgeError::Foundry(FoundryError::AlreadyBound)),
        }

        foundry.freeze()?;
        // Entries surviving a previous run (kept for inspection) must
        // not be compensated by this one.
        foundry.ledger().clear();
        self.executions.insert(foundry.id(), token.clone());

        tracing::info!(
            execution_id = %foundry.id(),
            workflow = workflow.name(),
            operations = foundry.operations().len(),
            "starting workflow execution"
        );

        let result = self.drive(&workflow, foundry, input, &token).await;

        self.executions.remove(&foundry.id());
        foundry.thaw();

        match &result {
            Ok(report) => {
                foundry.emit(ForgeEvent::WorkflowCompleted {
                    execution_id: foundry.id(),
                    workflow: workflow.name().to_string(),
                    duration_ms: report.duration_ms,
                    operations_completed: report.completed_operations.len() as u32,
                });
                tracing::info!(
                    execution_id = %foundry.id(),
                    duration_ms = report.duration_ms,
                    "workflow completed"
                );
            }
            Err(ForgeError::Cancelled) => {
                foundry.emit(ForgeEvent::WorkflowCancelled {
                    execution_id: foundry.id(),
                    workflow: workflow.name().to_string(),
                });
                tracing::info!(execution_id = %foundry.id(), "workflow cancelled");
            }
            Err(err) => {
                foundry.emit(ForgeEvent::WorkflowFailed {
                    execution_id: foundry.id(),
                    workflow: workflow.name().to_string(),
                    error: err.to_string(),
                });
                tracing::warn!(execution_id = %foundry.id(), error = %err, "workflow failed");
            }
        }

        result
    }

    async fn drive(
        &self,
        workflow: &Workflow,
        foundry: &Foundry,
        input: Value,
        token: &CancellationToken,
    ) -> Result<ForgeReport, ForgeError> {
        let started = Instant::now();
        foundry.emit(ForgeEvent::WorkflowStarted {
            execution_id: foundry.id(),
            workflow: workflow.name().to_string(),
            version: workflow.version().to_string(),
            at: Utc::now(),
        });

        let ops = foundry.operations();
        let chain = foundry.middleware_chain();
        let continue_on_error = workflow.options().continue_on_error;
        let timeout = workflow.timeout().unwrap_or(self.default_timeout);

        let forward = async {
            let mut carried = input;
            let mut failures: Vec<OperationFailure> = Vec::new();

            for op in &ops {
                if token.is_cancelled() {
                    return Err(DriveFailure::Cancelled);
                }

                foundry.emit(ForgeEvent::OperationStarted {
                    execution_id: foundry.id(),
                    operation_id: op.id(),
                    operation: op.name().to_string(),
                });
                let op_started = Instant::now();

                match middleware::run_chain(&chain, op.as_ref(), foundry, carried.clone()).await {
                    Ok(output) => {
                        foundry.ledger().record(Arc::clone(op), output.clone());
                        foundry.emit(ForgeEvent::OperationCompleted {
                            execution_id: foundry.id(),
                            operation_id: op.id(),
                            operation: op.name().to_string(),
                            duration_ms: op_started.elapsed().as_millis() as u64,
                        });
                        carried = output;
                    }
                    Err(err) if err.is_cancellation() => return Err(DriveFailure::Cancelled),
                    Err(err) => {
                        foundry.emit(ForgeEvent::OperationFailed {
                            execution_id: foundry.id(),
                            operation_id: op.id(),
                            operation: op.name().to_string(),
                            error: err.to_string(),
                            halts_workflow: !continue_on_error,
                        });
                        if !continue_on_error {
                            return Err(DriveFailure::Halted {
                                operation: op.name().to_string(),
                                source: err,
                            });
                        }
                        tracing::warn!(
                            execution_id = %foundry.id(),
                            operation = op.name(),
                            error = %err,
                            "operation failed, continuing"
                        );
                        // Next operation sees the last successful output
                        failures.push(OperationFailure {
                            operation: op.name().to_string(),
                            error: err.to_string(),
                        });
                    }
                }
            }

            if failures.is_empty() {
                Ok(carried)
            } else {
                Err(DriveFailure::Aggregate(failures))
            }
        };

        let outcome = match tokio::time::timeout(timeout, forward).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(DriveFailure::TimedOut),
        };

        match outcome {
            Ok(output) => Ok(ForgeReport {
                execution_id: foundry.id(),
                status: ExecutionStatus::Completed,
                workflow: workflow.name().to_string(),
                output,
                completed_operations: foundry.ledger().completed_names(),
                duration_ms: started.elapsed().as_millis() as u64,
            }),
            Err(DriveFailure::Cancelled) => Err(ForgeError::Cancelled),
            Err(DriveFailure::Halted { operation, source }) => {
                let compensation = self.compensate(foundry, &operation).await;
                Err(ForgeError::OperationFailed {
                    operation,
                    source,
                    compensation,
                })
            }
            Err(DriveFailure::Aggregate(failures)) => {
                let trigger = failures
                    .first()
                    .map(|f| f.operation.clone())
                    .unwrap_or_default();
                let compensation = self.compensate(foundry, &trigger).await;
                Err(ForgeError::Aggregate {
                    failures,
                    compensation,
                })
            }
            Err(DriveFailure::TimedOut) => {
                let compensation = self.compensate(foundry, workflow.name()).await;
                Err(ForgeError::Timeout { compensation })
            }
        }
    }

    /// Walk the ledger in reverse completion order, restoring every
    /// capable entry. Restore failures are collected, not rethrown;
    /// the walk always finishes.
    async fn compensate(&self, foundry: &Foundry, trigger: &str) -> CompensationReport {
        let entries = foundry.ledger().drain_reverse();
        foundry.emit(ForgeEvent::CompensationTriggered {
            execution_id: foundry.id(),
            trigger_operation: trigger.to_string(),
            pending: entries.len() as u32,
        });
        tracing::info!(
            execution_id = %foundry.id(),
            trigger,
            pending = entries.len(),
            "compensation triggered"
        );

        let walk_started = Instant::now();
        let mut restored = 0u32;
        let mut failures: Vec<RestoreFailure> = Vec::new();

        for entry in entries {
            if !entry.operation.supports_restore() {
                continue;
            }
            let name = entry.operation.name().to_string();
            foundry.emit(ForgeEvent::RestoreStarted {
                execution_id: foundry.id(),
                operation: name.clone(),
            });
            let restore_started = Instant::now();

            match entry.operation.restore(entry.output.clone(), foundry).await {
                Ok(()) => {
                    restored += 1;
                    foundry.emit(ForgeEvent::RestoreCompleted {
                        execution_id: foundry.id(),
                        operation: name,
                        duration_ms: restore_started.elapsed().as_millis() as u64,
                    });
                }
                Err(err) => {
                    tracing::error!(
                        execution_id = %foundry.id(),
                        operation = name.as_str(),
                        error = %err,
                        "restore failed during compensation"
                    );
                    failures.push(RestoreFailure {
                        operation: name.clone(),
                        error: err.to_string(),
                    });
                    foundry.emit(ForgeEvent::RestoreFailed {
                        execution_id: foundry.id(),
                        operation: name,
                        error: err.to_string(),
                    });
                }
            }
        }

        let report = CompensationReport {
            restored,
            failed: failures.len() as u32,
            failures,
            duration_ms: walk_started.elapsed().as_millis() as u64,
        };
        foundry.emit(ForgeEvent::CompensationCompleted {
            execution_id: foundry.id(),
            restored: report.restored,
            failed: report.failed,
            duration_ms: report.duration_ms,
        });
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
