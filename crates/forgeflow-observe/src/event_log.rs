//! Bridge from the engine's event bus to structured tracing output.
//!
//! The engine publishes `ForgeEvent` without caring who listens; this
//! module turns each event into a log line with stable field names so
//! `RUST_LOG=forgeflow_observe=debug` surfaces a readable execution
//! transcript. A lagged subscriber loses events, never blocks the
//! engine.

use forgeflow_core::EventBus;
use forgeflow_types::event::ForgeEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Subscribe to the bus and log every event until the bus is dropped.
///
/// Returns the consumer task handle; aborting it detaches the logger.
pub fn spawn_event_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger fell behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Emit one event as a structured log line.
pub fn log_event(event: &ForgeEvent) {
    match event {
        ForgeEvent::WorkflowStarted {
            execution_id,
            workflow,
            version,
            ..
        } => {
            tracing::info!(
                execution_id = %execution_id,
                workflow = workflow.as_str(),
                version = version.as_str(),
                "workflow started"
            );
        }
        ForgeEvent::OperationStarted {
            execution_id,
            operation,
            ..
        } => {
            tracing::debug!(
                execution_id = %execution_id,
                operation = operation.as_str(),
                "operation started"
            );
        }
        ForgeEvent::OperationCompleted {
            execution_id,
            operation,
            duration_ms,
            ..
        } => {
            tracing::debug!(
                execution_id = %execution_id,
                operation = operation.as_str(),
                duration_ms,
                "operation completed"
            );
        }
        ForgeEvent::OperationFailed {
            execution_id,
            operation,
            error,
            halts_workflow,
            ..
        } => {
            tracing::warn!(
                execution_id = %execution_id,
                operation = operation.as_str(),
                error = error.as_str(),
                halts_workflow,
                "operation failed"
            );
        }
        ForgeEvent::CompensationTriggered {
            execution_id,
            trigger_operation,
            pending,
        } => {
            tracing::warn!(
                execution_id = %execution_id,
                trigger = trigger_operation.as_str(),
                pending,
                "compensation triggered"
            );
        }
        ForgeEvent::RestoreStarted {
            execution_id,
            operation,
        } => {
            tracing::debug!(
                execution_id = %execution_id,
                operation = operation.as_str(),
                "restore started"
            );
        }
        ForgeEvent::RestoreCompleted {
            execution_id,
            operation,
            duration_ms,
        } => {
            tracing::debug!(
                execution_id = %execution_id,
                operation = operation.as_str(),
                duration_ms,
                "restore completed"
            );
        }
        ForgeEvent::RestoreFailed {
            execution_id,
            operation,
            error,
        } => {
            tracing::error!(
                execution_id = %execution_id,
                operation = operation.as_str(),
                error = error.as_str(),
                "restore failed"
            );
        }
        ForgeEvent::CompensationCompleted {
            execution_id,
            restored,
            failed,
            duration_ms,
        } => {
            tracing::info!(
                execution_id = %execution_id,
                restored,
                failed,
                duration_ms,
                "compensation completed"
            );
        }
        ForgeEvent::WorkflowCompleted {
            execution_id,
            workflow,
            duration_ms,
            operations_completed,
        } => {
            tracing::info!(
                execution_id = %execution_id,
                workflow = workflow.as_str(),
                duration_ms,
                operations_completed,
                "workflow completed"
            );
        }
        ForgeEvent::WorkflowFailed {
            execution_id,
            workflow,
            error,
        } => {
            tracing::error!(
                execution_id = %execution_id,
                workflow = workflow.as_str(),
                error = error.as_str(),
                "workflow failed"
            );
        }
        ForgeEvent::WorkflowCancelled {
            execution_id,
            workflow,
        } => {
            tracing::info!(
                execution_id = %execution_id,
                workflow = workflow.as_str(),
                "workflow cancelled"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn logger_task_exits_when_bus_is_dropped() {
        let bus = EventBus::new(16);
        let handle = spawn_event_logger(&bus);

        bus.publish(ForgeEvent::WorkflowStarted {
            execution_id: Uuid::now_v7(),
            workflow: "demo".to_string(),
            version: "0.1.0".to_string(),
            at: Utc::now(),
        });
        drop(bus);

        // Closed channel terminates the loop
        handle.await.unwrap();
    }
}
