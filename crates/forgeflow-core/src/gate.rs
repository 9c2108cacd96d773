//! Process-wide workflow admission control.
//!
//! An [`AdmissionGate`] throttles how many whole workflows may run
//! concurrently. It is an explicit shared object: smiths that must
//! share one limit share one `Arc<AdmissionGate>`. Acquiring a slot is
//! a suspension point that waits cooperatively, honoring cancellation.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Error from waiting at the admission gate.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// The execution was cancelled while waiting for a slot.
    #[error("cancelled while waiting for an admission slot")]
    Cancelled,
}

/// Held for the duration of one workflow execution; dropping it frees
/// the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Counting admission gate sized by a configurable maximum.
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Option<Arc<Semaphore>>,
    limit: usize,
}

impl AdmissionGate {
    /// Create a gate admitting at most `max_concurrent` workflows.
    /// Zero means unlimited.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: (max_concurrent > 0).then(|| Arc::new(Semaphore::new(max_concurrent))),
            limit: max_concurrent,
        }
    }

    /// A gate that never blocks.
    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Configured maximum (0 = unlimited).
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots currently free, or None when unlimited.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Wait for an execution slot. Suspends until one frees or the
    /// token fires.
    pub async fn admit(&self, cancel: &CancellationToken) -> Result<AdmissionPermit, AdmissionError> {
        let Some(semaphore) = &self.semaphore else {
            return Ok(AdmissionPermit { _permit: None });
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(AdmissionError::Cancelled),
            acquired = Arc::clone(semaphore).acquire_owned() => match acquired {
                Ok(permit) => Ok(AdmissionPermit {
                    _permit: Some(permit),
                }),
                // The semaphore is never closed; treat it like cancellation.
                Err(_) => Err(AdmissionError::Cancelled),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn unlimited_gate_never_blocks() {
        let gate = AdmissionGate::unlimited();
        let token = CancellationToken::new();
        for _ in 0..100 {
            // Permits are dropped immediately; either way this must not wait
            let _ = gate.admit(&token).await.unwrap();
        }
        assert_eq!(gate.available(), None);
    }

    #[tokio::test]
    async fn gate_blocks_until_slot_frees() {
        let gate = Arc::new(AdmissionGate::new(1));
        let token = CancellationToken::new();

        let held = gate.admit(&token).await.unwrap();
        assert_eq!(gate.available(), Some(0));

        let waiter = {
            let gate = Arc::clone(&gate);
            let token = token.clone();
            tokio::spawn(async move { gate.admit(&token).await })
        };

        // Give the waiter time to queue, then release the slot
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(held);

        let permit = waiter.await.unwrap().unwrap();
        drop(permit);
        assert_eq!(gate.available(), Some(1));
    }

    #[tokio::test]
    async fn cancellation_aborts_waiting() {
        let gate = Arc::new(AdmissionGate::new(1));
        let token = CancellationToken::new();
        let _held = gate.admit(&token).await.unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            let token = token.clone();
            tokio::spawn(async move { gate.admit(&token).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let result = waiter.await.unwrap();
        assert_eq!(result.unwrap_err(), AdmissionError::Cancelled);
    }
}
