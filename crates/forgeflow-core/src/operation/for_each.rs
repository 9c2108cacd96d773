//! Iteration combinator: run one operation per item of a fixed
//! collection.
//!
//! Sequential mode stops at the first failure. Concurrent mode fans
//! items out with a bounded `buffer_unordered`, joining before the
//! combinator returns. Either way, every item that completes its
//! forward action is recorded in the ledger at completion time, so
//! partial progress compensates normally, and the aggregated output
//! preserves the original item order regardless of completion order.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use crate::foundry::Foundry;

use super::{Operation, OperationError};

/// How the per-item operation is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationMode {
    /// Item i+1 never starts before item i completes.
    Sequential,
    /// Up to `fan_out` items run simultaneously.
    Concurrent { fan_out: usize },
}

/// Runs a per-item operation once per element of a fixed collection.
///
/// The combinator's own restore is a no-op: completed items carry
/// their own ledger entries.
pub struct ForEach {
    id: Uuid,
    name: String,
    items: Vec<Value>,
    worker: Arc<dyn Operation>,
    mode: IterationMode,
}

impl ForEach {
    /// Strictly sequential iteration.
    pub fn sequential(
        name: impl Into<String>,
        items: Vec<Value>,
        worker: Arc<dyn Operation>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            items,
            worker,
            mode: IterationMode::Sequential,
        }
    }

    /// Concurrent iteration bounded by `fan_out` (clamped to at least 1).
    pub fn concurrent(
        name: impl Into<String>,
        items: Vec<Value>,
        worker: Arc<dyn Operation>,
        fan_out: usize,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            items,
            worker,
            mode: IterationMode::Concurrent {
                fan_out: fan_out.max(1),
            },
        }
    }

    pub fn mode(&self) -> IterationMode {
        self.mode
    }

    async fn run_sequential(&self, ctx: &Foundry) -> Result<Value, OperationError> {
        let token = ctx.cancellation_token();
        let mut outputs = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if token.is_cancelled() {
                return Err(OperationError::Cancelled);
            }
            let output = self.worker.execute(item.clone(), ctx).await?;
            ctx.ledger().record(Arc::clone(&self.worker), output.clone());
            outputs.push(output);
        }
        Ok(Value::Array(outputs))
    }

    async fn run_concurrent(&self, ctx: &Foundry, fan_out: usize) -> Result<Value, OperationError> {
        let token = ctx.cancellation_token();

        let join = async {
            let mut slots: Vec<Option<Value>> = vec![None; self.items.len()];
            let mut results = stream::iter(self.items.iter().cloned().enumerate())
                .map(|(index, item)| {
                    let worker = Arc::clone(&self.worker);
                    async move {
                        let result = worker.execute(item, ctx).await;
                        if let Ok(output) = &result {
                            // Record here, not at collection time, so items
                            // that finish before a sibling fails still land
                            // in the ledger.
                            ctx.ledger().record(Arc::clone(&worker), output.clone());
                        }
                        (index, result)
                    }
                })
                .buffer_unordered(fan_out);

            while let Some((index, result)) = results.next().await {
                slots[index] = Some(result?);
            }
            Ok(Value::Array(slots.into_iter().flatten().collect()))
        };

        tokio::select! {
            _ = token.cancelled() => Err(OperationError::Cancelled),
            result = join => result,
        }
    }
}

#[async_trait]
impl Operation for ForEach {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_restore(&self) -> bool {
        false
    }

    async fn execute(&self, _input: Value, ctx: &Foundry) -> Result<Value, OperationError> {
        tracing::debug!(
            operation = self.name.as_str(),
            items = self.items.len(),
            mode = ?self.mode,
            "iterating collection"
        );
        match self.mode {
            IterationMode::Sequential => self.run_sequential(ctx).await,
            IterationMode::Concurrent { fan_out } => self.run_concurrent(ctx, fan_out).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::FnOperation;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
    use std::time::Duration;

    fn items(n: i64) -> Vec<Value> {
        (0..n).map(|i| json!(i)).collect()
    }

    #[tokio::test]
    async fn sequential_preserves_order_and_records_ledger() {
        let foundry = Foundry::new();
        let worker: Arc<dyn Operation> = Arc::new(FnOperation::new("square", |input, _| {
            let n = input.as_i64().unwrap_or(0);
            Ok(json!(n * n))
        }));
        let for_each = ForEach::sequential("square-all", items(4), worker);

        let out = for_each.execute(json!(null), &foundry).await.unwrap();
        assert_eq!(out, json!([0, 1, 4, 9]));
        assert_eq!(foundry.ledger().len(), 4);
    }

    #[tokio::test]
    async fn sequential_stops_at_first_failure() {
        let foundry = Foundry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let worker: Arc<dyn Operation> = Arc::new(FnOperation::new("third-fails", move |input, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if input.as_i64() == Some(2) {
                Err(OperationError::Failed("item 2 is bad".into()))
            } else {
                Ok(input)
            }
        }));
        let for_each = ForEach::sequential("stop-early", items(5), worker);

        let err = for_each.execute(json!(null), &foundry).await.unwrap_err();
        assert!(matches!(err, OperationError::Failed(_)));
        // Items 0, 1, 2 ran; 3 and 4 never started
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Only the two successes are ledger-worthy
        assert_eq!(foundry.ledger().len(), 2);
    }

    /// Worker that tracks the concurrency high-water mark.
    struct GaugedWorker {
        id: Uuid,
        current: AtomicI64,
        peak: AtomicI64,
    }

    impl GaugedWorker {
        fn new() -> Self {
            Self {
                id: Uuid::now_v7(),
                current: AtomicI64::new(0),
                peak: AtomicI64::new(0),
            }
        }
    }

    #[async_trait]
    impl Operation for GaugedWorker {
        fn id(&self) -> Uuid {
            self.id
        }

        fn name(&self) -> &str {
            "gauged"
        }

        async fn execute(&self, input: Value, _ctx: &Foundry) -> Result<Value, OperationError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(input)
        }
    }

    #[tokio::test]
    async fn concurrent_respects_fan_out_limit() {
        let foundry = Foundry::new();
        let worker = Arc::new(GaugedWorker::new());
        let for_each = ForEach::concurrent(
            "bounded",
            items(12),
            Arc::clone(&worker) as Arc<dyn Operation>,
            3,
        );

        let out = for_each.execute(json!(null), &foundry).await.unwrap();
        assert_eq!(out, json!([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]));
        assert!(worker.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(foundry.ledger().len(), 12);
    }

    /// Worker whose later items finish before earlier ones.
    struct ReversedLatency {
        id: Uuid,
    }

    #[async_trait]
    impl Operation for ReversedLatency {
        fn id(&self) -> Uuid {
            self.id
        }

        fn name(&self) -> &str {
            "reversed-latency"
        }

        async fn execute(&self, input: Value, _ctx: &Foundry) -> Result<Value, OperationError> {
            let n = input.as_i64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis((4 - n).max(0) as u64 * 10)).await;
            Ok(json!(n * 10))
        }
    }

    #[tokio::test]
    async fn concurrent_output_preserves_item_order() {
        let foundry = Foundry::new();
        let worker: Arc<dyn Operation> = Arc::new(ReversedLatency { id: Uuid::now_v7() });
        let for_each = ForEach::concurrent("ordered-output", items(5), worker, 5);

        let out = for_each.execute(json!(null), &foundry).await.unwrap();
        // Completion order was reversed; output order is not
        assert_eq!(out, json!([0, 10, 20, 30, 40]));
    }

    #[tokio::test]
    async fn concurrent_failure_fails_combinator() {
        let foundry = Foundry::new();
        let worker: Arc<dyn Operation> = Arc::new(FnOperation::new("one-bad", |input, _| {
            if input.as_i64() == Some(1) {
                Err(OperationError::Failed("bad item".into()))
            } else {
                Ok(input)
            }
        }));
        let for_each = ForEach::concurrent("fail-fast", items(3), worker, 3);

        let err = for_each.execute(json!(null), &foundry).await.unwrap_err();
        assert!(matches!(err, OperationError::Failed(_)));
    }

    #[tokio::test]
    async fn cancellation_aborts_iteration() {
        let foundry = Foundry::new();
        let worker: Arc<dyn Operation> = Arc::new(GaugedWorker::new());
        let for_each = ForEach::concurrent("cancel-me", items(100), worker, 2);

        foundry.cancel();
        let err = for_each.execute(json!(null), &foundry).await.unwrap_err();
        assert!(err.is_cancellation());
    }
}
