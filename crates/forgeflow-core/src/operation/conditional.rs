//! Conditional combinator: predicate-routed branch between two children.
//!
//! Exactly one child runs per invocation. The executed branch is
//! recorded in the ledger on success, so its reverse action (if any)
//! is what compensation invokes; the conditional's own restore is a
//! no-op.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::foundry::Foundry;

use super::{Operation, OperationError};

type PredicateFn = dyn Fn(&Value, &Foundry) -> bool + Send + Sync;

/// Routes to one of two child operations based on a predicate over
/// `(input, context)`.
pub struct Conditional {
    id: Uuid,
    name: String,
    predicate: Box<PredicateFn>,
    when_true: Arc<dyn Operation>,
    when_false: Arc<dyn Operation>,
}

impl Conditional {
    pub fn new<P>(
        name: impl Into<String>,
        predicate: P,
        when_true: Arc<dyn Operation>,
        when_false: Arc<dyn Operation>,
    ) -> Self
    where
        P: Fn(&Value, &Foundry) -> bool + Send + Sync + 'static,
    {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            predicate: Box::new(predicate),
            when_true,
            when_false,
        }
    }
}

#[async_trait]
impl Operation for Conditional {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    // The executed branch carries its own ledger entry; the conditional
    // itself has nothing to undo.
    fn supports_restore(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, ctx: &Foundry) -> Result<Value, OperationError> {
        let branch = if (self.predicate)(&input, ctx) {
            &self.when_true
        } else {
            &self.when_false
        };
        tracing::debug!(
            operation = self.name.as_str(),
            branch = branch.name(),
            "conditional routing"
        );

        let output = branch.execute(input, ctx).await?;
        ctx.ledger().record(Arc::clone(branch), output.clone());
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
