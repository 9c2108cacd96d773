//! Workflow definition: an immutable ordered sequence of operations.
//!
//! Built once through [`WorkflowBuilder`], read-only during execution.
//! A workflow owns no mutable state -- per-run state lives in the
//! foundry it gets bound to.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::operation::Operation;
use forgeflow_types::workflow::WorkflowOptions;

/// Immutable ordered definition of operations to execute.
pub struct Workflow {
    id: Uuid,
    name: String,
    version: String,
    options: WorkflowOptions,
    operations: Vec<Arc<dyn Operation>>,
}

impl Workflow {
    /// Start building a workflow with the given name.
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            version: "0.1.0".to_string(),
            options: WorkflowOptions::default(),
            operations: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    /// Per-workflow timeout, when one is set.
    pub fn timeout(&self) -> Option<Duration> {
        self.options.timeout_secs.map(Duration::from_secs)
    }

    /// The ordered operation list.
    pub fn operations(&self) -> &[Arc<dyn Operation>] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field(
                "operations",
                &self.operations.iter().map(|op| op.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WorkflowBuilder
// ---------------------------------------------------------------------------

/// Fluent builder producing an immutable [`Workflow`].
pub struct WorkflowBuilder {
    name: String,
    version: String,
    options: WorkflowOptions,
    operations: Vec<Arc<dyn Operation>>,
}

impl WorkflowBuilder {
    /// Set the semantic version string (default "0.1.0").
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the workflow-level timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Record failures and keep going instead of stopping at the first
    /// one. Default is fail-fast.
    pub fn continue_on_error(mut self) -> Self {
        self.options.continue_on_error = true;
        self
    }

    /// Append an operation.
    pub fn then(mut self, op: impl Operation + 'static) -> Self {
        self.operations.push(Arc::new(op));
        self
    }

    /// Append an already-shared operation.
    pub fn then_arc(mut self, op: Arc<dyn Operation>) -> Self {
        self.operations.push(op);
        self
    }

    pub fn build(self) -> Arc<Workflow> {
        Arc::new(Workflow {
            id: Uuid::now_v7(),
            name: self.name,
            version: self.version,
            options: self.options,
            operations: self.operations,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
