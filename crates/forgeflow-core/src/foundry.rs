//! The foundry: per-execution context shared by all operations.
//!
//! A [`Foundry`] is created per execution attempt. It owns the
//! concurrent property store, the ordered operation and middleware
//! lists, the compensation ledger, the lifecycle event bus, and the
//! cancellation token. Once forging starts the foundry is frozen:
//! operation/middleware registration fails until the run ends. The
//! foundry holds no sequencing logic -- that lives in the smith.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::EventBus;
use crate::ledger::CompensationLedger;
use crate::middleware::MiddlewareLink;
use crate::operation::Operation;
use crate::workflow::Workflow;
use forgeflow_types::event::ForgeEvent;

/// Default broadcast capacity for a foundry's event bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// FoundryError
// ---------------------------------------------------------------------------

/// Precondition failures raised by the foundry itself. These surface
/// immediately and never trigger compensation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FoundryError {
    /// Registration attempted while an execution is in progress.
    #[error("foundry is frozen: execution in progress")]
    Frozen,

    /// A different workflow is already bound to this foundry.
    #[error("a workflow is already bound to this foundry")]
    AlreadyBound,
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Type-keyed registry for collaborator lookup.
///
/// Lets an operation reach another subsystem (a validator, a client)
/// without the engine depending on its concrete type.
#[derive(Default)]
pub struct ServiceRegistry {
    inner: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    /// Register a service instance, replacing any previous one of the
    /// same type.
    pub fn register<T: Send + Sync + 'static>(&self, service: Arc<T>) {
        self.inner.insert(TypeId::of::<T>(), service);
    }

    /// Resolve a service by type.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(entry.value()).downcast::<T>().ok())
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.inner.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Foundry
// ---------------------------------------------------------------------------

/// Per-execution context: property store, operation/middleware lists,
/// ledger, event bus, cancellation.
///
/// The creating caller owns the foundry; the smith borrows it for the
/// duration of one `forge` call.
pub struct Foundry {
    id: Uuid,
    workflow: RwLock<Option<Arc<Workflow>>>,
    properties: DashMap<String, Value>,
    operations: RwLock<Vec<Arc<dyn Operation>>>,
    middleware: RwLock<Vec<Arc<dyn MiddlewareLink>>>,
    frozen: AtomicBool,
    ledger: CompensationLedger,
    bus: EventBus,
    cancel: CancellationToken,
    services: ServiceRegistry,
}

impl Foundry {
    /// Create a foundry with its own event bus.
    pub fn new() -> Self {
        Self::with_bus(EventBus::new(DEFAULT_EVENT_CAPACITY))
    }

    /// Create a foundry publishing to an existing bus, so one audit or
    /// logging subscription can observe many executions.
    pub fn with_bus(bus: EventBus) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow: RwLock::new(None),
            properties: DashMap::new(),
            operations: RwLock::new(Vec::new()),
            middleware: RwLock::new(Vec::new()),
            frozen: AtomicBool::new(false),
            ledger: CompensationLedger::new(),
            bus,
            cancel: CancellationToken::new(),
            services: ServiceRegistry::default(),
        }
    }

    /// Process-unique execution identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    // -- workflow binding ---------------------------------------------------

    /// Bind a workflow to this foundry, registering its operations.
    /// Settable once, and only before forging begins.
    pub fn bind(&self, workflow: Arc<Workflow>) -> Result<(), FoundryError> {
        if self.is_frozen() {
            return Err(FoundryError::Frozen);
        }
        let mut slot = self.workflow.write().expect("workflow lock poisoned");
        if slot.is_some() {
            return Err(FoundryError::AlreadyBound);
        }
        self.operations
            .write()
            .expect("operations lock poisoned")
            .extend(workflow.operations().iter().cloned());
        *slot = Some(workflow);
        Ok(())
    }

    /// The workflow currently bound, if any.
    pub fn workflow(&self) -> Option<Arc<Workflow>> {
        self.workflow
            .read()
            .expect("workflow lock poisoned")
            .clone()
    }

    // -- registration -------------------------------------------------------

    /// Append an operation to the run list. Fails while frozen.
    pub fn add_operation(&self, op: Arc<dyn Operation>) -> Result<(), FoundryError> {
        if self.is_frozen() {
            return Err(FoundryError::Frozen);
        }
        self.operations
            .write()
            .expect("operations lock poisoned")
            .push(op);
        Ok(())
    }

    /// Append a middleware link. Registration order defines wrapping
    /// order: first registered is outermost. Fails while frozen.
    pub fn add_middleware(&self, link: Arc<dyn MiddlewareLink>) -> Result<(), FoundryError> {
        if self.is_frozen() {
            return Err(FoundryError::Frozen);
        }
        self.middleware
            .write()
            .expect("middleware lock poisoned")
            .push(link);
        Ok(())
    }

    /// Snapshot of the registered operations, in order.
    pub fn operations(&self) -> Vec<Arc<dyn Operation>> {
        self.operations
            .read()
            .expect("operations lock poisoned")
            .clone()
    }

    /// Snapshot of the registered middleware chain, in order.
    pub fn middleware_chain(&self) -> Vec<Arc<dyn MiddlewareLink>> {
        self.middleware
            .read()
            .expect("middleware lock poisoned")
            .clone()
    }

    // -- freezing -----------------------------------------------------------

    /// Whether an execution currently holds this foundry.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Mark forging as started. Fails if another execution already
    /// holds the foundry.
    pub(crate) fn freeze(&self) -> Result<(), FoundryError> {
        self.frozen
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| FoundryError::Frozen)
    }

    /// Clear the frozen flag when an execution ends (success, failure,
    /// or cancellation).
    pub(crate) fn thaw(&self) {
        self.frozen.store(false, Ordering::Release);
    }

    // -- property store -----------------------------------------------------

    /// Set a property (last write wins).
    pub fn set_property(&self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    /// Get a property value by key.
    pub fn property(&self, key: &str) -> Option<Value> {
        self.properties.get(key).map(|entry| entry.value().clone())
    }

    /// Whether a property exists.
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Current property keys, unordered.
    pub fn property_keys(&self) -> Vec<String> {
        self.properties
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    // -- collaborators ------------------------------------------------------

    /// The compensation ledger for this execution.
    pub fn ledger(&self) -> &CompensationLedger {
        &self.ledger
    }

    /// The lifecycle event bus.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Publish a lifecycle event.
    pub(crate) fn emit(&self, event: ForgeEvent) {
        self.bus.publish(event);
    }

    /// Clone of this execution's cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the execution bound to this foundry.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Type-keyed collaborator registry.
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }
}

impl Default for Foundry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Foundry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Foundry")
            .field("id", &self.id)
            .field("frozen", &self.is_frozen())
            .field("properties", &self.properties.len())
            .field("operations", &self.operations.read().map(|v| v.len()).unwrap_or(0))
            .finish()
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

    fn noop() -> Arc<dyn Operation> {
        Arc::new(FnOperation::new("noop", |input, _| Ok(input)))
    }

    // -------------------------------------------------------------------
    // Property store
    // -------------------------------------------------------------------

    #[test]
    fn property_store_last_write_wins() {
        let foundry = Foundry::new();
        foundry.set_property("key", json!(1));
        foundry.set_property("key", json!(2));
        assert_eq!(foundry.property("key"), Some(json!(2)));
        assert!(foundry.has_property("key"));
        assert!(!foundry.has_property("missing"));
    }

    #[test]
    fn property_keys_lists_all() {
        let foundry = Foundry::new();
        foundry.set_property("a", json!(1));
        foundry.set_property("b", json!(2));
        let mut keys = foundry.property_keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    // -------------------------------------------------------------------
    // Freezing
    // -------------------------------------------------------------------

    #[test]
    fn frozen_foundry_rejects_registration() {
        let foundry = Foundry::new();
        foundry.freeze().unwrap();

        assert_eq!(foundry.add_operation(noop()), Err(FoundryError::Frozen));
        assert!(foundry.is_frozen());

        // Still usable for inspection while frozen
        foundry.set_property("inspectable", json!(true));
        assert_eq!(foundry.property("inspectable"), Some(json!(true)));

        foundry.thaw();
        assert!(foundry.add_operation(noop()).is_ok());
    }

    #[test]
    fn double_freeze_fails() {
        let foundry = Foundry::new();
        foundry.freeze().unwrap();
        assert_eq!(foundry.freeze(), Err(FoundryError::Frozen));
    }

    // -------------------------------------------------------------------
    // Workflow binding
    // -------------------------------------------------------------------

    #[test]
    fn bind_registers_operations_and_is_settable_once() {
        let workflow = Workflow::builder("wf")
            .then(FnOperation::new("a", |input, _| Ok(input)))
            .then(FnOperation::new("b", |input, _| Ok(input)))
            .build();

        let foundry = Foundry::new();
        foundry.bind(Arc::clone(&workflow)).unwrap();
        assert_eq!(foundry.operations().len(), 2);
        assert!(foundry.workflow().is_some());

        let other = Workflow::builder("other").build();
        assert_eq!(foundry.bind(other), Err(FoundryError::AlreadyBound));
    }

    #[test]
    fn bind_fails_while_frozen() {
        let workflow = Workflow::builder("wf").build();
        let foundry = Foundry::new();
        foundry.freeze().unwrap();
        assert_eq!(foundry.bind(workflow), Err(FoundryError::Frozen));
    }

    // -------------------------------------------------------------------
    // ServiceRegistry
    // -------------------------------------------------------------------

    #[test]
    fn service_registry_resolves_by_type() {
        struct Validator {
            limit: usize,
        }

        let registry = ServiceRegistry::default();
        registry.register(Arc::new(Validator { limit: 10 }));

        let resolved = registry.resolve::<Validator>().unwrap();
        assert_eq!(resolved.limit, 10);
        assert!(registry.resolve::<String>().is_none());
    }
}
