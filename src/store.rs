//! Collection handles and the persistence store.
//!
//! A `Store` owns the backend and the event bus. Opening a collection
//! ensures its table and indexes exist and records the raw schema
//! descriptor in the reserved `_schemas` collection. A `Collection`
//! wraps every operation with start/success/failed events and carries
//! the subscription bookkeeping for its event types.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde_json::{Value, json};

use crate::backend::sqlite::SqliteBackend;
use crate::backend::{CancelToken, StorageBackend};
use crate::error::EngineError;
use crate::events::{Event, EventBus, EventPhase, Subscriber, Subscription};
use crate::executor::{Executor, QueryOutput};
use crate::query::builder::where_field;
use crate::query::{Query, QueryFilter};
use crate::registry::{ComputeFn, FunctionRegistry, PredicateFn};
use crate::schema::Schema;
use crate::schema::descriptor::SchemaDescriptor;
use crate::types::Document;
use crate::validator::{Report, Validator};

/// Name of the reserved collection holding registered schema descriptors.
pub const SCHEMAS_COLLECTION: &str = "_schemas";

fn schemas_schema() -> Schema {
    let descriptor = json!({
        "name": SCHEMAS_COLLECTION,
        "version": "1",
        "fields": {
            "name": {"type": "string", "required": true, "unique": true},
            "version": {"type": "string", "required": true},
            "description": {"type": "string"},
            "schema": {"type": "record", "required": true}
        },
        "indexes": [
            {"name": "name_index", "fields": ["name"], "type": "normal"},
            {"name": "name_version_unique", "fields": ["name", "version"], "type": "unique"}
        ]
    });
    Schema::from_json(&descriptor.to_string())
        .unwrap_or_else(|e| panic!("metadata schema must parse: {}", e))
}

/// Emit start and success/failed events around one operation.
fn with_events<T, F>(
    bus: &EventBus,
    event_type: &str,
    operation: &str,
    collection: &str,
    input: Option<Value>,
    query: Option<Value>,
    run: F,
) -> Result<T, EngineError>
where
    T: serde::Serialize,
    F: FnOnce() -> Result<T, EngineError>,
{
    let mut start = Event::new(event_type, EventPhase::Start, operation, collection);
    start.input = input.clone();
    start.query = query.clone();
    bus.emit(&start);

    let started = Instant::now();
    match run() {
        Ok(value) => {
            let mut event = Event::new(event_type, EventPhase::Success, operation, collection);
            event.input = input;
            event.query = query;
            event.output = serde_json::to_value(&value).ok();
            event.duration_ms = Some(started.elapsed().as_millis() as u64);
            bus.emit(&event);
            Ok(value)
        }
        Err(error) => {
            let mut event = Event::new(event_type, EventPhase::Failed, operation, collection);
            event.input = input;
            event.query = query;
            event.error = Some(error.to_string());
            if let EngineError::ValidationFailed { issues, .. } = &error {
                event.issues = Some(issues.clone());
            }
            event.duration_ms = Some(started.elapsed().as_millis() as u64);
            bus.emit(&event);
            Err(error)
        }
    }
}

/// Schema-driven document store over one backend.
pub struct Store {
    backend: Arc<dyn StorageBackend>,
    bus: Arc<EventBus>,
    meta: Arc<Schema>,
}

impl Store {
    /// Wrap an existing backend, bootstrapping the metadata collection.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Result<Self, EngineError> {
        let meta = Arc::new(schemas_schema());
        if !backend.collection_exists(SCHEMAS_COLLECTION)? {
            backend.create_collection(&meta)?;
            for index in &meta.indexes {
                backend.create_index(SCHEMAS_COLLECTION, index)?;
            }
        }
        Ok(Store {
            backend,
            bus: Arc::new(EventBus::new()),
            meta,
        })
    }

    /// Open a file-backed store on the reference backend.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        Store::new(Arc::new(SqliteBackend::open(path)?))
    }

    /// Open an in-memory store on the reference backend.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Store::new(Arc::new(SqliteBackend::open_in_memory()?))
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Open (creating if needed) a collection for the given description.
    ///
    /// The table and indexes are created when absent and the raw
    /// descriptor is recorded in `_schemas`.
    pub fn collection(&self, descriptor: &SchemaDescriptor) -> Result<Collection, EngineError> {
        if descriptor.name == SCHEMAS_COLLECTION {
            return Err(EngineError::SchemaInvalid {
                name: descriptor.name.clone(),
                reason: "collection name is reserved".to_string(),
            });
        }
        let schema = Arc::new(Schema::from_descriptor(descriptor)?);

        if !self.backend.collection_exists(&schema.name)? {
            self.backend.create_collection(&schema)?;
            for index in &schema.indexes {
                self.backend.create_index(&schema.name, index)?;
            }
            tracing::debug!(collection = %schema.name, indexes = schema.indexes.len(), "created collection");
        }
        self.register_schema(descriptor)?;

        let registry = Arc::new(FunctionRegistry::with_builtins());
        let executor = Executor::new(
            Arc::clone(&self.backend),
            Arc::clone(&schema),
            Arc::clone(&registry),
        );
        let validator = Validator::new(Arc::clone(&schema), registry);
        Ok(Collection {
            schema,
            executor,
            validator,
            bus: Arc::clone(&self.bus),
            subscriptions: RwLock::new(HashMap::new()),
        })
    }

    /// Record (or refresh) a schema descriptor in `_schemas`.
    fn register_schema(&self, descriptor: &SchemaDescriptor) -> Result<(), EngineError> {
        let record: Document = [
            ("name".to_string(), json!(descriptor.name)),
            ("version".to_string(), json!(descriptor.version)),
            (
                "description".to_string(),
                descriptor.description.clone().map(Value::String).unwrap_or(Value::Null),
            ),
            ("schema".to_string(), descriptor.to_value()),
        ]
        .into_iter()
        .collect();

        let backend = &self.backend;
        let meta = &self.meta;
        let name = descriptor.name.clone();
        with_events(
            &self.bus,
            "metadata:called",
            "register_schema",
            SCHEMAS_COLLECTION,
            Some(json!({"name": descriptor.name, "version": descriptor.version})),
            None,
            move || {
                let cancel = CancelToken::new();
                backend.delete(
                    meta,
                    Some(&where_field("name").eq(name.as_str())),
                    false,
                    &cancel,
                )?;
                backend.insert(meta, &[record], &cancel)?;
                Ok(())
            },
        )
    }

    /// Fetch a registered descriptor back out of `_schemas`.
    pub fn registered_schema(&self, name: &str) -> Result<Option<SchemaDescriptor>, EngineError> {
        let query = Query::builder().filter(where_field("name").eq(name)).build();
        let rows = self
            .backend
            .select(&self.meta, &query, &CancelToken::new())?;
        match rows.into_iter().next() {
            None => Ok(None),
            Some(mut row) => match row.remove("schema") {
                Some(value) => SchemaDescriptor::from_value(value).map(Some),
                None => Ok(None),
            },
        }
    }

    pub fn collection_exists(&self, name: &str) -> Result<bool, EngineError> {
        self.backend.collection_exists(name)
    }

    /// Drop a collection's table and its metadata record.
    pub fn drop_collection(&self, name: &str) -> Result<(), EngineError> {
        self.backend.drop_collection(name)?;
        self.backend.delete(
            &self.meta,
            Some(&where_field("name").eq(name)),
            false,
            &CancelToken::new(),
        )?;
        Ok(())
    }
}

/// Handle to one collection: owns its schema, executor, and validator.
#[derive(Debug)]
pub struct Collection {
    schema: Arc<Schema>,
    executor: Executor,
    validator: Validator,
    bus: Arc<EventBus>,
    subscriptions: RwLock<HashMap<u64, Subscription>>,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Validate a document without writing it.
    pub fn validate(&self, document: &Document, loose: bool) -> Report {
        self.validator.validate(document, loose)
    }

    /// Run a read, emitting `document:read` events.
    pub fn find(&self, query: &Query, cancel: &CancelToken) -> Result<QueryOutput, EngineError> {
        with_events(
            &self.bus,
            "document:read",
            "query",
            &self.schema.name,
            None,
            serde_json::to_value(query).ok(),
            || self.executor.query(query, cancel),
        )
    }

    /// Insert records, emitting `document:create` events.
    pub fn insert(
        &self,
        records: &[Document],
        cancel: &CancelToken,
    ) -> Result<Vec<Document>, EngineError> {
        with_events(
            &self.bus,
            "document:create",
            "insert",
            &self.schema.name,
            serde_json::to_value(records).ok(),
            None,
            || self.executor.insert(records, cancel),
        )
    }

    /// Update matching rows, emitting `document:update` events.
    pub fn update(
        &self,
        updates: &Document,
        filter: Option<&QueryFilter>,
        cancel: &CancelToken,
    ) -> Result<u64, EngineError> {
        with_events(
            &self.bus,
            "document:update",
            "update",
            &self.schema.name,
            serde_json::to_value(updates).ok(),
            filter.and_then(|f| serde_json::to_value(f).ok()),
            || self.executor.update(updates, filter, cancel),
        )
    }

    /// Delete matching rows, emitting `document:delete` events.
    pub fn delete(
        &self,
        filter: Option<&QueryFilter>,
        unsafe_delete: bool,
        cancel: &CancelToken,
    ) -> Result<u64, EngineError> {
        with_events(
            &self.bus,
            "document:delete",
            "delete",
            &self.schema.name,
            None,
            filter.and_then(|f| serde_json::to_value(f).ok()),
            || self.executor.delete(filter, unsafe_delete, cancel),
        )
    }

    /// Evaluate a filter against one document; used to route change
    /// events to interested subscribers.
    pub fn matches(
        &self,
        filter: &QueryFilter,
        document: &Document,
    ) -> Result<bool, EngineError> {
        self.executor.matches(filter, document)
    }

    pub fn register_predicate(&self, name: &str, predicate: PredicateFn) {
        self.executor.register_predicate(name, predicate);
    }

    pub fn register_compute(&self, name: &str, compute: ComputeFn) {
        self.executor.register_compute(name, compute);
    }

    /// Subscribe to an event type, emitting `subscription:register`
    /// events around the registration.
    pub fn subscribe(
        &self,
        event_type: &str,
        label: &str,
        subscriber: Subscriber,
    ) -> Result<Subscription, EngineError> {
        let bus = Arc::clone(&self.bus);
        let subscription = with_events(
            &self.bus,
            "subscription:register",
            "subscribe",
            &self.schema.name,
            Some(json!({"eventType": event_type, "label": label})),
            None,
            move || Ok(SubscriptionResult(bus.subscribe(event_type, label, subscriber))),
        )?;
        let subscription = subscription.0;
        self.subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    /// Cancel a subscription, emitting `subscription:unregister` events.
    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<bool, EngineError> {
        let removed = with_events(
            &self.bus,
            "subscription:unregister",
            "unsubscribe",
            &self.schema.name,
            Some(json!({"id": subscription.id, "label": subscription.label})),
            None,
            || Ok(self.bus.unsubscribe(subscription)),
        )?;
        self.subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&subscription.id);
        Ok(removed)
    }

    /// Active subscriptions held by this handle.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Cancel every subscription held by this handle.
    pub fn close(&self) {
        let drained: Vec<Subscription> = {
            let mut subscriptions = self
                .subscriptions
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            subscriptions.drain().map(|(_, s)| s).collect()
        };
        for subscription in drained {
            self.bus.unsubscribe(&subscription);
        }
    }
}

impl Drop for Collection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Serializable wrapper so subscription handles flow through the event
/// helper's output slot.
struct SubscriptionResult(Subscription);

impl serde::Serialize for SubscriptionResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("id", &self.0.id)?;
        map.serialize_entry("label", &self.0.label)?;
        map.end()
    }
}
