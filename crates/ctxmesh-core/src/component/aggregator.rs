//! Aggregators: consumers that re-expose what they collect.
//!
//! An aggregator declares the kinds it wants, lets the discoverer wire it to
//! producers, and from then on receives every push through
//! [`Aggregator::put_data`]. Accepted items are persisted and may trigger the
//! interpretations bound during resolution, whose results re-enter
//! `put_data`.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    Component, ComponentDescription, ComponentHandle, ComponentId, KindDescription, Queryable, Role, lock,
};
use crate::BoxFuture;
use crate::context::{ContextInformation, ContextInformationList};
use crate::discoverer::{Discoverer, DiscovererError};
use crate::storage::{Storage, StorageError, StoredRow};
use crate::subscription::Subscriber;

/// Upper bound on chained interpretation hops triggered by one `put_data`.
pub const MAX_CASCADE_DEPTH: usize = 16;

/// Errors surfaced by aggregator operations.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("discoverer error: {0}")]
    Discoverer(#[from] DiscovererError),
}

/// A binding of an interpreter to the kinds it serves for one aggregator.
/// Created only by the resolver.
#[derive(Debug, Clone, Serialize)]
pub struct Interpretation {
    pub interpreter_id: ComponentId,
    pub input_kinds: ContextInformationList,
    pub output_kinds: ContextInformationList,
}

impl Interpretation {
    /// Whether any of `items` is one of this binding's inputs.
    pub fn is_triggered_by(&self, items: &ContextInformationList) -> bool {
        items.iter().any(|i| self.input_kinds.contains_kind_of(i))
    }
}

/// A composite consumer/producer.
pub struct Aggregator {
    component: Component,
    queryable: Queryable,
    attached: Mutex<Vec<ComponentId>>,
    interpretations: Mutex<Vec<Interpretation>>,
    unsatisfied: Mutex<ContextInformationList>,
    storage: Option<Arc<dyn Storage>>,
    storage_warned: AtomicBool,
    discoverer: Weak<Discoverer>,
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("id", &self.component.id())
            .field("name", &self.component.name())
            .field("attached", &*lock(&self.attached))
            .field("storage", &self.storage.as_ref().map(|s| s.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl Aggregator {
    /// Create an aggregator desiring `desired`, register it, and resolve the
    /// desired kinds against widgets and interpreters.
    pub fn new(
        discoverer: &Arc<Discoverer>,
        name: impl Into<String>,
        desired: ContextInformationList,
        storage: Option<Arc<dyn Storage>>,
    ) -> Arc<Self> {
        Self::with_roles(discoverer, name, desired, storage, &Role::PRODUCERS)
    }

    /// Like [`Aggregator::new`] but resolving against the given roles.
    pub fn with_roles(
        discoverer: &Arc<Discoverer>,
        name: impl Into<String>,
        desired: ContextInformationList,
        storage: Option<Arc<dyn Storage>>,
        roles: &[Role],
    ) -> Arc<Self> {
        let desired = desired.kind_clone();
        let aggregator = Arc::new(Self {
            component: Component::new(name),
            queryable: Queryable::new(desired.clone(), ContextInformationList::new()),
            attached: Mutex::new(Vec::new()),
            interpretations: Mutex::new(Vec::new()),
            unsatisfied: Mutex::new(desired.clone()),
            storage,
            storage_warned: AtomicBool::new(false),
            discoverer: Arc::downgrade(discoverer),
        });
        discoverer.register_new_component(ComponentHandle::Aggregator(Arc::clone(&aggregator)));

        if let Err(e) = discoverer.resolve(aggregator.id(), desired, false, roles) {
            warn!(aggregator = %aggregator.id(), error = %e, "Resolution failed");
        }
        info!(
            aggregator = %aggregator.id(),
            attached = lock(&aggregator.attached).len(),
            interpretations = lock(&aggregator.interpretations).len(),
            unsatisfied = lock(&aggregator.unsatisfied).len(),
            "Aggregator ready"
        );
        aggregator
    }

    pub fn id(&self) -> ComponentId {
        self.component.id()
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn queryable(&self) -> &Queryable {
        &self.queryable
    }

    pub fn add_subscriber(&self, subscriber: Subscriber) {
        self.queryable.add_subscriber(subscriber);
    }

    pub fn remove_subscriber(&self, id: ComponentId) -> Option<Subscriber> {
        self.queryable.remove_subscriber(id)
    }

    /// Desired kinds no producer could be found for.
    pub fn unsatisfied(&self) -> ContextInformationList {
        lock(&self.unsatisfied).clone()
    }

    pub fn attached_component_ids(&self) -> Vec<ComponentId> {
        lock(&self.attached).clone()
    }

    pub fn is_attached(&self, id: ComponentId) -> bool {
        lock(&self.attached).contains(&id)
    }

    pub fn interpretations(&self) -> Vec<Interpretation> {
        lock(&self.interpretations).clone()
    }

    /// Outputs that currently hold a value.
    pub fn current_data(&self) -> ContextInformationList {
        self.queryable
            .snapshot()
            .into_iter()
            .filter(ContextInformation::has_value)
            .collect()
    }

    pub(crate) fn attach(&self, id: ComponentId) -> bool {
        let mut attached = lock(&self.attached);
        if attached.contains(&id) {
            return false;
        }
        attached.push(id);
        true
    }

    pub(crate) fn add_output_kinds(&self, kinds: &ContextInformationList) {
        for kind in kinds {
            self.queryable.add_output_kind(kind);
        }
    }

    pub(crate) fn mark_satisfied(&self, kinds: &ContextInformationList) {
        lock(&self.unsatisfied).remove_all_of_kinds(kinds);
    }

    pub(crate) fn add_interpretation(&self, interpretation: Interpretation) {
        lock(&self.interpretations).push(interpretation);
    }

    /// Pub/sub ingress for widget notifications and interpreter results.
    pub fn put_data(&self, items: ContextInformationList) -> BoxFuture<'_, Result<(), AggregatorError>> {
        self.put_data_at(items, 0)
    }

    fn put_data_at(
        &self,
        items: ContextInformationList,
        depth: usize,
    ) -> BoxFuture<'_, Result<(), AggregatorError>> {
        Box::pin(async move {
            if depth == 0 {
                self.queryable.remember_previous();
            }
            let accepted = self.queryable.update(items);
            if accepted.is_empty() {
                return Ok(());
            }
            debug!(aggregator = %self.id(), items = accepted.len(), depth, "Accepted data");
            self.persist(&accepted)?;

            let triggered = self.triggered_by(&accepted);
            if !triggered.is_empty() {
                if depth >= MAX_CASCADE_DEPTH {
                    warn!(aggregator = %self.id(), depth, "Interpretation cascade too deep, stopping");
                } else {
                    for interpretation in &triggered {
                        self.run_interpretation(interpretation, depth).await?;
                    }
                }
            }

            if depth == 0 {
                self.queryable.notify(self.id(), &self.discoverer).await;
            }
            Ok(())
        })
    }

    fn persist(&self, items: &ContextInformationList) -> Result<(), StorageError> {
        let Some(storage) = &self.storage else {
            self.warn_storage_unavailable();
            return Ok(());
        };
        for item in items {
            storage.store(item)?;
        }
        Ok(())
    }

    fn warn_storage_unavailable(&self) {
        if !self.storage_warned.swap(true, Ordering::Relaxed) {
            warn!(aggregator = %self.id(), "No storage backend, persistence disabled");
        }
    }

    /// Interpretations with an input among `items`, one per interpreter.
    fn triggered_by(&self, items: &ContextInformationList) -> Vec<Interpretation> {
        let mut seen = HashSet::new();
        lock(&self.interpretations)
            .iter()
            .filter(|i| i.is_triggered_by(items))
            .filter(|i| seen.insert(i.interpreter_id))
            .cloned()
            .collect()
    }

    async fn run_interpretation(
        &self,
        interpretation: &Interpretation,
        depth: usize,
    ) -> Result<(), AggregatorError> {
        let current = self.queryable.outputs();
        let mut inputs = ContextInformationList::new();
        for kind in &interpretation.input_kinds {
            match current.get_by_kind(kind) {
                Some(item) if item.has_value() => inputs.put(item.clone(), false),
                _ => {
                    debug!(
                        aggregator = %self.id(),
                        interpreter = %interpretation.interpreter_id,
                        waiting_for = %kind,
                        "Interpretation inputs incomplete"
                    );
                    return Ok(());
                }
            }
        }

        let Some(discoverer) = self.discoverer.upgrade() else {
            return Ok(());
        };
        let Some(ComponentHandle::Interpreter(interpreter)) =
            discoverer.get_component(interpretation.interpreter_id)
        else {
            debug!(
                aggregator = %self.id(),
                interpreter = %interpretation.interpreter_id,
                "Bound interpreter no longer registered"
            );
            return Ok(());
        };

        match interpreter.call_interpreter(&inputs, interpreter.outputs()).await {
            Ok(result) => self.put_data_at(result, depth + 1).await,
            Err(e) => {
                warn!(
                    aggregator = %self.id(),
                    interpreter = %interpreter.id(),
                    error = %e,
                    "Interpretation failed"
                );
                Ok(())
            }
        }
    }

    /// Refresh every attached producer. Widgets acquire and notify (which
    /// reaches this aggregator); attached aggregators hand over their current
    /// data.
    pub async fn query_referenced_components(&self) -> Result<(), AggregatorError> {
        let Some(discoverer) = self.discoverer.upgrade() else {
            return Ok(());
        };
        for id in self.attached_component_ids() {
            match discoverer.get_component(id) {
                Some(ComponentHandle::Widget(widget)) => {
                    if let Err(e) = widget.update_widget_information().await {
                        warn!(aggregator = %self.id(), widget = %id, error = %e, "Widget refresh failed");
                    }
                }
                Some(ComponentHandle::Aggregator(other)) => {
                    self.put_data(other.current_data()).await?;
                }
                Some(ComponentHandle::Interpreter(_)) | None => {}
            }
        }
        Ok(())
    }

    /// Stored rows of one table (see [`ContextInformation::table_name`]).
    pub async fn retrieve_stored(&self, table: &str) -> Result<Vec<StoredRow>, AggregatorError> {
        match &self.storage {
            Some(storage) => Ok(storage.retrieve_named(table).await?),
            None => {
                self.warn_storage_unavailable();
                Ok(Vec::new())
            }
        }
    }

    /// Names of every stored table.
    pub async fn stored_names(&self) -> Result<Vec<String>, AggregatorError> {
        match &self.storage {
            Some(storage) => Ok(storage.names_overview().await?),
            None => {
                self.warn_storage_unavailable();
                Ok(Vec::new())
            }
        }
    }

    pub fn description(&self) -> ComponentDescription {
        let mut description = ComponentDescription::new(Role::Aggregator, self.name());
        description.out = KindDescription::all_of(&self.queryable.outputs());
        description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{StaticSource, Widget};
    use crate::storage::InMemoryStorage;
    use serde_json::json;

    fn kind(d: &Discoverer, name: &str) -> ContextInformation {
        d.build_context_information(name, "INTEGER", Vec::new())
    }

    #[tokio::test]
    async fn test_put_data_ignores_unknown_kinds() {
        let d = Discoverer::new();
        let aggregator = Aggregator::new(&d, "agg", vec![kind(&d, "a")].into(), None);
        aggregator
            .put_data(vec![kind(&d, "a").with_value(1), kind(&d, "zzz").with_value(2)].into())
            .await
            .unwrap();
        let data = aggregator.current_data();
        assert_eq!(data.len(), 1);
        assert_eq!(data.get_by_kind(&kind(&d, "a")).unwrap().value(), &json!(1));
    }

    #[tokio::test]
    async fn test_put_data_persists() {
        let d = Discoverer::new();
        let storage = Arc::new(InMemoryStorage::default());
        let aggregator = Aggregator::new(
            &d,
            "agg",
            vec![kind(&d, "a")].into(),
            Some(storage.clone() as Arc<dyn Storage>),
        );
        aggregator.put_data(vec![kind(&d, "a").with_value(5)].into()).await.unwrap();

        let rows = aggregator.retrieve_stored("a").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, json!(5));
        assert_eq!(aggregator.stored_names().await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_missing_storage_is_a_noop() {
        let d = Discoverer::new();
        let aggregator = Aggregator::new(&d, "agg", vec![kind(&d, "a")].into(), None);
        aggregator.put_data(vec![kind(&d, "a").with_value(5)].into()).await.unwrap();
        aggregator.put_data(vec![kind(&d, "a").with_value(6)].into()).await.unwrap();
        assert!(aggregator.stored_names().await.unwrap().is_empty());
        assert!(aggregator.storage_warned.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_unsatisfied_without_producers() {
        let d = Discoverer::new();
        let aggregator = Aggregator::new(&d, "agg", vec![kind(&d, "a")].into(), None);
        assert_eq!(aggregator.unsatisfied().len(), 1);
        assert!(aggregator.attached_component_ids().is_empty());
    }

    #[test]
    fn test_re_resolve_updates_unsatisfied() {
        let d = Discoverer::new();
        let aggregator = Aggregator::new(&d, "agg", vec![kind(&d, "a"), kind(&d, "b")].into(), None);
        assert_eq!(aggregator.unsatisfied().len(), 2);

        let widget = Widget::new(&d, "w", vec![kind(&d, "a")].into(), StaticSource::default());
        let rest = d
            .resolve(aggregator.id(), aggregator.unsatisfied(), false, &Role::PRODUCERS)
            .unwrap();

        assert_eq!(rest.len(), 1);
        assert!(aggregator.is_attached(widget.id()));
        let unsatisfied = aggregator.unsatisfied();
        assert_eq!(unsatisfied.len(), 1);
        assert!(unsatisfied.contains_kind_of(&kind(&d, "b")));
    }

    #[tokio::test]
    async fn test_widget_push_reaches_aggregator() {
        let d = Discoverer::new();
        let widget = Widget::new(
            &d,
            "w",
            vec![kind(&d, "a")].into(),
            StaticSource::new(vec![kind(&d, "a").with_value(3)].into()),
        );
        let aggregator = Aggregator::new(&d, "agg", vec![kind(&d, "a")].into(), None);
        assert!(aggregator.is_attached(widget.id()));
        assert!(aggregator.unsatisfied().is_empty());

        aggregator.query_referenced_components().await.unwrap();
        assert_eq!(
            aggregator.current_data().get_by_kind(&kind(&d, "a")).unwrap().value(),
            &json!(3)
        );
    }

    #[test]
    fn test_attach_is_idempotent() {
        let d = Discoverer::new();
        let aggregator = Arc::new(Aggregator {
            component: Component::new("agg"),
            queryable: Queryable::new(ContextInformationList::new(), ContextInformationList::new()),
            attached: Mutex::new(Vec::new()),
            interpretations: Mutex::new(Vec::new()),
            unsatisfied: Mutex::new(ContextInformationList::new()),
            storage: None,
            storage_warned: AtomicBool::new(false),
            discoverer: Arc::downgrade(&d),
        });
        let id = ComponentId::next();
        assert!(aggregator.attach(id));
        assert!(!aggregator.attach(id));
        assert_eq!(aggregator.attached_component_ids(), vec![id]);
    }
}
