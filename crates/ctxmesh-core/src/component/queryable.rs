//! The publishing side shared by widgets and aggregators.

use std::sync::{Mutex, Weak};
use std::time::SystemTime;

use tracing::{debug, warn};

use super::{ComponentId, lock};
use crate::context::{ContextInformation, ContextInformationList};
use crate::discoverer::Discoverer;
use crate::subscription::{
    Callback, CallbackList, Delivery, Subscriber, SubscriberList, UPDATE_CALLBACK, plan_deliveries,
};

/// Current outputs, callbacks and subscribers of a producer.
#[derive(Debug)]
pub struct Queryable {
    outputs: Mutex<ContextInformationList>,
    previous: Mutex<ContextInformationList>,
    constants: ContextInformationList,
    callbacks: Mutex<CallbackList>,
    subscribers: Mutex<SubscriberList>,
}

impl Queryable {
    /// Start with the given output kinds and constant outputs. An `UPDATE`
    /// callback covering every output is installed.
    pub(crate) fn new(outputs: ContextInformationList, constants: ContextInformationList) -> Self {
        let mut all = outputs.kind_clone();
        all.put_all(constants.kind_clone(), false);
        let mut callbacks = CallbackList::new();
        callbacks.put(Callback::new(UPDATE_CALLBACK, all));

        Self {
            outputs: Mutex::new(outputs),
            previous: Mutex::new(ContextInformationList::new()),
            constants,
            callbacks: Mutex::new(callbacks),
            subscribers: Mutex::new(SubscriberList::new()),
        }
    }

    /// Current dynamic outputs.
    pub fn outputs(&self) -> ContextInformationList {
        lock(&self.outputs).clone()
    }

    pub fn constants(&self) -> &ContextInformationList {
        &self.constants
    }

    /// Dynamic outputs followed by constants.
    pub fn snapshot(&self) -> ContextInformationList {
        let mut all = self.outputs();
        all.put_all(self.constants.iter().cloned(), false);
        all
    }

    pub fn output_kinds(&self) -> ContextInformationList {
        self.snapshot().kind_clone()
    }

    pub fn is_output_kind(&self, item: &ContextInformation) -> bool {
        lock(&self.outputs).contains_kind_of(item) || self.constants.contains_kind_of(item)
    }

    /// Add an output kind, also publishing it through the `UPDATE` callback.
    /// Returns `false` if the kind was already present.
    pub(crate) fn add_output_kind(&self, kind: &ContextInformation) -> bool {
        if self.is_output_kind(kind) {
            return false;
        }
        lock(&self.outputs).put(kind.kind(), false);
        if let Some(update) = lock(&self.callbacks).get_mut(UPDATE_CALLBACK) {
            update.add_kind(kind);
        }
        true
    }

    /// Record the current outputs as the baseline that conditions compare
    /// against on the next notification. Called once per top-level update,
    /// never between the hops of an interpretation cascade.
    pub(crate) fn remember_previous(&self) {
        let outputs = lock(&self.outputs).clone();
        *lock(&self.previous) = outputs;
    }

    /// Upsert every item that is a recognized output kind. Items matched
    /// through a synonym are stored under this producer's own naming.
    /// Returns the accepted items.
    pub(crate) fn update(&self, items: ContextInformationList) -> ContextInformationList {
        let mut outputs = lock(&self.outputs);

        let now = SystemTime::now();
        let mut accepted = ContextInformationList::new();
        for item in items {
            let Some(declared) = outputs.get_by_kind(&item) else {
                debug!(kind = %item, "Ignoring item that is not an output kind");
                continue;
            };
            let mut item = if declared.is_exact_kind_of(&item) {
                item
            } else {
                item.renamed_as(declared)
            };
            if item.timestamp().is_none() {
                item = item.with_timestamp(now);
            }
            outputs.put(item.clone(), false);
            accepted.put(item, false);
        }
        accepted
    }

    pub fn callbacks(&self) -> CallbackList {
        lock(&self.callbacks).clone()
    }

    pub fn put_callback(&self, callback: Callback) {
        lock(&self.callbacks).put(callback);
    }

    pub fn subscribers(&self) -> SubscriberList {
        lock(&self.subscribers).clone()
    }

    pub fn add_subscriber(&self, subscriber: Subscriber) {
        lock(&self.subscribers).put(subscriber);
    }

    pub fn remove_subscriber(&self, id: ComponentId) -> Option<Subscriber> {
        lock(&self.subscribers).remove(id)
    }

    /// Who receives what right now. Outputs without a value are never sent.
    pub(crate) fn plan_notification(&self) -> Vec<Delivery> {
        let current: ContextInformationList = self
            .snapshot()
            .into_iter()
            .filter(ContextInformation::has_value)
            .collect();
        let previous = lock(&self.previous).clone();
        let callbacks = lock(&self.callbacks).clone();
        let subscribers = lock(&self.subscribers).clone();
        plan_deliveries(&callbacks, &subscribers, &current, &previous)
    }

    /// Push current outputs to every eligible subscriber through its
    /// `put_data`. One delivery per subscriber and callback.
    pub(crate) async fn notify(&self, publisher: ComponentId, discoverer: &Weak<Discoverer>) {
        let deliveries = self.plan_notification();
        if deliveries.is_empty() {
            return;
        }
        let Some(discoverer) = discoverer.upgrade() else {
            warn!(publisher = %publisher, "Discoverer dropped, cannot deliver notifications");
            return;
        };
        for delivery in deliveries {
            let Some(subscriber) = discoverer.get_component(delivery.subscriber_id) else {
                debug!(
                    publisher = %publisher,
                    subscriber = %delivery.subscriber_id,
                    "Subscriber no longer registered"
                );
                continue;
            };
            debug!(
                publisher = %publisher,
                subscriber = %delivery.subscriber_id,
                callback = %delivery.callback,
                items = delivery.data.len(),
                "Delivering notification"
            );
            if let Err(e) = subscriber.put_data(delivery.data).await {
                warn!(
                    publisher = %publisher,
                    subscriber = %delivery.subscriber_id,
                    error = %e,
                    "Subscriber failed to accept data"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ci(name: &str) -> ContextInformation {
        ContextInformation::new(name, "INTEGER", Vec::new())
    }

    fn queryable() -> Queryable {
        Queryable::new(
            vec![ci("a"), ci("b")].into(),
            vec![ci("serial").with_value(7)].into(),
        )
    }

    #[test]
    fn test_update_accepts_only_output_kinds() {
        let q = queryable();
        let accepted = q.update(vec![ci("a").with_value(1), ci("zzz").with_value(2)].into());
        assert_eq!(accepted.len(), 1);
        assert!(accepted.iter().all(|i| i.timestamp().is_some()));
        assert_eq!(q.outputs().get_by_kind(&ci("a")).unwrap().value(), &json!(1));
    }

    #[test]
    fn test_remember_previous_keeps_baseline() {
        let q = queryable();
        q.update(vec![ci("a").with_value(1)].into());
        q.remember_previous();
        q.update(vec![ci("a").with_value(2)].into());
        q.update(vec![ci("a").with_value(3)].into());
        let previous = lock(&q.previous).clone();
        assert_eq!(previous.get_by_kind(&ci("a")).unwrap().value(), &json!(1));
    }

    #[test]
    fn test_synonym_items_stored_under_own_name() {
        let q = Queryable::new(
            vec![ci("CI_LATITUDE").with_synonym(&ci("latitude"))].into(),
            ContextInformationList::new(),
        );
        let accepted = q.update(vec![ci("latitude").with_value(52)].into());
        assert_eq!(accepted.iter().next().unwrap().name(), "CI_LATITUDE");
    }

    #[test]
    fn test_snapshot_includes_constants() {
        let q = queryable();
        assert_eq!(q.snapshot().len(), 3);
        assert!(q.is_output_kind(&ci("serial")));
        assert_eq!(
            q.callbacks().get(UPDATE_CALLBACK).unwrap().kinds().len(),
            3
        );
    }

    #[test]
    fn test_add_output_kind_extends_update_callback() {
        let q = queryable();
        assert!(q.add_output_kind(&ci("c")));
        assert!(!q.add_output_kind(&ci("c")));
        assert!(q.is_output_kind(&ci("c")));
        assert!(
            q.callbacks()
                .get(UPDATE_CALLBACK)
                .unwrap()
                .kinds()
                .contains_kind_of(&ci("c"))
        );
    }

    #[test]
    fn test_plan_skips_outputs_without_value() {
        let q = queryable();
        q.add_subscriber(Subscriber::new(
            ComponentId::next(),
            "sub",
            vec![UPDATE_CALLBACK.to_string()],
        ));
        let deliveries = q.plan_notification();
        assert_eq!(deliveries.len(), 1);
        // only the constant has a value so far
        assert_eq!(deliveries[0].data.len(), 1);
    }
}
