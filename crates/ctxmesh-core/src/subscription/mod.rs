//! Publish/subscribe protocol between producers and their subscribers.
//!
//! A producer exposes named [`Callback`]s, each grouping the output kinds it
//! is willing to publish together, and keeps a [`SubscriberList`]. On
//! notification every subscriber of every callback whose [`Condition`]s hold
//! receives the intersection of the callback's kinds, its optional output
//! subset and the producer's current outputs.

mod condition;

use crate::component::ComponentId;
use crate::context::{ContextInformation, ContextInformationList};

pub use condition::{ComparisonMethod, Condition, Equals, MatchesReference, Unequals};

/// Name of the callback every producer starts with.
pub const UPDATE_CALLBACK: &str = "UPDATE";

/// A named group of output kinds published together.
#[derive(Debug, Clone)]
pub struct Callback {
    name: String,
    kinds: ContextInformationList,
}

impl Callback {
    pub fn new(name: impl Into<String>, kinds: ContextInformationList) -> Self {
        Self {
            name: name.into(),
            kinds: kinds.kind_clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kinds(&self) -> &ContextInformationList {
        &self.kinds
    }

    pub fn add_kind(&mut self, kind: &ContextInformation) {
        self.kinds.put(kind.kind(), false);
    }
}

/// Callbacks keyed by name.
#[derive(Debug, Clone, Default)]
pub struct CallbackList {
    callbacks: Vec<Callback>,
}

impl CallbackList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the callback with the same name.
    pub fn put(&mut self, callback: Callback) {
        match self.callbacks.iter_mut().find(|c| c.name == callback.name) {
            Some(existing) => *existing = callback,
            None => self.callbacks.push(callback),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Callback> {
        self.callbacks.iter().find(|c| c.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Callback> {
        self.callbacks.iter_mut().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.callbacks.iter().map(|c| c.name.clone()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Callback> {
        self.callbacks.iter()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// A component's registration for a producer's callbacks.
#[derive(Debug, Clone)]
pub struct Subscriber {
    subscriber_id: ComponentId,
    subscriber_name: String,
    callbacks: Vec<String>,
    output_subset: Option<ContextInformationList>,
    conditions: Vec<Condition>,
}

impl Subscriber {
    pub fn new(
        subscriber_id: ComponentId,
        subscriber_name: impl Into<String>,
        callbacks: Vec<String>,
    ) -> Self {
        Self {
            subscriber_id,
            subscriber_name: subscriber_name.into(),
            callbacks,
            output_subset: None,
            conditions: Vec::new(),
        }
    }

    /// Restrict deliveries to these kinds.
    pub fn with_output_subset(mut self, subset: ContextInformationList) -> Self {
        self.output_subset = Some(subset.kind_clone());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn id(&self) -> ComponentId {
        self.subscriber_id
    }

    pub fn name(&self) -> &str {
        &self.subscriber_name
    }

    pub fn callbacks(&self) -> &[String] {
        &self.callbacks
    }

    pub fn output_subset(&self) -> Option<&ContextInformationList> {
        self.output_subset.as_ref()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_subscribed_to(&self, callback: &str) -> bool {
        self.callbacks.iter().any(|c| c == callback)
    }

    /// Every condition holds; vacuously true without conditions.
    pub fn conditions_hold(
        &self,
        new: &ContextInformationList,
        old: &ContextInformationList,
    ) -> bool {
        self.conditions.iter().all(|c| c.evaluate(new, old))
    }

    /// The part of `outputs` this subscriber receives for `callback`.
    pub fn select(
        &self,
        callback: &Callback,
        outputs: &ContextInformationList,
    ) -> ContextInformationList {
        let data = outputs.subset_of_kinds(callback.kinds());
        match &self.output_subset {
            Some(subset) => data.subset_of_kinds(subset),
            None => data,
        }
    }
}

/// Subscribers keyed by subscriber id.
#[derive(Debug, Clone, Default)]
pub struct SubscriberList {
    subscribers: Vec<Subscriber>,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the subscriber with the same id.
    pub fn put(&mut self, subscriber: Subscriber) {
        match self
            .subscribers
            .iter_mut()
            .find(|s| s.subscriber_id == subscriber.subscriber_id)
        {
            Some(existing) => *existing = subscriber,
            None => self.subscribers.push(subscriber),
        }
    }

    pub fn remove(&mut self, id: ComponentId) -> Option<Subscriber> {
        let idx = self.subscribers.iter().position(|s| s.subscriber_id == id)?;
        Some(self.subscribers.remove(idx))
    }

    pub fn get(&self, id: ComponentId) -> Option<&Subscriber> {
        self.subscribers.iter().find(|s| s.subscriber_id == id)
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Subscriber> {
        self.subscribers.iter()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Data owed to one subscriber by one notification.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subscriber_id: ComponentId,
    pub callback: String,
    pub data: ContextInformationList,
}

/// Work out who receives what for a single notification. Empty selections
/// are skipped.
pub fn plan_deliveries(
    callbacks: &CallbackList,
    subscribers: &SubscriberList,
    outputs: &ContextInformationList,
    previous: &ContextInformationList,
) -> Vec<Delivery> {
    let mut deliveries = Vec::new();
    for callback in callbacks.iter() {
        for subscriber in subscribers.iter() {
            if !subscriber.is_subscribed_to(callback.name()) {
                continue;
            }
            if !subscriber.conditions_hold(outputs, previous) {
                continue;
            }
            let data = subscriber.select(callback, outputs);
            if data.is_empty() {
                continue;
            }
            deliveries.push(Delivery {
                subscriber_id: subscriber.id(),
                callback: callback.name().to_string(),
                data,
            });
        }
    }
    deliveries
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn ci(name: &str, value: i64) -> ContextInformation {
        ContextInformation::new(name, "INTEGER", Vec::new()).with_value(value)
    }

    fn outputs(a: i64, b: i64) -> ContextInformationList {
        vec![ci("a", a), ci("b", b)].into()
    }

    fn update_callbacks() -> CallbackList {
        let mut callbacks = CallbackList::new();
        callbacks.put(Callback::new(UPDATE_CALLBACK, outputs(0, 0)));
        callbacks
    }

    #[test]
    fn test_callback_list_upserts_by_name() {
        let mut callbacks = update_callbacks();
        callbacks.put(Callback::new(UPDATE_CALLBACK, vec![ci("a", 0)].into()));
        callbacks.put(Callback::new("ALARM", vec![ci("b", 0)].into()));
        assert_eq!(callbacks.len(), 2);
        assert_eq!(callbacks.get(UPDATE_CALLBACK).unwrap().kinds().len(), 1);
        assert_eq!(callbacks.names(), vec!["UPDATE", "ALARM"]);
    }

    #[test]
    fn test_subscriber_list_upserts_by_id() {
        let id = ComponentId::next();
        let mut subscribers = SubscriberList::new();
        subscribers.put(Subscriber::new(id, "agg", vec![UPDATE_CALLBACK.into()]));
        subscribers.put(Subscriber::new(id, "agg", vec!["ALARM".into()]));
        assert_eq!(subscribers.len(), 1);
        assert!(subscribers.get(id).unwrap().is_subscribed_to("ALARM"));
        assert!(subscribers.remove(id).is_some());
        assert!(subscribers.is_empty());
    }

    #[test]
    fn test_unconditional_subscriber_always_receives() {
        let id = ComponentId::next();
        let mut subscribers = SubscriberList::new();
        subscribers.put(Subscriber::new(id, "agg", vec![UPDATE_CALLBACK.into()]));

        let deliveries =
            plan_deliveries(&update_callbacks(), &subscribers, &outputs(1, 2), &outputs(1, 2));
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].subscriber_id, id);
        assert_eq!(deliveries[0].data.len(), 2);
    }

    #[test]
    fn test_output_subset_narrows_delivery() {
        let mut subscribers = SubscriberList::new();
        subscribers.put(
            Subscriber::new(ComponentId::next(), "agg", vec![UPDATE_CALLBACK.into()])
                .with_output_subset(vec![ci("b", 0)].into()),
        );

        let deliveries =
            plan_deliveries(&update_callbacks(), &subscribers, &outputs(1, 2), &outputs(0, 0));
        assert_eq!(deliveries.len(), 1);
        let data = &deliveries[0].data;
        assert_eq!(data.len(), 1);
        assert_eq!(data.iter().next().unwrap().value(), &json!(2));
    }

    #[test]
    fn test_condition_gates_delivery() {
        let mut subscribers = SubscriberList::new();
        subscribers.put(
            Subscriber::new(ComponentId::next(), "agg", vec![UPDATE_CALLBACK.into()])
                .with_condition(Condition::new("a unchanged", &ci("a", 0), Equals, Value::Null)),
        );

        let unchanged =
            plan_deliveries(&update_callbacks(), &subscribers, &outputs(1, 2), &outputs(1, 0));
        assert_eq!(unchanged.len(), 1);

        let changed =
            plan_deliveries(&update_callbacks(), &subscribers, &outputs(5, 2), &outputs(1, 0));
        assert!(changed.is_empty());
    }

    #[test]
    fn test_unsubscribed_callback_is_skipped() {
        let mut subscribers = SubscriberList::new();
        subscribers.put(Subscriber::new(ComponentId::next(), "agg", vec!["ALARM".into()]));
        let deliveries =
            plan_deliveries(&update_callbacks(), &subscribers, &outputs(1, 2), &outputs(0, 0));
        assert!(deliveries.is_empty());
    }
}
