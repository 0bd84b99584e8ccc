//! Discoverer: component registry, item factory and resolution engine.
//!
//! The discoverer is an explicit context object shared as `Arc<Discoverer>`.
//! It owns:
//!
//! - the live registry, partitioned by [`Role`] and kept in registration
//!   order (first match wins during resolution),
//! - a catalog of not-yet-instantiated [`ComponentClass`]es,
//! - the translation table applied by [`Discoverer::build_context_information`].
//!
//! Components hold only a `Weak` reference back, so dropping the last
//! `Arc<Discoverer>` tears everything down.

mod catalog;
mod resolve;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ctxmesh_config::{AppConfig, KindConfig, ValuedKindConfig};
use tracing::{debug, info};

use crate::component::{
    Aggregator, ComponentDescription, ComponentHandle, ComponentId, Interpreter, KindDescription, Role,
    Widget, lock,
};
use crate::context::{ContextInformation, ContextInformationList, Parameter, Translation};

pub use catalog::{ComponentClass, Factory};

/// Errors from registry lookups and catalog instantiation.
#[derive(Debug, thiserror::Error)]
pub enum DiscovererError {
    #[error("no component registered with id {0}")]
    UnknownComponent(ComponentId),

    #[error("component {0} is not an aggregator")]
    NotAnAggregator(ComponentId),

    #[error("failed to instantiate {class}: {reason}")]
    Instantiation { class: String, reason: String },
}

#[derive(Default)]
struct Registry {
    widgets: Vec<Arc<Widget>>,
    interpreters: Vec<Arc<Interpreter>>,
    aggregators: Vec<Arc<Aggregator>>,
}

impl Registry {
    fn contains(&self, id: ComponentId) -> bool {
        self.widgets.iter().any(|c| c.id() == id)
            || self.interpreters.iter().any(|c| c.id() == id)
            || self.aggregators.iter().any(|c| c.id() == id)
    }

    fn handles(&self, roles: &[Role]) -> Vec<ComponentHandle> {
        let mut out = Vec::new();
        if roles.contains(&Role::Widget) {
            out.extend(self.widgets.iter().cloned().map(ComponentHandle::Widget));
        }
        if roles.contains(&Role::Interpreter) {
            out.extend(self.interpreters.iter().cloned().map(ComponentHandle::Interpreter));
        }
        if roles.contains(&Role::Aggregator) {
            out.extend(self.aggregators.iter().cloned().map(ComponentHandle::Aggregator));
        }
        out
    }
}

/// Registry and resolution engine.
#[derive(Default)]
pub struct Discoverer {
    registry: RwLock<Registry>,
    catalog: Mutex<Vec<ComponentClass>>,
    translations: RwLock<Vec<Translation>>,
    available_objects: RwLock<HashSet<String>>,
}

impl std::fmt::Debug for Discoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = read(&self.registry);
        f.debug_struct("Discoverer")
            .field("widgets", &registry.widgets.len())
            .field("interpreters", &registry.interpreters.len())
            .field("aggregators", &registry.aggregators.len())
            .field("catalog", &lock(&self.catalog).len())
            .field("translations", &read(&self.translations).len())
            .finish()
    }
}

impl Discoverer {
    /// An empty discoverer.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A discoverer seeded with the configured translations and available
    /// objects.
    pub fn from_config(config: &AppConfig) -> Arc<Self> {
        let discoverer = Self::new();
        for translation in &config.translations {
            discoverer.add_translation(
                &KindDescription::from_config(&translation.from),
                &KindDescription::from_config(&translation.to),
            );
        }
        for object in &config.discoverer.available_objects {
            discoverer.add_available_object(object);
        }
        info!(
            translations = config.translations.len(),
            available_objects = config.discoverer.available_objects.len(),
            "Discoverer initialised from config"
        );
        discoverer
    }

    /// Drop every registration and catalog entry. Translations stay.
    pub fn clear(&self) {
        *write(&self.registry) = Registry::default();
        lock(&self.catalog).clear();
        info!("Discoverer cleared");
    }

    // ── Translations and item construction ─────────────────────────

    /// Declare `from` and `to` equivalent. Affects items built afterwards.
    pub fn add_translation(&self, from: &KindDescription, to: &KindDescription) {
        let translation = Translation::new(plain_item(from), plain_item(to));
        debug!(from = %translation.from(), to = %translation.to(), "Translation added");
        write(&self.translations).push(translation);
    }

    pub fn translations(&self) -> Vec<Translation> {
        read(&self.translations).clone()
    }

    /// Build an item, attaching the counterpart of every translation one of
    /// whose sides it matches as a synonym.
    pub fn build_context_information(
        &self,
        name: impl Into<String>,
        data_type: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> ContextInformation {
        let mut item = ContextInformation::new(name, data_type, parameters);
        for translation in read(&self.translations).iter() {
            if let Some(counterpart) = translation.counterpart(&item) {
                item.add_synonym(counterpart);
            }
        }
        item
    }

    pub fn build_from_description(&self, description: &KindDescription) -> ContextInformation {
        self.build_context_information(
            &description.name,
            &description.data_type,
            description.parameters.clone(),
        )
    }

    pub fn build_kinds(&self, descriptions: &[KindDescription]) -> ContextInformationList {
        descriptions.iter().map(|d| self.build_from_description(d)).collect()
    }

    pub fn build_from_config(&self, config: &KindConfig) -> ContextInformation {
        self.build_from_description(&KindDescription::from_config(config))
    }

    /// Build an item carrying the configured value, if any.
    pub fn build_valued_from_config(&self, config: &ValuedKindConfig) -> ContextInformation {
        let item = self.build_from_config(&config.kind);
        match &config.value {
            Some(value) => item.with_value(value.clone()),
            None => item,
        }
    }

    // ── Global objects gating catalog classes ──────────────────────

    pub fn add_available_object(&self, name: impl Into<String>) {
        write(&self.available_objects).insert(name.into());
    }

    pub fn is_available(&self, name: &str) -> bool {
        read(&self.available_objects).contains(name)
    }

    // ── Registry ───────────────────────────────────────────────────

    /// Add a live component to its role partition. Returns `false` if the id
    /// is already registered.
    pub fn register_new_component(&self, component: ComponentHandle) -> bool {
        let mut registry = write(&self.registry);
        if registry.contains(component.id()) {
            return false;
        }
        info!(
            component = %component.id(),
            name = %component.name(),
            role = %component.role(),
            "Component registered"
        );
        match component {
            ComponentHandle::Widget(w) => registry.widgets.push(w),
            ComponentHandle::Interpreter(i) => registry.interpreters.push(i),
            ComponentHandle::Aggregator(a) => registry.aggregators.push(a),
        }
        true
    }

    /// Remove a live component. Returns it if it was registered.
    pub fn unregister_component(&self, id: ComponentId) -> Option<ComponentHandle> {
        let mut registry = write(&self.registry);
        let removed = if let Some(idx) = registry.widgets.iter().position(|c| c.id() == id) {
            ComponentHandle::Widget(registry.widgets.remove(idx))
        } else if let Some(idx) = registry.interpreters.iter().position(|c| c.id() == id) {
            ComponentHandle::Interpreter(registry.interpreters.remove(idx))
        } else if let Some(idx) = registry.aggregators.iter().position(|c| c.id() == id) {
            ComponentHandle::Aggregator(registry.aggregators.remove(idx))
        } else {
            return None;
        };
        info!(component = %id, role = %removed.role(), "Component unregistered");
        Some(removed)
    }

    pub fn get_component(&self, id: ComponentId) -> Option<ComponentHandle> {
        read(&self.registry)
            .handles(&Role::ALL)
            .into_iter()
            .find(|c| c.id() == id)
    }

    /// Live components of the given roles, widgets first, then interpreters,
    /// then aggregators, each in registration order.
    pub fn components(&self, roles: &[Role]) -> Vec<ComponentHandle> {
        read(&self.registry).handles(roles)
    }

    /// Static descriptions of the live components of the given roles.
    pub fn descriptions(&self, roles: &[Role]) -> Vec<ComponentDescription> {
        self.components(roles).iter().map(ComponentHandle::description).collect()
    }

    /// Components able to supply `items`. With `all`, a single component
    /// must supply every item; otherwise supplying one is enough.
    pub fn get_components_by_context_information(
        &self,
        items: &ContextInformationList,
        all: bool,
        roles: &[Role],
    ) -> Vec<ComponentHandle> {
        if items.is_empty() {
            return Vec::new();
        }
        self.components(roles)
            .into_iter()
            .filter(|c| {
                if all {
                    items.iter().all(|i| self.does_satisfy_kind_of(c, i))
                } else {
                    items.iter().any(|i| self.does_satisfy_kind_of(c, i))
                }
            })
            .collect()
    }

    /// Whether `component` can supply `kind`. An aggregator supplies what its
    /// attached components and bound interpretations supply.
    pub fn does_satisfy_kind_of(&self, component: &ComponentHandle, kind: &ContextInformation) -> bool {
        self.satisfies(component, kind, &mut HashSet::new())
    }

    fn satisfies(
        &self,
        component: &ComponentHandle,
        kind: &ContextInformation,
        visited: &mut HashSet<ComponentId>,
    ) -> bool {
        if !visited.insert(component.id()) {
            return false;
        }
        match component {
            ComponentHandle::Widget(w) => w.queryable().is_output_kind(kind),
            ComponentHandle::Interpreter(i) => i.is_output_kind(kind),
            ComponentHandle::Aggregator(a) => {
                if a.interpretations().iter().any(|i| i.output_kinds.contains_kind_of(kind)) {
                    return true;
                }
                a.attached_component_ids().into_iter().any(|id| match self.get_component(id) {
                    Some(ComponentHandle::Interpreter(_)) | None => false,
                    Some(attached) => self.satisfies(&attached, kind, visited),
                })
            }
        }
    }
}

/// Items in the translation table carry no synonyms of their own.
fn plain_item(description: &KindDescription) -> ContextInformation {
    ContextInformation::new(
        &description.name,
        &description.data_type,
        description.parameters.clone(),
    )
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{StaticSource, Transform};
    use ctxmesh_config::{KindConfig, TranslationConfig};
    use pretty_assertions::assert_eq;

    struct Noop;

    impl Transform for Noop {}

    fn widget(d: &Arc<Discoverer>, name: &str, outputs: &[&str]) -> Arc<Widget> {
        let outputs = outputs
            .iter()
            .map(|o| d.build_context_information(*o, "INTEGER", Vec::new()))
            .collect();
        Widget::new(d, name, outputs, StaticSource::default())
    }

    fn kind(d: &Discoverer, name: &str) -> ContextInformation {
        d.build_context_information(name, "INTEGER", Vec::new())
    }

    #[test]
    fn test_build_attaches_translation_synonyms() {
        let d = Discoverer::new();
        d.add_translation(
            &KindDescription::new("CI_USER_LOCATION_LATITUDE", "FLOAT"),
            &KindDescription::new("latitude", "FLOAT"),
        );
        let a = d.build_context_information("CI_USER_LOCATION_LATITUDE", "FLOAT", Vec::new());
        let b = d.build_context_information("latitude", "FLOAT", Vec::new());
        assert_eq!(a.synonyms().len(), 1);
        assert_eq!(a.synonyms()[0].name(), "latitude");
        assert_eq!(b.synonyms()[0].name(), "CI_USER_LOCATION_LATITUDE");
        assert!(a.is_kind_of(&b));
    }

    #[test]
    fn test_from_config_loads_translations_and_objects() {
        let mut config = AppConfig::default();
        config.translations.push(TranslationConfig {
            from: KindConfig {
                name: "a".into(),
                data_type: "FLOAT".into(),
                parameters: Vec::new(),
            },
            to: KindConfig {
                name: "b".into(),
                data_type: "FLOAT".into(),
                parameters: Vec::new(),
            },
        });
        config.discoverer.available_objects.push("geolocation".into());

        let d = Discoverer::from_config(&config);
        assert_eq!(d.translations().len(), 1);
        assert!(d.is_available("geolocation"));
        assert!(!d.is_available("camera"));
    }

    #[test]
    fn test_register_is_idempotent() {
        let d = Discoverer::new();
        let w = widget(&d, "w", &["a"]);
        assert!(!d.register_new_component(ComponentHandle::Widget(w.clone())));
        assert_eq!(d.components(&Role::ALL).len(), 1);
    }

    #[test]
    fn test_unregister() {
        let d = Discoverer::new();
        let w = widget(&d, "w", &["a"]);
        let removed = d.unregister_component(w.id()).unwrap();
        assert_eq!(removed.role(), Role::Widget);
        assert!(d.get_component(w.id()).is_none());
        assert!(d.unregister_component(w.id()).is_none());
    }

    #[test]
    fn test_components_partitioned_by_role() {
        let d = Discoverer::new();
        widget(&d, "w", &["a"]);
        Interpreter::new(
            &d,
            "i",
            vec![kind(&d, "a")].into(),
            vec![kind(&d, "b")].into(),
            Noop,
        );
        assert_eq!(d.components(&[Role::Widget]).len(), 1);
        assert_eq!(d.components(&[Role::Interpreter]).len(), 1);
        assert_eq!(d.components(&Role::PRODUCERS).len(), 2);
        let roles: Vec<Role> = d.components(&Role::ALL).iter().map(|c| c.role()).collect();
        assert_eq!(roles, vec![Role::Widget, Role::Interpreter]);
    }

    #[test]
    fn test_get_components_all_vs_any() {
        let d = Discoverer::new();
        let w1 = widget(&d, "w1", &["a"]);
        let w2 = widget(&d, "w2", &["a", "b"]);
        let wanted: ContextInformationList = vec![kind(&d, "a"), kind(&d, "b")].into();

        let any: Vec<ComponentId> = d
            .get_components_by_context_information(&wanted, false, &Role::ALL)
            .iter()
            .map(ComponentHandle::id)
            .collect();
        assert_eq!(any, vec![w1.id(), w2.id()]);

        let all: Vec<ComponentId> = d
            .get_components_by_context_information(&wanted, true, &Role::ALL)
            .iter()
            .map(ComponentHandle::id)
            .collect();
        assert_eq!(all, vec![w2.id()]);
    }

    #[test]
    fn test_aggregator_satisfies_through_attached_widgets() {
        let d = Discoverer::new();
        widget(&d, "w", &["a"]);
        let aggregator = Aggregator::new(&d, "agg", vec![kind(&d, "a")].into(), None);
        let handle = ComponentHandle::Aggregator(aggregator);
        assert!(d.does_satisfy_kind_of(&handle, &kind(&d, "a")));
        assert!(!d.does_satisfy_kind_of(&handle, &kind(&d, "b")));
    }

    #[test]
    fn test_clear_drops_registrations() {
        let d = Discoverer::new();
        widget(&d, "w", &["a"]);
        d.add_translation(&KindDescription::new("a", "INTEGER"), &KindDescription::new("b", "INTEGER"));
        d.clear();
        assert!(d.components(&Role::ALL).is_empty());
        assert_eq!(d.translations().len(), 1);
    }

    #[test]
    fn test_descriptions() {
        let d = Discoverer::new();
        widget(&d, "w", &["a"]);
        let descriptions = d.descriptions(&Role::ALL);
        assert_eq!(descriptions.len(), 1);
        assert_eq!(descriptions[0].name, "w");
        assert_eq!(descriptions[0].out[0].name, "a");
    }
}
