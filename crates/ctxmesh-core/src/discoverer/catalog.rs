//! Not-yet-instantiated component classes.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{Discoverer, DiscovererError};
use crate::component::{ComponentDescription, ComponentHandle, Role, lock};
use crate::context::ContextInformationList;

/// Builds a live component from the discoverer and the output kinds derived
/// from the class description.
pub type Factory = Arc<
    dyn Fn(&Arc<Discoverer>, ContextInformationList) -> Result<ComponentHandle, DiscovererError>
        + Send
        + Sync,
>;

/// A catalog entry: a static capability description plus a factory.
#[derive(Clone)]
pub struct ComponentClass {
    description: ComponentDescription,
    factory: Factory,
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl ComponentClass {
    pub fn new<F>(description: ComponentDescription, factory: F) -> Self
    where
        F: Fn(&Arc<Discoverer>, ContextInformationList) -> Result<ComponentHandle, DiscovererError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            description,
            factory: Arc::new(factory),
        }
    }

    pub fn description(&self) -> &ComponentDescription {
        &self.description
    }

    pub fn role(&self) -> Role {
        self.description.role
    }

    pub(crate) fn instantiate(
        &self,
        discoverer: &Arc<Discoverer>,
        outputs: ContextInformationList,
    ) -> Result<ComponentHandle, DiscovererError> {
        (self.factory)(discoverer, outputs)
    }
}

impl Discoverer {
    /// Add a class to the catalog.
    pub fn register_component_class(&self, class: ComponentClass) {
        debug!(class = %class.description.name, role = %class.role(), "Component class cataloged");
        lock(&self.catalog).push(class);
    }

    /// Descriptions of every cataloged class, in catalog order.
    pub fn catalog_descriptions(&self) -> Vec<ComponentDescription> {
        lock(&self.catalog).iter().map(|c| c.description.clone()).collect()
    }

    /// Whether every global object the class requires is available.
    fn is_instantiable(&self, class: &ComponentClass) -> bool {
        class.description.required_objects.iter().all(|o| self.is_available(o))
    }

    /// Remove and return the first cataloged class of an allowed role whose
    /// described outputs could supply `unsatisfied` under the `all` rule.
    pub(crate) fn take_matching_class(
        &self,
        unsatisfied: &ContextInformationList,
        all: bool,
        roles: &[Role],
    ) -> Option<ComponentClass> {
        let mut catalog = lock(&self.catalog);
        let idx = catalog.iter().position(|class| {
            if !roles.contains(&class.role()) || !self.is_instantiable(class) {
                return false;
            }
            let outputs = self.build_kinds(&class.description.out);
            if all {
                unsatisfied.iter().all(|u| outputs.contains_kind_of(u))
            } else {
                unsatisfied.iter().any(|u| outputs.contains_kind_of(u))
            }
        })?;
        Some(catalog.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{KindDescription, StaticSource, Widget};

    fn widget_class(name: &str, output: &str) -> ComponentClass {
        let name = name.to_string();
        ComponentClass::new(
            ComponentDescription::widget(name.clone()).output(KindDescription::new(output, "INTEGER")),
            move |d, outputs| {
                Ok(ComponentHandle::Widget(Widget::new(
                    d,
                    name.clone(),
                    outputs,
                    StaticSource::default(),
                )))
            },
        )
    }

    #[test]
    fn test_take_matching_class_removes_it() {
        let d = Discoverer::new();
        d.register_component_class(widget_class("Battery", "CI_BATTERY"));
        let wanted: ContextInformationList =
            vec![d.build_context_information("CI_BATTERY", "INTEGER", Vec::new())].into();

        let class = d.take_matching_class(&wanted, false, &Role::ALL).unwrap();
        assert_eq!(class.description().name, "Battery");
        assert!(d.catalog_descriptions().is_empty());
        assert!(d.take_matching_class(&wanted, false, &Role::ALL).is_none());
    }

    #[test]
    fn test_required_objects_gate_classes() {
        let d = Discoverer::new();
        let mut class = widget_class("Gps", "CI_LATITUDE");
        class.description.required_objects.push("geolocation".into());
        d.register_component_class(class);
        let wanted: ContextInformationList =
            vec![d.build_context_information("CI_LATITUDE", "INTEGER", Vec::new())].into();

        assert!(d.take_matching_class(&wanted, false, &Role::ALL).is_none());
        d.add_available_object("geolocation");
        assert!(d.take_matching_class(&wanted, false, &Role::ALL).is_some());
    }

    #[test]
    fn test_role_filter() {
        let d = Discoverer::new();
        d.register_component_class(widget_class("Battery", "CI_BATTERY"));
        let wanted: ContextInformationList =
            vec![d.build_context_information("CI_BATTERY", "INTEGER", Vec::new())].into();
        assert!(d.take_matching_class(&wanted, false, &[Role::Interpreter]).is_none());
        assert_eq!(d.catalog_descriptions().len(), 1);
    }

    #[test]
    fn test_instantiate_registers_widget() {
        let d = Discoverer::new();
        let class = widget_class("Battery", "CI_BATTERY");
        let outputs = d.build_kinds(&class.description().out);
        let handle = class.instantiate(&d, outputs).unwrap();
        assert!(d.get_component(handle.id()).is_some());
        assert_eq!(handle.role(), Role::Widget);
    }
}
