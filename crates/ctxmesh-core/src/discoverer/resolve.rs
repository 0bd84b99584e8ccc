//! The resolution algorithm: wire an aggregator to whatever can supply the
//! kinds it still lacks.
//!
//! Resolution is greedy and never backtracks. Registered components are
//! tried first, in registry order, then cataloged classes. A widget (or a
//! producing aggregator) is subscribed to; an interpreter is bound as an
//! [`Interpretation`] only once every one of its inputs can be supplied,
//! which may recursively resolve those inputs. Whatever remains unsatisfied
//! is returned, not treated as an error.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Discoverer, DiscovererError};
use crate::component::{Aggregator, ComponentHandle, ComponentId, Interpretation, Interpreter, Queryable, Role};
use crate::context::ContextInformationList;
use crate::subscription::Subscriber;

/// State spanning one top-level `resolve` call and all its recursion.
#[derive(Debug, Default)]
struct Resolution {
    /// Interpreters whose inputs are currently being resolved.
    in_progress: HashSet<ComponentId>,
}

impl Discoverer {
    /// Close the gap between `unsatisfied` and what the aggregator can
    /// currently obtain. Kinds satisfied along the way are also dropped from
    /// [`Aggregator::unsatisfied`]. Returns the kinds still unsatisfied.
    pub fn resolve(
        self: &Arc<Self>,
        aggregator_id: ComponentId,
        unsatisfied: ContextInformationList,
        all: bool,
        roles: &[Role],
    ) -> Result<ContextInformationList, DiscovererError> {
        let aggregator = match self.get_component(aggregator_id) {
            Some(ComponentHandle::Aggregator(a)) => a,
            Some(_) => return Err(DiscovererError::NotAnAggregator(aggregator_id)),
            None => return Err(DiscovererError::UnknownComponent(aggregator_id)),
        };

        let mut resolution = Resolution::default();
        let requested = unsatisfied.kind_clone();
        let rest = self.resolve_with(&aggregator, requested.clone(), all, roles, &mut resolution);
        let satisfied: ContextInformationList = requested
            .into_iter()
            .filter(|k| !rest.contains_kind_of(k))
            .collect();
        aggregator.mark_satisfied(&satisfied);
        for kind in &rest {
            info!(aggregator = %aggregator_id, kind = %kind, "Kind left unsatisfied");
        }
        Ok(rest)
    }

    fn resolve_with(
        self: &Arc<Self>,
        aggregator: &Arc<Aggregator>,
        mut unsatisfied: ContextInformationList,
        all: bool,
        roles: &[Role],
        resolution: &mut Resolution,
    ) -> ContextInformationList {
        for candidate in self.get_components_by_context_information(&unsatisfied, all, roles) {
            if unsatisfied.is_empty() {
                break;
            }
            self.attach_candidate(aggregator, &candidate, &mut unsatisfied, resolution);
        }

        while !unsatisfied.is_empty() {
            let Some(class) = self.take_matching_class(&unsatisfied, all, roles) else {
                break;
            };
            let outputs = self.build_kinds(&class.description().out);
            match class.instantiate(self, outputs) {
                Ok(candidate) => {
                    info!(
                        class = %class.description().name,
                        component = %candidate.id(),
                        "Instantiated cataloged class"
                    );
                    self.register_new_component(candidate.clone());
                    self.attach_candidate(aggregator, &candidate, &mut unsatisfied, resolution);
                }
                Err(e) => {
                    warn!(class = %class.description().name, error = %e, "Cataloged class failed to instantiate");
                }
            }
        }

        unsatisfied
    }

    fn attach_candidate(
        self: &Arc<Self>,
        aggregator: &Arc<Aggregator>,
        candidate: &ComponentHandle,
        unsatisfied: &mut ContextInformationList,
        resolution: &mut Resolution,
    ) {
        let id = candidate.id();
        if id == aggregator.id() || aggregator.is_attached(id) {
            return;
        }
        match candidate {
            ComponentHandle::Widget(widget) => {
                let provided = widget.queryable().output_kinds();
                self.subscribe(aggregator, id, widget.queryable(), provided, None, unsatisfied);
            }
            ComponentHandle::Aggregator(producer) => {
                if self.depends_on(producer, aggregator.id()) {
                    warn!(
                        aggregator = %aggregator.id(),
                        producer = %id,
                        "Refusing to subscribe to an aggregator that depends on the subscriber"
                    );
                    return;
                }
                let provided: ContextInformationList = unsatisfied
                    .iter()
                    .filter(|k| self.does_satisfy_kind_of(candidate, k))
                    .map(|k| k.kind())
                    .collect();
                let subset = Some(provided.clone());
                self.subscribe(aggregator, id, producer.queryable(), provided, subset, unsatisfied);
            }
            ComponentHandle::Interpreter(interpreter) => {
                self.bind_interpreter(aggregator, interpreter, unsatisfied, resolution);
            }
        }
    }

    fn subscribe(
        &self,
        aggregator: &Aggregator,
        producer: ComponentId,
        queryable: &Queryable,
        provided: ContextInformationList,
        output_subset: Option<ContextInformationList>,
        unsatisfied: &mut ContextInformationList,
    ) {
        if !provided.iter().any(|k| unsatisfied.contains_kind_of(k)) {
            debug!(aggregator = %aggregator.id(), producer = %producer, "Producer adds nothing, skipping");
            return;
        }

        let mut subscriber = Subscriber::new(aggregator.id(), aggregator.name(), queryable.callbacks().names());
        if let Some(subset) = output_subset {
            subscriber = subscriber.with_output_subset(subset);
        }
        queryable.add_subscriber(subscriber);
        aggregator.attach(producer);
        aggregator.add_output_kinds(&provided);
        unsatisfied.remove_all_of_kinds(&provided);
        info!(
            aggregator = %aggregator.id(),
            producer = %producer,
            kinds = provided.len(),
            "Subscribed aggregator to producer"
        );
    }

    fn bind_interpreter(
        self: &Arc<Self>,
        aggregator: &Arc<Aggregator>,
        interpreter: &Arc<Interpreter>,
        unsatisfied: &mut ContextInformationList,
        resolution: &mut Resolution,
    ) {
        let id = interpreter.id();
        let bound: ContextInformationList = interpreter
            .outputs()
            .iter()
            .filter(|o| unsatisfied.contains_kind_of(o))
            .cloned()
            .collect();
        if bound.is_empty() {
            return;
        }
        if !resolution.in_progress.insert(id) {
            warn!(
                aggregator = %aggregator.id(),
                interpreter = %id,
                "Interpreter cycle detected, leaving its outputs unsatisfied"
            );
            return;
        }

        let mut missing = None;
        for input in interpreter.inputs() {
            let handle = ComponentHandle::Aggregator(Arc::clone(aggregator));
            if self.does_satisfy_kind_of(&handle, input) {
                continue;
            }
            let rest = self.resolve_with(
                aggregator,
                vec![input.kind()].into(),
                false,
                &Role::PRODUCERS,
                resolution,
            );
            if !rest.is_empty() {
                missing = Some(input.clone());
                break;
            }
        }
        resolution.in_progress.remove(&id);

        if let Some(input) = missing {
            info!(
                aggregator = %aggregator.id(),
                interpreter = %id,
                input = %input,
                "Dropping interpreter, input cannot be supplied"
            );
            return;
        }

        // The recursion may already have satisfied some of these outputs.
        let bound = bound.subset_of_kinds(unsatisfied);
        if bound.is_empty() || !aggregator.attach(id) {
            return;
        }
        aggregator.add_output_kinds(&bound);
        unsatisfied.remove_all_of_kinds(&bound);
        info!(
            aggregator = %aggregator.id(),
            interpreter = %id,
            outputs = bound.len(),
            "Bound interpretation"
        );
        aggregator.add_interpretation(Interpretation {
            interpreter_id: id,
            input_kinds: interpreter.inputs().kind_clone(),
            output_kinds: bound,
        });
    }

    /// Whether `producer` (transitively) consumes from `consumer`.
    fn depends_on(&self, producer: &Aggregator, consumer: ComponentId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = producer.attached_component_ids();
        while let Some(id) = stack.pop() {
            if id == consumer {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(ComponentHandle::Aggregator(next)) = self.get_component(id) {
                stack.extend(next.attached_component_ids());
            }
        }
        false
    }
}
