//! Interpreters: stateless transforms between context-information kinds.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::{debug, warn};

use super::{Component, ComponentDescription, ComponentHandle, ComponentId, KindDescription, Role, lock};
use crate::BoxFuture;
use crate::context::{ContextInformation, ContextInformationList};
use crate::discoverer::Discoverer;

/// Errors from [`Interpreter::call_interpreter`].
#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    #[error("expected {expected} inputs, got {actual}")]
    InputCount { expected: usize, actual: usize },

    #[error("not an input kind of this interpreter: {0}")]
    UnknownInput(String),

    #[error("declared input not supplied: {0}")]
    MissingInput(String),

    #[error("expected {expected} outputs, got {actual}")]
    OutputCount { expected: usize, actual: usize },

    #[error("not an output kind of this interpreter: {0}")]
    UnknownOutput(String),

    #[error("transform produced an undeclared output: {0}")]
    ProducedUnknownOutput(String),

    #[error("required hook not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("interpretation failed: {0}")]
    Failed(String),
}

/// The transform hook a concrete interpreter implements.
///
/// Inputs arrive under the interpreter's own naming; `outputs` are the kinds
/// the caller asked for.
pub trait Transform: Send + Sync {
    fn interpret_data<'a>(
        &'a self,
        inputs: &'a ContextInformationList,
        outputs: &'a ContextInformationList,
    ) -> BoxFuture<'a, Result<ContextInformationList, InterpreterError>> {
        let _ = (inputs, outputs);
        Box::pin(async { Err(InterpreterError::NotImplemented("interpret_data")) })
    }
}

/// A registered transform with declared input and output kinds.
pub struct Interpreter {
    component: Component,
    inputs: ContextInformationList,
    outputs: ContextInformationList,
    last_interpretation: Mutex<Option<SystemTime>>,
    transform: Box<dyn Transform>,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("id", &self.component.id())
            .field("name", &self.component.name())
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Create an interpreter and register it with the discoverer.
    pub fn new(
        discoverer: &Arc<Discoverer>,
        name: impl Into<String>,
        inputs: ContextInformationList,
        outputs: ContextInformationList,
        transform: impl Transform + 'static,
    ) -> Arc<Self> {
        let interpreter = Arc::new(Self {
            component: Component::new(name),
            inputs: inputs.kind_clone(),
            outputs: outputs.kind_clone(),
            last_interpretation: Mutex::new(None),
            transform: Box::new(transform),
        });
        discoverer.register_new_component(ComponentHandle::Interpreter(Arc::clone(&interpreter)));
        interpreter
    }

    pub fn id(&self) -> ComponentId {
        self.component.id()
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn inputs(&self) -> &ContextInformationList {
        &self.inputs
    }

    pub fn outputs(&self) -> &ContextInformationList {
        &self.outputs
    }

    pub fn is_input_kind(&self, item: &ContextInformation) -> bool {
        self.inputs.contains_kind_of(item)
    }

    pub fn is_output_kind(&self, item: &ContextInformation) -> bool {
        self.outputs.contains_kind_of(item)
    }

    /// When the transform last completed successfully.
    pub fn last_interpretation(&self) -> Option<SystemTime> {
        *lock(&self.last_interpretation)
    }

    /// Validate the call, run the transform and validate its result.
    ///
    /// Both lists must have exactly the declared cardinality and consist of
    /// declared kinds. Inputs matched through a synonym are renamed to the
    /// interpreter's own kind before the transform sees them. The result is
    /// returned only if every produced item is a declared output kind.
    pub async fn call_interpreter(
        &self,
        inputs: &ContextInformationList,
        outputs: &ContextInformationList,
    ) -> Result<ContextInformationList, InterpreterError> {
        let inputs = self.validate_inputs(inputs).inspect_err(|e| {
            warn!(interpreter = %self.id(), error = %e, "Rejected interpreter inputs");
        })?;
        self.validate_outputs(outputs).inspect_err(|e| {
            warn!(interpreter = %self.id(), error = %e, "Rejected interpreter outputs");
        })?;

        let produced = self.transform.interpret_data(&inputs, outputs).await?;

        let now = SystemTime::now();
        let mut result = ContextInformationList::new();
        for item in produced {
            if !self.is_output_kind(&item) {
                warn!(interpreter = %self.id(), kind = %item, "Transform produced an undeclared output");
                return Err(InterpreterError::ProducedUnknownOutput(item.to_string()));
            }
            let item = if item.timestamp().is_none() {
                item.with_timestamp(now)
            } else {
                item
            };
            result.put(item, false);
        }

        *lock(&self.last_interpretation) = Some(now);
        debug!(interpreter = %self.id(), items = result.len(), "Interpretation complete");
        Ok(result)
    }

    fn validate_inputs(
        &self,
        inputs: &ContextInformationList,
    ) -> Result<ContextInformationList, InterpreterError> {
        if inputs.len() != self.inputs.len() {
            return Err(InterpreterError::InputCount {
                expected: self.inputs.len(),
                actual: inputs.len(),
            });
        }

        let mut substituted = ContextInformationList::new();
        for item in inputs {
            let Some(declared) = self.inputs.get_by_kind(item) else {
                return Err(InterpreterError::UnknownInput(item.to_string()));
            };
            let item = if declared.is_exact_kind_of(item) {
                item.clone()
            } else {
                item.renamed_as(declared)
            };
            substituted.put(item, false);
        }

        if let Some(missing) = self.inputs.iter().find(|d| !substituted.contains_kind_of(d)) {
            return Err(InterpreterError::MissingInput(missing.to_string()));
        }
        Ok(substituted)
    }

    fn validate_outputs(&self, outputs: &ContextInformationList) -> Result<(), InterpreterError> {
        if outputs.len() != self.outputs.len() {
            return Err(InterpreterError::OutputCount {
                expected: self.outputs.len(),
                actual: outputs.len(),
            });
        }
        match outputs.iter().find(|o| !self.is_output_kind(o)) {
            Some(unknown) => Err(InterpreterError::UnknownOutput(unknown.to_string())),
            None => Ok(()),
        }
    }

    pub fn description(&self) -> ComponentDescription {
        let mut description = ComponentDescription::new(Role::Interpreter, self.name());
        description.inputs = KindDescription::all_of(&self.inputs);
        description.out = KindDescription::all_of(&self.outputs);
        description
    }
}
