//! Component roles: widgets (producers), interpreters (transforms) and
//! aggregators (consumer/producers).
//!
//! Every role composes a flat [`Component`] (id + name). Live components are
//! handed around as a [`ComponentHandle`], a closed tagged union over the
//! three roles, and described statically by a [`ComponentDescription`].

pub mod aggregator;
pub mod interpreter;
mod queryable;
pub mod widget;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::BoxFuture;
use crate::context::{ContextInformation, ContextInformationList, Parameter};

pub use aggregator::{Aggregator, AggregatorError, Interpretation};
pub use interpreter::{Interpreter, InterpreterError, Transform};
pub use queryable::Queryable;
pub use widget::{StaticSource, Widget, WidgetError, WidgetOptions, WidgetSource};

/// Process-unique component identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The role a component plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Widget,
    Interpreter,
    Aggregator,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Widget, Role::Interpreter, Role::Aggregator];

    /// The roles considered when wiring an aggregator by default.
    pub const PRODUCERS: [Role; 2] = [Role::Widget, Role::Interpreter];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Widget => "widget",
            Role::Interpreter => "interpreter",
            Role::Aggregator => "aggregator",
        };
        f.write_str(name)
    }
}

/// Identity shared by every role.
#[derive(Debug, Clone)]
pub struct Component {
    id: ComponentId,
    name: String,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ComponentId::next(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A kind as it appears in a static capability description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl KindDescription {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn from_config(config: &ctxmesh_config::KindConfig) -> Self {
        Self {
            name: config.name.clone(),
            data_type: config.data_type.clone(),
            parameters: config.parameters.iter().map(Parameter::from_config).collect(),
        }
    }

    fn of(item: &ContextInformation) -> Self {
        Self {
            name: item.name().to_string(),
            data_type: item.data_type().to_string(),
            parameters: item.parameters().to_vec(),
        }
    }

    fn all_of(list: &ContextInformationList) -> Vec<Self> {
        list.iter().map(Self::of).collect()
    }
}

/// Static capability description of a component or component class.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentDescription {
    pub role: Role,
    pub name: String,
    pub out: Vec<KindDescription>,
    #[serde(rename = "in", skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<KindDescription>,
    #[serde(rename = "const", skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<KindDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_objects: Vec<String>,
}

impl ComponentDescription {
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            out: Vec::new(),
            inputs: Vec::new(),
            constants: Vec::new(),
            update_interval_ms: None,
            required_objects: Vec::new(),
        }
    }

    pub fn widget(name: impl Into<String>) -> Self {
        Self::new(Role::Widget, name)
    }

    pub fn interpreter(name: impl Into<String>) -> Self {
        Self::new(Role::Interpreter, name)
    }

    pub fn aggregator(name: impl Into<String>) -> Self {
        Self::new(Role::Aggregator, name)
    }

    pub fn output(mut self, kind: KindDescription) -> Self {
        self.out.push(kind);
        self
    }

    pub fn input(mut self, kind: KindDescription) -> Self {
        self.inputs.push(kind);
        self
    }

    pub fn constant(mut self, kind: KindDescription) -> Self {
        self.constants.push(kind);
        self
    }

    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn requires(mut self, object: impl Into<String>) -> Self {
        self.required_objects.push(object.into());
        self
    }
}

/// A live, registered component of any role.
#[derive(Debug, Clone)]
pub enum ComponentHandle {
    Widget(Arc<Widget>),
    Interpreter(Arc<Interpreter>),
    Aggregator(Arc<Aggregator>),
}

impl ComponentHandle {
    pub fn id(&self) -> ComponentId {
        match self {
            Self::Widget(w) => w.id(),
            Self::Interpreter(i) => i.id(),
            Self::Aggregator(a) => a.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Widget(w) => w.name(),
            Self::Interpreter(i) => i.name(),
            Self::Aggregator(a) => a.name(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Widget(_) => Role::Widget,
            Self::Interpreter(_) => Role::Interpreter,
            Self::Aggregator(_) => Role::Aggregator,
        }
    }

    /// The kinds this component publishes (declared outputs for interpreters).
    pub fn output_kinds(&self) -> ContextInformationList {
        match self {
            Self::Widget(w) => w.queryable().output_kinds(),
            Self::Interpreter(i) => i.outputs().kind_clone(),
            Self::Aggregator(a) => a.queryable().output_kinds(),
        }
    }

    /// The publishing side of widgets and aggregators.
    pub fn queryable(&self) -> Option<&Queryable> {
        match self {
            Self::Widget(w) => Some(w.queryable()),
            Self::Interpreter(_) => None,
            Self::Aggregator(a) => Some(a.queryable()),
        }
    }

    pub fn description(&self) -> ComponentDescription {
        match self {
            Self::Widget(w) => w.description(),
            Self::Interpreter(i) => i.description(),
            Self::Aggregator(a) => a.description(),
        }
    }

    /// Pub/sub ingress. Only aggregators consume data; other roles ignore it.
    pub fn put_data(&self, items: ContextInformationList) -> BoxFuture<'_, Result<(), AggregatorError>> {
        match self {
            Self::Aggregator(a) => a.put_data(items),
            other => {
                tracing::warn!(
                    component = %other.id(),
                    role = %other.role(),
                    "Component does not accept data, dropping delivery"
                );
                Box::pin(async { Ok(()) })
            }
        }
    }
}

/// Lock component state, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
