//! Context information: the named, typed, parameterized datum circulated
//! between components.
//!
//! Items are built exclusively through
//! [`Discoverer::build_context_information`](crate::discoverer::Discoverer::build_context_information)
//! so that synonyms from the translation table are always attached. Two items
//! are of the same *kind* when their name, data type and parameters match,
//! either directly or through one hop of either side's synonym list.

mod list;
mod translation;

use std::fmt;
use std::time::SystemTime;

use serde::{Serialize, Serializer};
use serde_json::Value;

pub use ctxmesh_config::PV_INPUT;
pub use list::ContextInformationList;
pub use translation::Translation;

/// The value carried by a [`Parameter`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// Supplied by the caller at invocation time; matches any concrete value.
    Input,
    /// A concrete value.
    Value(Value),
}

impl ParameterValue {
    fn from_json(value: Value) -> Self {
        if value.as_str() == Some(PV_INPUT) {
            Self::Input
        } else {
            Self::Value(value)
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str(PV_INPUT),
            Self::Value(Value::String(s)) => f.write_str(s),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for ParameterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Input => serializer.serialize_str(PV_INPUT),
            Self::Value(v) => v.serialize(serializer),
        }
    }
}

/// A key/value qualifier on a context-information kind (e.g. a unit).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub key: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub value: ParameterValue,
}

impl Parameter {
    /// A parameter with a concrete value. The string `"PV_INPUT"` yields an
    /// input parameter.
    pub fn new(key: impl Into<String>, data_type: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            data_type: data_type.into(),
            value: ParameterValue::from_json(value.into()),
        }
    }

    /// A parameter whose value is supplied by the caller.
    pub fn input(key: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data_type: data_type.into(),
            value: ParameterValue::Input,
        }
    }

    pub fn from_config(config: &ctxmesh_config::ParameterConfig) -> Self {
        Self::new(&config.key, &config.data_type, config.value.clone())
    }

    pub fn is_input(&self) -> bool {
        self.value == ParameterValue::Input
    }

    /// Input parameters only compare keys.
    pub fn matches(&self, other: &Parameter) -> bool {
        if self.key != other.key {
            return false;
        }
        if self.is_input() || other.is_input() {
            return true;
        }
        self.data_type == other.data_type && self.value == other.value
    }
}

fn parameters_match(a: &[Parameter], b: &[Parameter]) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|pa| b.iter().any(|pb| pa.key == pb.key && pa.matches(pb)))
}

/// A single context-information item.
///
/// A `Null` value means nothing has been acquired for this item yet.
#[derive(Debug, Clone, Serialize)]
pub struct ContextInformation {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<Parameter>,
    value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<SystemTime>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    synonyms: Vec<ContextInformation>,
}

impl ContextInformation {
    pub(crate) fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        let mut item = Self {
            name: name.into(),
            data_type: data_type.into(),
            parameters: Vec::with_capacity(parameters.len()),
            value: Value::Null,
            timestamp: None,
            synonyms: Vec::new(),
        };
        for parameter in parameters {
            item.set_parameter(parameter);
        }
        item
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp
    }

    pub fn synonyms(&self) -> &[ContextInformation] {
        &self.synonyms
    }

    /// Whether a value has been acquired for this item.
    pub fn has_value(&self) -> bool {
        !self.value.is_null()
    }

    /// Rename the item. Synonyms belonged to the old identity and are
    /// dropped; rebuild through [`Discoverer::build_context_information`]
    /// to pick up the new name's translations.
    ///
    /// [`Discoverer::build_context_information`]: crate::Discoverer::build_context_information
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.synonyms.clear();
        self
    }

    /// Change the data type, dropping synonyms like [`Self::with_name`].
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self.synonyms.clear();
        self
    }

    /// Add a parameter, replacing any parameter with the same key.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.set_parameter(parameter);
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        for parameter in parameters {
            self.set_parameter(parameter);
        }
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach a synonym. Only the synonym's own kind is kept; its synonyms
    /// are dropped since matching never follows more than one hop.
    pub fn with_synonym(mut self, synonym: &ContextInformation) -> Self {
        self.add_synonym(synonym);
        self
    }

    pub fn with_synonyms<'a>(
        mut self,
        synonyms: impl IntoIterator<Item = &'a ContextInformation>,
    ) -> Self {
        for synonym in synonyms {
            self.add_synonym(synonym);
        }
        self
    }

    pub(crate) fn add_synonym(&mut self, synonym: &ContextInformation) {
        if synonym.is_exact_kind_of(self)
            || self.synonyms.iter().any(|s| s.is_exact_kind_of(synonym))
        {
            return;
        }
        let mut kind = synonym.kind();
        kind.synonyms.clear();
        self.synonyms.push(kind);
    }

    fn set_parameter(&mut self, parameter: Parameter) {
        match self.parameters.iter_mut().find(|p| p.key == parameter.key) {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
    }

    /// Name, data type and parameters match without consulting synonyms.
    pub fn is_exact_kind_of(&self, other: &ContextInformation) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && parameters_match(&self.parameters, &other.parameters)
    }

    /// Whether both items describe the same kind, directly or through one
    /// synonym hop on either side.
    pub fn is_kind_of(&self, other: &ContextInformation) -> bool {
        self.is_exact_kind_of(other)
            || self.synonyms.iter().any(|s| s.is_exact_kind_of(other))
            || other.synonyms.iter().any(|s| self.is_exact_kind_of(s))
    }

    /// Same kind and same value.
    pub fn equals(&self, other: &ContextInformation) -> bool {
        self.is_kind_of(other) && self.value == other.value
    }

    pub fn has_input_parameter(&self) -> bool {
        self.parameters.iter().any(Parameter::is_input)
    }

    /// A copy with value and timestamp stripped.
    pub fn kind(&self) -> ContextInformation {
        Self {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            parameters: self.parameters.clone(),
            value: Value::Null,
            timestamp: None,
            synonyms: self.synonyms.clone(),
        }
    }

    /// A copy of this item carrying `preferred`'s identity (name, data type,
    /// parameters, synonyms) with this item's value and timestamp.
    pub(crate) fn renamed_as(&self, preferred: &ContextInformation) -> ContextInformation {
        let mut item = preferred.kind();
        item.value = self.value.clone();
        item.timestamp = self.timestamp;
        item
    }

    /// The storage table key: name plus parameter set, without data type.
    pub fn table_name(&self) -> String {
        let mut out = self.name.clone();
        write_parameters(&mut out, &self.parameters);
        out
    }
}

fn write_parameters(out: &mut String, parameters: &[Parameter]) {
    if parameters.is_empty() {
        return;
    }
    let mut sorted: Vec<&Parameter> = parameters.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));
    out.push('[');
    for (i, parameter) in sorted.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        out.push_str(&format!("{}={}", parameter.key, parameter.value));
    }
    out.push(']');
}

/// Canonical kind string: `name[key=value;...]:type`, parameters sorted by key.
impl fmt::Display for ContextInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_name(), self.data_type)
    }
}
