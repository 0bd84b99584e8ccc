//! Conditions filtering which notifications reach a subscriber.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::context::{ContextInformation, ContextInformationList};

static NULL: Value = Value::Null;

/// A pluggable comparison between a condition's reference value and a
/// widget's new and previous values for the condition's target kind.
pub trait ComparisonMethod: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn process(&self, reference: &Value, new_value: &Value, old_value: &Value) -> bool;
}

/// Holds when the value did not change.
#[derive(Debug, Clone, Copy, Default)]
pub struct Equals;

impl ComparisonMethod for Equals {
    fn name(&self) -> &str {
        "Equals"
    }

    fn process(&self, _reference: &Value, new_value: &Value, old_value: &Value) -> bool {
        new_value == old_value
    }
}

/// Holds when the value changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unequals;

impl ComparisonMethod for Unequals {
    fn name(&self) -> &str {
        "Unequals"
    }

    fn process(&self, _reference: &Value, new_value: &Value, old_value: &Value) -> bool {
        new_value != old_value
    }
}

/// Holds when the new value equals the reference value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchesReference;

impl ComparisonMethod for MatchesReference {
    fn name(&self) -> &str {
        "MatchesReference"
    }

    fn process(&self, reference: &Value, new_value: &Value, _old_value: &Value) -> bool {
        new_value == reference
    }
}

/// A named filter on one target kind.
#[derive(Debug, Clone)]
pub struct Condition {
    name: String,
    target: ContextInformation,
    method: Arc<dyn ComparisonMethod>,
    reference: Value,
}

impl Condition {
    pub fn new(
        name: impl Into<String>,
        target: &ContextInformation,
        method: impl ComparisonMethod + 'static,
        reference: impl Into<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.kind(),
            method: Arc::new(method),
            reference: reference.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &ContextInformation {
        &self.target
    }

    pub fn method(&self) -> &dyn ComparisonMethod {
        self.method.as_ref()
    }

    pub fn reference(&self) -> &Value {
        &self.reference
    }

    /// Compare the target's value in `new` against its value in `old`.
    /// A target missing from `new` never satisfies the condition; a target
    /// missing from `old` compares against `Null`.
    pub fn evaluate(&self, new: &ContextInformationList, old: &ContextInformationList) -> bool {
        let Some(new_item) = new.get_by_kind(&self.target) else {
            return false;
        };
        let old_value = old
            .get_by_kind(&self.target)
            .map(ContextInformation::value)
            .unwrap_or(&NULL);
        self.method
            .process(&self.reference, new_item.value(), old_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn battery(value: i64) -> ContextInformation {
        ContextInformation::new("CI_BATTERY", "INTEGER", Vec::new()).with_value(value)
    }

    fn list(item: ContextInformation) -> ContextInformationList {
        vec![item].into()
    }

    #[test]
    fn test_equals_and_unequals() {
        let equals = Condition::new("same", &battery(0), Equals, Value::Null);
        let unequals = Condition::new("changed", &battery(0), Unequals, Value::Null);

        assert!(equals.evaluate(&list(battery(40)), &list(battery(40))));
        assert!(!equals.evaluate(&list(battery(41)), &list(battery(40))));
        assert!(unequals.evaluate(&list(battery(41)), &list(battery(40))));
        assert!(!unequals.evaluate(&list(battery(40)), &list(battery(40))));
    }

    #[test]
    fn test_missing_previous_value_is_null() {
        let unequals = Condition::new("changed", &battery(0), Unequals, Value::Null);
        assert!(unequals.evaluate(&list(battery(40)), &ContextInformationList::new()));
    }

    #[test]
    fn test_missing_target_never_holds() {
        let equals = Condition::new("same", &battery(0), Equals, Value::Null);
        let other = ContextInformation::new("CI_CHARGING", "BOOLEAN", Vec::new()).with_value(true);
        assert!(!equals.evaluate(&list(other.clone()), &list(other)));
    }

    #[test]
    fn test_matches_reference() {
        let low = Condition::new("empty", &battery(0), MatchesReference, json!(0));
        assert!(low.evaluate(&list(battery(0)), &list(battery(5))));
        assert!(!low.evaluate(&list(battery(5)), &list(battery(0))));
        assert_eq!(low.method().name(), "MatchesReference");
    }
}
