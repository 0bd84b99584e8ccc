//! Declared equivalences between context-information kinds.

use super::ContextInformation;

/// A bidirectional equivalence between two kinds, possibly from different
/// vocabularies (e.g. `CI_USER_LOCATION_LATITUDE` and `latitude`).
#[derive(Debug, Clone)]
pub struct Translation {
    from: ContextInformation,
    to: ContextInformation,
}

impl Translation {
    pub(crate) fn new(from: ContextInformation, to: ContextInformation) -> Self {
        Self {
            from: from.kind(),
            to: to.kind(),
        }
    }

    pub fn from(&self) -> &ContextInformation {
        &self.from
    }

    pub fn to(&self) -> &ContextInformation {
        &self.to
    }

    /// The other side of the translation if `item` exactly matches one side.
    pub fn counterpart(&self, item: &ContextInformation) -> Option<&ContextInformation> {
        if self.from.is_exact_kind_of(item) {
            Some(&self.to)
        } else if self.to.is_exact_kind_of(item) {
            Some(&self.from)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Parameter;

    #[test]
    fn test_counterpart_both_directions() {
        let a = ContextInformation::new("CI_USER_LOCATION_LATITUDE", "FLOAT", Vec::new());
        let b = ContextInformation::new("latitude", "FLOAT", Vec::new());
        let translation = Translation::new(a.clone(), b.clone());

        assert_eq!(translation.counterpart(&a).unwrap().name(), "latitude");
        assert_eq!(
            translation.counterpart(&b).unwrap().name(),
            "CI_USER_LOCATION_LATITUDE"
        );
    }

    #[test]
    fn test_counterpart_requires_exact_kind() {
        let a = ContextInformation::new("distance", "FLOAT", Vec::new());
        let b = ContextInformation::new("CI_DISTANCE", "FLOAT", Vec::new());
        let translation = Translation::new(a, b);

        let qualified = ContextInformation::new(
            "distance",
            "FLOAT",
            vec![Parameter::new("CP_UNIT", "STRING", "KILOMETERS")],
        );
        assert!(translation.counterpart(&qualified).is_none());
    }
}
