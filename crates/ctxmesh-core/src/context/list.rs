//! Ordered, kind-unique collection of context information.

use serde::Serialize;

use super::ContextInformation;

/// An ordered collection holding at most one item per kind, unless an item is
/// explicitly put with `multiple_instances`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ContextInformationList {
    items: Vec<ContextInformation>,
}

impl ContextInformationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContextInformation> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[ContextInformation] {
        &self.items
    }

    /// Upsert by kind: an existing item of the same kind is replaced in
    /// place; otherwise (or when `multiple_instances` is set) the item is
    /// appended.
    pub fn put(&mut self, item: ContextInformation, multiple_instances: bool) {
        if !multiple_instances {
            if let Some(existing) = self.items.iter_mut().find(|i| i.is_kind_of(&item)) {
                *existing = item;
                return;
            }
        }
        self.items.push(item);
    }

    pub fn put_all(
        &mut self,
        items: impl IntoIterator<Item = ContextInformation>,
        multiple_instances: bool,
    ) {
        for item in items {
            self.put(item, multiple_instances);
        }
    }

    /// The first item of the given kind.
    pub fn get_by_kind(&self, kind: &ContextInformation) -> Option<&ContextInformation> {
        self.items.iter().find(|i| i.is_kind_of(kind))
    }

    pub fn contains_kind_of(&self, kind: &ContextInformation) -> bool {
        self.get_by_kind(kind).is_some()
    }

    pub fn contains_all_kinds_of(&self, kinds: &ContextInformationList) -> bool {
        kinds.iter().all(|k| self.contains_kind_of(k))
    }

    /// The items of this list whose kind appears in `kinds`, in this list's order.
    pub fn subset_of_kinds(&self, kinds: &ContextInformationList) -> ContextInformationList {
        Self {
            items: self
                .items
                .iter()
                .filter(|i| kinds.contains_kind_of(i))
                .cloned()
                .collect(),
        }
    }

    /// Remove every item of the given kind; returns how many were removed.
    pub fn remove_of_kind(&mut self, kind: &ContextInformation) -> usize {
        let before = self.items.len();
        self.items.retain(|i| !i.is_kind_of(kind));
        before - self.items.len()
    }

    pub fn remove_all_of_kinds(&mut self, kinds: &ContextInformationList) {
        self.items.retain(|i| !kinds.contains_kind_of(i));
    }

    /// A copy holding only kinds, values stripped.
    pub fn kind_clone(&self) -> ContextInformationList {
        Self {
            items: self.items.iter().map(ContextInformation::kind).collect(),
        }
    }
}

impl FromIterator<ContextInformation> for ContextInformationList {
    fn from_iter<I: IntoIterator<Item = ContextInformation>>(iter: I) -> Self {
        let mut list = Self::new();
        list.put_all(iter, false);
        list
    }
}

impl From<Vec<ContextInformation>> for ContextInformationList {
    fn from(items: Vec<ContextInformation>) -> Self {
        items.into_iter().collect()
    }
}

impl IntoIterator for ContextInformationList {
    type Item = ContextInformation;
    type IntoIter = std::vec::IntoIter<ContextInformation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ContextInformationList {
    type Item = &'a ContextInformation;
    type IntoIter = std::slice::Iter<'a, ContextInformation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(name: &str) -> ContextInformation {
        ContextInformation::new(name, "INTEGER", Vec::new())
    }

    fn names(list: &ContextInformationList) -> Vec<&str> {
        list.iter().map(ContextInformation::name).collect()
    }

    #[test]
    fn test_put_upserts_in_place() {
        let mut list = ContextInformationList::new();
        list.put(item("a").with_value(1), false);
        list.put(item("b").with_value(2), false);
        list.put(item("a").with_value(3), false);

        assert_eq!(list.len(), 2);
        assert_eq!(names(&list), vec!["a", "b"]);
        assert_eq!(list.get_by_kind(&item("a")).unwrap().value(), &json!(3));
    }

    #[test]
    fn test_put_multiple_instances_appends() {
        let mut list = ContextInformationList::new();
        list.put(item("a").with_value(1), false);
        list.put(item("a").with_value(2), true);
        assert_eq!(list.len(), 2);
        assert_eq!(list.remove_of_kind(&item("a")), 2);
        assert!(list.is_empty());
    }

    #[test]
    fn test_from_iterator_is_kind_unique() {
        let list: ContextInformationList =
            vec![item("a"), item("b"), item("a").with_value(9)].into();
        assert_eq!(names(&list), vec!["a", "b"]);
    }

    #[test]
    fn test_subset_and_difference() {
        let list: ContextInformationList = vec![item("a"), item("b"), item("c")].into();
        let kinds: ContextInformationList = vec![item("c"), item("a"), item("z")].into();

        let subset = list.subset_of_kinds(&kinds);
        assert_eq!(names(&subset), vec!["a", "c"]);

        let mut rest = list.clone();
        rest.remove_all_of_kinds(&kinds);
        assert_eq!(names(&rest), vec!["b"]);

        assert!(list.contains_all_kinds_of(&subset));
        assert!(!list.contains_all_kinds_of(&kinds));
    }

    #[test]
    fn test_kind_clone_strips_values() {
        let list: ContextInformationList =
            vec![item("a").with_value(1), item("b").with_value(2)].into();
        let kinds = list.kind_clone();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.iter().all(|k| !k.has_value()));
    }

    #[test]
    fn test_put_replaces_synonym_kind() {
        let preferred = item("latitude");
        let mut list = ContextInformationList::new();
        list.put(preferred.clone().with_value(1), false);
        list.put(item("CI_LATITUDE").with_synonym(&preferred).with_value(2), false);
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().unwrap().value(), &json!(2));
    }
}
