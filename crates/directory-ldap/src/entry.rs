//! Directory entries with attribute change tracking.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Weak;

use directory_core::{Error, Result};

use crate::client::ClientInner;

/// Attribute values accepted when staging a new entry.
///
/// Directory attributes are multi-valued by design; this type lets callers
/// hand over a bare string where a one-element list is meant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// A single value, normalized to a one-element list.
    One(String),
    /// An explicit list of values.
    Many(Vec<String>),
}

impl AttrValue {
    /// Unwraps into the canonical list form.
    #[must_use]
    pub fn into_values(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

impl From<&[&str]> for AttrValue {
    fn from(values: &[&str]) -> Self {
        Self::Many(values.iter().map(|value| (*value).to_string()).collect())
    }
}

/// Attribute names are case-insensitive; the lower-cased form is canonical.
fn canonical(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// One directory entry: its distinguished name, its attribute map, and the
/// names of attributes mutated since the entry was loaded or staged.
///
/// Entries are produced by [`DirectoryClient`](crate::DirectoryClient)
/// searches (already persisted) or by `create` (staged, not yet on the
/// server). The attribute map is eagerly materialized at construction with
/// every name canonicalized to lower-case.
#[derive(Debug, Clone)]
pub struct Entry {
    dn: String,
    attributes: HashMap<String, Vec<String>>,
    changed: BTreeSet<String>,
    is_new: bool,
    origin: Weak<ClientInner>,
}

impl Entry {
    pub(crate) fn from_search(
        dn: String,
        raw: HashMap<String, Vec<String>>,
        origin: Weak<ClientInner>,
    ) -> Self {
        let mut attributes: HashMap<String, Vec<String>> = HashMap::with_capacity(raw.len());
        for (name, values) in raw {
            attributes.entry(canonical(&name)).or_default().extend(values);
        }

        Self {
            dn,
            attributes,
            changed: BTreeSet::new(),
            is_new: false,
            origin,
        }
    }

    pub(crate) fn staged(dn: String, origin: Weak<ClientInner>) -> Self {
        Self {
            dn,
            attributes: HashMap::new(),
            changed: BTreeSet::new(),
            is_new: true,
            origin,
        }
    }

    /// Returns the distinguished name of this entry.
    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Returns true while the entry has not been persisted to the server.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    /// Read-only view of the canonical attribute map.
    #[must_use]
    pub const fn attributes(&self) -> &HashMap<String, Vec<String>> {
        &self.attributes
    }

    /// Returns the values of an attribute; an absent name yields an empty
    /// slice, never an error. Lookups are case-insensitive and reading never
    /// touches the change log.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> &[String] {
        self.attributes
            .get(&canonical(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replaces all values of an attribute and marks it changed.
    pub fn set_attribute(&mut self, name: &str, values: Vec<String>) {
        let name = canonical(name);
        self.attributes.insert(name.clone(), values);
        self.changed.insert(name);
    }

    /// Appends one value without deduplication and marks the attribute
    /// changed. Duplicate values are legal and preserved.
    pub fn push_attribute(&mut self, name: &str, value: impl Into<String>) {
        let name = canonical(name);
        self.attributes
            .entry(name.clone())
            .or_default()
            .push(value.into());
        self.changed.insert(name);
    }

    /// Removes the first value equal to `value`, scanning in order.
    ///
    /// Returns whether a match was found; the attribute is marked changed
    /// only when a removal occurred.
    pub fn remove_value(&mut self, name: &str, value: &str) -> bool {
        let name = canonical(name);
        let removed = match self.attributes.get_mut(&name) {
            Some(values) => match values.iter().position(|candidate| candidate == value) {
                Some(index) => {
                    values.remove(index);
                    true
                }
                None => false,
            },
            None => false,
        };

        if removed {
            self.changed.insert(name);
        }
        removed
    }

    /// Clears every value of an attribute and marks it changed.
    ///
    /// On the next save this clears the attribute on the server.
    pub fn remove_attribute(&mut self, name: &str) {
        self.set_attribute(name, Vec::new());
    }

    /// Returns true if any attribute was mutated since load or the last save.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Snapshot of the *current* values of every changed attribute.
    ///
    /// Multiple writes to the same attribute collapse to the final value set.
    #[must_use]
    pub fn changed_attributes(&self) -> BTreeMap<String, Vec<String>> {
        self.changed
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    self.attributes.get(name).cloned().unwrap_or_default(),
                )
            })
            .collect()
    }

    /// Persists this entry through the client that produced it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when the owning client has been
    /// dropped, otherwise whatever the save itself returns.
    pub async fn save(&mut self) -> Result<()> {
        let owner = self.origin.upgrade().ok_or_else(|| {
            Error::InvalidRequest("entry is not attached to a live connection".to_string())
        })?;
        owner.save_entry(self).await
    }

    pub(crate) fn mark_saved(&mut self) {
        self.is_new = false;
        self.changed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged_entry() -> Entry {
        Entry::staged(
            "uid=jdoe,ou=People,dc=example,dc=com".to_string(),
            Weak::new(),
        )
    }

    fn loaded_entry() -> Entry {
        let mut raw = HashMap::new();
        raw.insert("Mail".to_string(), vec!["jdoe@example.com".to_string()]);
        raw.insert("cn".to_string(), vec!["John Doe".to_string()]);
        Entry::from_search(
            "uid=jdoe,ou=People,dc=example,dc=com".to_string(),
            raw,
            Weak::new(),
        )
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let mut entry = staged_entry();
        entry.set_attribute("Mail", vec!["jdoe@example.com".to_string()]);
        assert_eq!(entry.get_attribute("mail"), ["jdoe@example.com"]);
        assert_eq!(entry.get_attribute("MAIL"), ["jdoe@example.com"]);
    }

    #[test]
    fn absent_attribute_yields_empty_slice() {
        let entry = staged_entry();
        assert!(entry.get_attribute("telephoneNumber").is_empty());
    }

    #[test]
    fn from_search_canonicalizes_names() {
        let entry = loaded_entry();
        assert!(!entry.is_new());
        assert_eq!(entry.get_attribute("mail"), ["jdoe@example.com"]);
        assert!(entry.attributes().contains_key("mail"));
        assert!(!entry.attributes().contains_key("Mail"));
    }

    #[test]
    fn push_preserves_duplicates() {
        let mut entry = staged_entry();
        entry.push_attribute("x", "a");
        entry.push_attribute("x", "a");
        assert_eq!(entry.get_attribute("x"), ["a", "a"]);
    }

    #[test]
    fn remove_value_takes_first_occurrence_only() {
        let mut entry = staged_entry();
        entry.set_attribute(
            "x",
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
        );

        assert!(entry.remove_value("x", "a"));
        assert_eq!(entry.get_attribute("x"), ["b", "a"]);

        assert!(entry.remove_value("x", "a"));
        assert_eq!(entry.get_attribute("x"), ["b"]);

        assert!(!entry.remove_value("x", "a"));
        assert_eq!(entry.get_attribute("x"), ["b"]);
    }

    #[test]
    fn remove_value_without_match_does_not_mark_changed() {
        let mut entry = loaded_entry();
        assert!(!entry.remove_value("mail", "other@example.com"));
        assert!(!entry.remove_value("description", "anything"));
        assert!(!entry.has_changes());
    }

    #[test]
    fn reading_never_marks_changed() {
        let entry = loaded_entry();
        let _ = entry.get_attribute("mail");
        let _ = entry.get_attribute("missing");
        assert!(!entry.has_changes());
    }

    #[test]
    fn changed_snapshot_reflects_current_values() {
        let mut entry = loaded_entry();
        entry.set_attribute("x", vec!["1".to_string()]);
        entry.set_attribute("x", vec!["2".to_string()]);

        let changed = entry.changed_attributes();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed["x"], ["2"]);
    }

    #[test]
    fn remove_attribute_reports_empty_values_for_save() {
        let mut entry = loaded_entry();
        entry.remove_attribute("mail");

        assert!(entry.get_attribute("mail").is_empty());
        let changed = entry.changed_attributes();
        assert!(changed["mail"].is_empty());
    }

    #[test]
    fn mark_saved_supersedes_change_log() {
        let mut entry = staged_entry();
        entry.set_attribute("cn", vec!["Jane".to_string()]);
        assert!(entry.is_new());
        assert!(entry.has_changes());

        entry.mark_saved();
        assert!(!entry.is_new());
        assert!(!entry.has_changes());
    }

    #[tokio::test]
    async fn detached_entry_cannot_save() {
        let mut entry = staged_entry();
        let err = entry.save().await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn attr_value_normalizes_single_strings() {
        assert_eq!(AttrValue::from("top").into_values(), ["top"]);
        assert_eq!(
            AttrValue::from(vec!["a".to_string(), "b".to_string()]).into_values(),
            ["a", "b"]
        );
        assert_eq!(AttrValue::from(&["x", "y"][..]).into_values(), ["x", "y"]);
    }
}
