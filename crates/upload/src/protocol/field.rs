//! Accumulated non-file form data for one request.

use std::collections::HashMap;

use serde::Serialize;

/// Value of one form field.
///
/// A field name submitted once stays [`Single`](FieldValue::Single); a repeat
/// of the same name promotes the entry to [`Repeated`](FieldValue::Repeated),
/// keeping values in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Repeated(Vec<String>),
}

impl FieldValue {
    /// Returns the value if the field was submitted exactly once.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            FieldValue::Single(value) => Some(value),
            FieldValue::Repeated(_) => None,
        }
    }

    /// Iterates all values of this field in arrival order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let slice = match self {
            FieldValue::Single(value) => std::slice::from_ref(value),
            FieldValue::Repeated(values) => values.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

/// Mapping from field name to accumulated value(s).
///
/// Built incrementally by the dispatch loop as `field` events arrive. The
/// snapshot handed to a file handler is a frozen clone reflecting only the
/// fields decoded strictly before that file's boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldMap {
    entries: HashMap<String, FieldValue>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one decoded field value, promoting repeats to a sequence.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        let merged = match self.entries.remove(&name) {
            None => FieldValue::Single(value),
            Some(FieldValue::Single(first)) => FieldValue::Repeated(vec![first, value]),
            Some(FieldValue::Repeated(mut values)) => {
                values.push(value);
                FieldValue::Repeated(values)
            }
        };
        self.entries.insert(name, merged);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_names_promote_to_sequence() {
        let mut fields = FieldMap::new();
        fields.insert("a", "1");
        fields.insert("a", "2");
        fields.insert("b", "3");

        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("a"), Some(&FieldValue::Repeated(vec!["1".to_string(), "2".to_string()])));
        assert_eq!(fields.get("b"), Some(&FieldValue::Single("3".to_string())));
        assert_eq!(fields.get("missing"), None);
    }

    #[test]
    fn repeats_keep_arrival_order() {
        let mut fields = FieldMap::new();
        fields.insert("tag", "x");
        fields.insert("tag", "y");
        fields.insert("tag", "z");

        let values: Vec<_> = fields.get("tag").unwrap().values().collect();
        assert_eq!(values, vec!["x", "y", "z"]);
    }

    #[test]
    fn serializes_like_a_form_body() {
        let mut fields = FieldMap::new();
        fields.insert("a", "1");
        fields.insert("a", "2");
        fields.insert("b", "3");

        let value = serde_json::to_value(&fields).unwrap();
        assert_eq!(value, serde_json::json!({"a": ["1", "2"], "b": "3"}));
    }

    #[test]
    fn single_value_accessor() {
        let mut fields = FieldMap::new();
        fields.insert("a", "1");
        assert_eq!(fields.get("a").unwrap().as_single(), Some("1"));

        fields.insert("a", "2");
        assert_eq!(fields.get("a").unwrap().as_single(), None);
    }
}
