//! Open key/value metadata carried by commands and events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String-to-string metadata attached to a command submission.
///
/// Handlers read it through the command context for conditional logic; the entity core
/// copies it onto every event the command emits. Ordered so that serialized metadata is
/// stable across replays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// True when `key` is present and equal to `value`.
    pub fn is(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_equality_check() {
        let md = Metadata::new().with("myKey", "myValue");
        assert_eq!(md.get("myKey"), Some("myValue"));
        assert!(md.is("myKey", "myValue"));
        assert!(!md.is("myKey", "other"));
        assert!(!md.is("missing", "myValue"));
    }

    #[test]
    fn serializes_as_flat_object() {
        let md: Metadata = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(serde_json::to_string(&md).unwrap(), r#"{"a":"1","b":"2"}"#);
    }
}
