//! Tag names, tag values, and the ordered mapping rendered into SQL comments.

use std::collections::BTreeMap;

/// Canonical tag names emitted by this crate and its adapters.
///
/// These follow the sqlcommenter convention (lower-snake-case) so that log
/// processors built for other sqlcommenter implementations parse the output
/// unchanged.
pub mod names {
    /// W3C trace context parent, e.g. `00-{trace_id}-{span_id}-{flags}`.
    pub const TRACEPARENT: &str = "traceparent";
    /// W3C trace context vendor state.
    pub const TRACESTATE: &str = "tracestate";
    /// Database backend issuing the query (`postgresql`, `mysql`, `sqlite`).
    pub const DB_DRIVER: &str = "db_driver";
    /// Matched HTTP route pattern. High cardinality; often disabled.
    pub const ROUTE: &str = "route";
    /// Web framework handling the request.
    pub const FRAMEWORK: &str = "framework";
    /// Application name, typically set once in [`crate::CommenterConfig`].
    pub const APPLICATION: &str = "application";
    /// Controller (or handler module) name.
    pub const CONTROLLER: &str = "controller";
    /// Action (or handler function) name.
    pub const ACTION: &str = "action";
}

/// A single tag value.
///
/// `Null` and `Bool(false)` mark a tag as disabled; disabled tags are
/// dropped during serialization rather than rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Str(String),
    Bool(bool),
    Null,
}

impl TagValue {
    /// Whether this value suppresses the tag entirely.
    pub fn is_disabled(&self) -> bool {
        matches!(self, TagValue::Null | TagValue::Bool(false))
    }

    /// The text rendered into the comment, or `None` for disabled values.
    pub(crate) fn render(&self) -> Option<&str> {
        match self {
            TagValue::Str(s) => Some(s),
            TagValue::Bool(true) => Some("true"),
            TagValue::Bool(false) | TagValue::Null => None,
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Str(value.to_owned())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Str(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl<T: Into<TagValue>> From<Option<T>> for TagValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(TagValue::Null, Into::into)
    }
}

/// An ordered tag mapping with unique keys.
///
/// Iteration order is ascending byte order of the tag name, which is what
/// gives [`crate::serialize`] its deterministic output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap(BTreeMap<String, TagValue>);

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tag.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<TagValue>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Insert a tag only if no tag of that name exists yet.
    pub fn set_if_absent(&mut self, name: impl Into<String>, value: impl Into<TagValue>) -> &mut Self {
        self.0.entry(name.into()).or_insert_with(|| value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<TagValue> {
        self.0.remove(name)
    }

    /// Keep only the tags for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &TagValue) -> bool) {
        self.0.retain(|name, value| keep(name, value));
    }

    /// Iterate tags in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<TagValue>> FromIterator<(K, V)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = TagMap::new();
        for (name, value) in iter {
            tags.set(name, value);
        }
        tags
    }
}

/// A producer of tags for the current query.
///
/// The connection wrapper consumes this to turn ambient request metadata into
/// comment tags; [`crate::QueryContext`] is the stock implementation, and ORM
/// or framework integrations can provide their own.
pub trait TagSource {
    fn tags(&self) -> TagMap;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_values() {
        assert!(TagValue::Null.is_disabled());
        assert!(TagValue::Bool(false).is_disabled());
        assert!(!TagValue::Bool(true).is_disabled());
        assert!(!TagValue::from("x").is_disabled());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(TagValue::from(None::<&str>), TagValue::Null);
        assert_eq!(TagValue::from(Some("v")), TagValue::Str("v".to_owned()));
    }

    #[test]
    fn test_iteration_is_name_ordered() {
        let tags: TagMap = [("b", "2"), ("a", "1"), ("c", "3")].into_iter().collect();
        let order: Vec<&str> = tags.iter().map(|(name, _)| name).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn test_set_if_absent_keeps_existing() {
        let mut tags = TagMap::new();
        tags.set("framework", "axum");
        tags.set_if_absent("framework", "actix");
        tags.set_if_absent("application", "shop");
        assert_eq!(tags.get("framework"), Some(&TagValue::from("axum")));
        assert_eq!(tags.get("application"), Some(&TagValue::from("shop")));
    }
}
