//! Configuration for comment generation.

use std::collections::BTreeMap;

use crate::comment;
use crate::tags::{names, TagMap};

/// Tags dropped first when a comment exceeds the configured size, lowest
/// priority first. Trace identifiers go last: they are the whole point of
/// the comment. Extension tags absent from this list are dropped before
/// anything on it.
const DEFAULT_TRUNCATION_ORDER: [&str; 8] = [
    names::DB_DRIVER,
    names::ROUTE,
    names::FRAMEWORK,
    names::APPLICATION,
    names::CONTROLLER,
    names::ACTION,
    names::TRACESTATE,
    names::TRACEPARENT,
];

/// Configuration options for query commenting.
///
/// # Example
///
/// ```rust
/// use sea_orm_commenter::{names, CommenterConfig};
///
/// let config = CommenterConfig::default()
///     .with_application("checkout")
///     .with_tag_enabled(names::ROUTE, false)
///     .with_max_comment_bytes(512);
/// ```
#[derive(Debug, Clone)]
pub struct CommenterConfig {
    /// Per-tag enablement; tags not listed are enabled.
    enabled: BTreeMap<String, bool>,

    /// Static `application` tag, used when the context carries none.
    application: Option<String>,

    /// Static `framework` tag, used when the context carries none.
    framework: Option<String>,

    /// Upper bound on the serialized comment, in bytes. `None` means
    /// unbounded.
    max_comment_bytes: Option<usize>,

    /// Truncation priority, lowest first.
    truncation_order: Vec<String>,
}

impl Default for CommenterConfig {
    fn default() -> Self {
        Self {
            enabled: BTreeMap::new(),
            application: None,
            framework: None,
            max_comment_bytes: None,
            truncation_order: DEFAULT_TRUNCATION_ORDER
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
        }
    }
}

impl CommenterConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration that emits only `traceparent` and `tracestate`.
    ///
    /// The other canonical tags carry values like route patterns and
    /// controller names that multiply the number of distinct statements a
    /// log processor sees; this preset opts out of all of them.
    pub fn trace_only() -> Self {
        Self::default()
            .with_tag_enabled(names::DB_DRIVER, false)
            .with_tag_enabled(names::ROUTE, false)
            .with_tag_enabled(names::FRAMEWORK, false)
            .with_tag_enabled(names::APPLICATION, false)
            .with_tag_enabled(names::CONTROLLER, false)
            .with_tag_enabled(names::ACTION, false)
    }

    /// Enable or disable a tag by name.
    ///
    /// Unknown names are accepted; this is the operator opt-out surface for
    /// high-cardinality tags such as `route` or `db_driver`.
    pub fn with_tag_enabled(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.enabled.insert(name.into(), enabled);
        self
    }

    /// Set a static `application` tag for every comment whose context does
    /// not already carry one.
    pub fn with_application(mut self, name: impl Into<String>) -> Self {
        self.application = Some(name.into());
        self
    }

    /// Set a static `framework` tag for every comment whose context does not
    /// already carry one.
    pub fn with_framework(mut self, name: impl Into<String>) -> Self {
        self.framework = Some(name.into());
        self
    }

    /// Bound the serialized comment to `limit` bytes.
    ///
    /// When a comment would exceed the limit, tags are silently dropped in
    /// truncation-priority order until it fits.
    pub fn with_max_comment_bytes(mut self, limit: usize) -> Self {
        self.max_comment_bytes = Some(limit);
        self
    }

    /// Replace the truncation priority, lowest-priority (first dropped)
    /// first. Tags not listed are dropped before any listed tag.
    pub fn with_truncation_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.truncation_order = order.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a tag is enabled under this configuration.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(true)
    }

    /// Apply this configuration to an assembled tag mapping: fill in static
    /// tags, drop disabled ones, and fit the result to the size bound.
    pub fn apply(&self, mut tags: TagMap) -> TagMap {
        if let Some(application) = &self.application {
            tags.set_if_absent(names::APPLICATION, application.as_str());
        }
        if let Some(framework) = &self.framework {
            tags.set_if_absent(names::FRAMEWORK, framework.as_str());
        }
        tags.retain(|name, _| self.is_enabled(name));
        self.fit(tags)
    }

    fn fit(&self, mut tags: TagMap) -> TagMap {
        let Some(limit) = self.max_comment_bytes else {
            return tags;
        };
        loop {
            // Codec errors surface from annotate later; for sizing purposes
            // an unserializable mapping has nothing left to trim.
            let len = comment::serialize(&tags).map_or(0, |c| c.len());
            if len <= limit {
                return tags;
            }
            match self.next_victim(&tags) {
                Some(name) => {
                    tags.remove(&name);
                }
                None => return tags,
            }
        }
    }

    fn next_victim(&self, tags: &TagMap) -> Option<String> {
        if let Some((name, _)) = tags
            .iter()
            .find(|(name, _)| !self.truncation_order.iter().any(|o| o == name))
        {
            return Some(name.to_owned());
        }
        self.truncation_order
            .iter()
            .find(|name| tags.get(name).is_some())
            .cloned()
    }
}
