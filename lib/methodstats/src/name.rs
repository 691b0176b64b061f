//! Metric name encoding.
//!
//! A metric identity is a base name plus a set of tags. It is serialized into a single string, which is used as the
//! lookup key in the metrics sink:
//!
//! ```text
//! <base>!<key>=<value>!<key>=<value>...
//! ```
//!
//! Tags are appended in key order. Spaces, commas and `=` in keys and values are escaped with a backslash so that they
//! can't be confused with the delimiters of downstream line formats.

use std::borrow::Cow;

use crate::tags::{TagError, TagSet};

/// Base name of the invocation counter.
pub const COUNT_METRIC_NAME: &str = "methodstats_count";

/// Base name of the latency gauge.
pub const GAUGE_METRIC_NAME: &str = "methodstats_gauge";

/// Base name of the latency timer.
pub const TIMER_METRIC_NAME: &str = "methodstats_timer";

/// The kind of metric being emitted for a call.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricKind {
    /// Invocation count, tagged with the call outcome.
    Count,

    /// Most recent call latency.
    Gauge,

    /// Call latency distribution.
    Timer,
}

impl MetricKind {
    /// Returns the fixed base name for this kind of metric.
    pub const fn base_name(&self) -> &'static str {
        match self {
            Self::Count => COUNT_METRIC_NAME,
            Self::Gauge => GAUGE_METRIC_NAME,
            Self::Timer => TIMER_METRIC_NAME,
        }
    }
}

/// A fully resolved metric identity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetricIdentity {
    kind: MetricKind,
    tags: TagSet,
}

impl MetricIdentity {
    /// Creates a new `MetricIdentity`.
    pub fn new(kind: MetricKind, tags: TagSet) -> Self {
        Self { kind, tags }
    }

    /// Returns the metric kind.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Returns the tags.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Encodes the identity into its string form.
    pub fn encode(&self) -> String {
        NameBuilder::new(self.kind.base_name()).with_tags(&self.tags).build()
    }
}

/// Builder for encoded metric names.
#[derive(Clone, Debug)]
pub struct NameBuilder {
    name: String,
}

impl NameBuilder {
    /// Creates a new builder starting from the given base name.
    pub fn new<S: Into<String>>(base_name: S) -> Self {
        Self { name: base_name.into() }
    }

    /// Appends a single tag.
    ///
    /// If either the key or the value is empty, this is a no-op.
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        if key.is_empty() || value.is_empty() {
            return self;
        }

        self.name.push('!');
        self.name.push_str(&sanitize(key));
        self.name.push('=');
        self.name.push_str(&sanitize(value));
        self
    }

    /// Appends every tag in the set, in key order.
    pub fn with_tags(self, tags: &TagSet) -> Self {
        tags.iter().fold(self, |builder, (key, value)| builder.with_tag(key, value))
    }

    /// Appends tags given as a flat `key, value, key, value, ...` sequence.
    ///
    /// # Errors
    ///
    /// If the sequence has an odd number of tokens, an error is returned.
    pub fn with_flat_tags<I, S>(self, tokens: I) -> Result<Self, TagError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = TagSet::from_flat(tokens)?;
        Ok(self.with_tags(&tags))
    }

    /// Returns the encoded name.
    pub fn build(&self) -> String {
        self.name.clone()
    }
}

const fn is_reserved(c: char) -> bool {
    matches!(c, ' ' | ',' | '=')
}

/// Escapes the characters that would otherwise corrupt an encoded name.
///
/// Each space, comma, and `=` is prefixed with a backslash. A reserved character that is already escaped is left
/// alone, so sanitizing an already-sanitized string returns it unchanged.
pub fn sanitize(input: &str) -> Cow<'_, str> {
    if !input.contains(is_reserved) {
        return Cow::Borrowed(input);
    }

    let mut sanitized = String::with_capacity(input.len() + 4);
    let mut escaped = false;
    for c in input.chars() {
        if is_reserved(c) && !escaped {
            sanitized.push('\\');
        }
        escaped = c == '\\' && !escaped;
        sanitized.push(c);
    }
    Cow::Owned(sanitized)
}
