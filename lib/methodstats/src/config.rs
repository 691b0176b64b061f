//! Per-call-site metric configuration.

use std::{fmt, str::FromStr};

use methodstats_config::ConfigurationError;
use serde::Deserialize;
use snafu::Snafu;

use crate::tags::{AdditionalTags, TagError};

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ConfigError {
    /// The additional tags of a call site could not be parsed.
    #[snafu(display("Invalid additional tags '{}': {}", raw, source))]
    InvalidTags {
        /// The raw tag list.
        raw: String,

        /// Error source.
        source: TagError,
    },

    /// The configured method action is not known.
    #[snafu(display("Unknown method action '{}'.", action))]
    UnknownAction {
        /// The configured action.
        action: String,
    },

    /// A call site was bound more than once.
    #[snafu(display("Call site '{}' is already bound.", identity))]
    DuplicateBinding {
        /// Identity of the call site.
        identity: String,
    },

    /// The bindings could not be read from configuration.
    #[snafu(display("Failed to load call site bindings from configuration."))]
    Configuration {
        /// Error source.
        source: ConfigurationError,
    },
}

/// The kind of operation an instrumented method performs.
///
/// When configured, it is attached to every metric of the call site as the `method.action` tag, using its upper-case
/// name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MethodAction {
    /// Creates something.
    Create,

    /// Reads something.
    Read,

    /// Updates something.
    Update,

    /// Deletes something.
    Delete,

    /// Lists things.
    List,

    /// Searches for things.
    Search,

    /// Executes something.
    Execute,
}

impl MethodAction {
    /// Returns the tag value for this action.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::List => "LIST",
            Self::Search => "SEARCH",
            Self::Execute => "EXECUTE",
        }
    }

    /// Parses an optional action setting.
    ///
    /// An empty value, or `NONE`, means no action. Matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// If the value does not name a known action, an error is returned.
    pub fn parse_setting(value: &str) -> Result<Option<Self>, ConfigError> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("none") {
            return Ok(None);
        }

        value.parse().map(Some)
    }
}

impl FromStr for MethodAction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s.to_ascii_uppercase().as_str() {
            "CREATE" => Self::Create,
            "READ" => Self::Read,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "LIST" => Self::List,
            "SEARCH" => Self::Search,
            "EXECUTE" => Self::Execute,
            _ => return Err(ConfigError::UnknownAction { action: s.to_string() }),
        };
        Ok(action)
    }
}

impl fmt::Display for MethodAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric configuration of a single call site.
///
/// Created once when a call site is bound, and read on every invocation. By default, both the invocation count and the
/// latency are captured, with no explicit name, no action, and no additional tags.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(try_from = "RawMetricConfig")]
pub struct MetricConfig {
    explicit_name: Option<String>,
    additional_tags: AdditionalTags,
    action: Option<MethodAction>,
    capture_count: bool,
    capture_latency: bool,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            explicit_name: None,
            additional_tags: AdditionalTags::default(),
            action: None,
            capture_count: true,
            capture_latency: true,
        }
    }
}

impl MetricConfig {
    /// Creates a new `MetricConfig` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the explicit method name, used as-is (after normalization) for the `method.name` tag.
    ///
    /// An empty name is the same as no name: the method name is then derived from the call site.
    pub fn with_explicit_name<S: Into<String>>(mut self, name: S) -> Self {
        let name = name.into();
        self.explicit_name = if name.is_empty() { None } else { Some(name) };
        self
    }

    /// Sets the additional static tags.
    pub fn with_additional_tags(mut self, tags: AdditionalTags) -> Self {
        self.additional_tags = tags;
        self
    }

    /// Sets the additional static tags from their flat, comma-delimited form.
    ///
    /// # Errors
    ///
    /// If the list has an odd number of tokens, an error is returned.
    pub fn with_flat_tags(self, raw: &str) -> Result<Self, ConfigError> {
        let tags = AdditionalTags::parse(raw).map_err(|source| ConfigError::InvalidTags {
            raw: raw.to_string(),
            source,
        })?;
        Ok(self.with_additional_tags(tags))
    }

    /// Sets the method action.
    pub fn with_action(mut self, action: MethodAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Sets whether invocations are counted.
    pub fn with_capture_count(mut self, capture_count: bool) -> Self {
        self.capture_count = capture_count;
        self
    }

    /// Sets whether the latency of successful invocations is recorded.
    pub fn with_capture_latency(mut self, capture_latency: bool) -> Self {
        self.capture_latency = capture_latency;
        self
    }

    /// Returns the explicit method name, if any.
    pub fn explicit_name(&self) -> Option<&str> {
        self.explicit_name.as_deref()
    }

    /// Returns the additional static tags.
    pub fn additional_tags(&self) -> &AdditionalTags {
        &self.additional_tags
    }

    /// Returns the method action, if any.
    pub fn action(&self) -> Option<MethodAction> {
        self.action
    }

    /// Returns `true` if invocations are counted.
    pub fn capture_count(&self) -> bool {
        self.capture_count
    }

    /// Returns `true` if the latency of successful invocations is recorded.
    pub fn capture_latency(&self) -> bool {
        self.capture_latency
    }
}

const fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawMetricConfig {
    #[serde(default, alias = "method_name")]
    name: String,

    #[serde(default)]
    additional_tags: String,

    #[serde(default, alias = "method_action")]
    action: String,

    #[serde(default = "default_true")]
    capture_count: bool,

    #[serde(default = "default_true", alias = "capture_response_time")]
    capture_latency: bool,
}

impl TryFrom<RawMetricConfig> for MetricConfig {
    type Error = ConfigError;

    fn try_from(raw: RawMetricConfig) -> Result<Self, Self::Error> {
        let mut config = MetricConfig::new()
            .with_explicit_name(raw.name)
            .with_flat_tags(&raw.additional_tags)?
            .with_capture_count(raw.capture_count)
            .with_capture_latency(raw.capture_latency);
        config.action = MethodAction::parse_setting(&raw.action)?;
        Ok(config)
    }
}
