//! Call site bindings.

use std::collections::BTreeMap;

use methodstats_config::GenericConfiguration;
use snafu::ResultExt as _;
use tracing::{debug, error};

use crate::{
    call_site::{CallSite, MethodSignature, ParameterTags},
    config::{Configuration, ConfigError, MetricConfig, RawMetricConfig},
};

/// Configuration key holding the call site bindings.
pub const BINDINGS_CONFIG_KEY: &str = "method_stats.bindings";

/// Metric configurations of call sites, by identity.
///
/// Call sites are bound once, during setup, and looked up whenever a call is wrapped. Both can happen concurrently from
/// any number of threads.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    bindings: papaya::HashMap<String, MetricConfig>,
}

impl BindingRegistry {
    /// Creates an empty `BindingRegistry`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `BindingRegistry` from the bindings in the given configuration.
    ///
    /// Bindings are read from `method_stats.bindings`, a map of call site identity to metric configuration. If the key is
    /// absent, the registry is empty.
    ///
    /// A binding whose settings are invalid, such as malformed additional tags or an unknown action, is logged and
    /// skipped. The remaining bindings are still bound.
    ///
    /// # Errors
    ///
    /// If the bindings are present but don't have the expected shape (unknown fields, or values of the wrong type), an
    /// error is returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, ConfigError> {
        let registry = Self::new();

        let bindings = config
            .try_get_typed::<BTreeMap<String, RawMetricConfig>>(BINDINGS_CONFIG_KEY)
            .context(Configuration)?
            .unwrap_or_default();

        for (identity, raw_config) in bindings {
            match MetricConfig::try_from(raw_config) {
                Ok(metric_config) => registry.bind(identity, metric_config)?,
                Err(e) => error!(call_site = %identity, error = %e, "Skipping invalid call site binding."),
            }
        }

        debug!(bindings = registry.len(), "Loaded call site bindings from configuration.");

        Ok(registry)
    }

    /// Binds a metric configuration to the call site with the given identity.
    ///
    /// # Errors
    ///
    /// If the call site is already bound, an error is returned and the existing binding is left as-is.
    pub fn bind<S: Into<String>>(&self, identity: S, config: MetricConfig) -> Result<(), ConfigError> {
        let identity = identity.into();
        let bindings = self.bindings.pin();

        if bindings.try_insert(identity.clone(), config).is_err() {
            return Err(ConfigError::DuplicateBinding { identity });
        }

        debug!(call_site = %identity, "Bound call site.");
        Ok(())
    }

    /// Returns the metric configuration bound to the given call site identity, if any.
    pub fn get(&self, identity: &str) -> Option<MetricConfig> {
        self.bindings.pin().get(identity).cloned()
    }

    /// Builds the call site for the given method.
    ///
    /// Returns `None` if the method is not bound.
    pub fn call_site(&self, signature: MethodSignature, parameters: ParameterTags) -> Option<CallSite> {
        let config = self.get(&signature.identity())?;
        Some(CallSite::new(signature, parameters, config))
    }

    /// Returns the number of bound call sites.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if no call sites are bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
