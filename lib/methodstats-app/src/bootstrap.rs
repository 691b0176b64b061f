//! Bootstrap utilities.

use std::path::Path;

use anyhow::Context as _;
use methodstats::{BindingRegistry, GenericError};
use methodstats_config::{ConfigurationLoader, GenericConfiguration};
use tracing::{info, warn};

/// Prefix of the environment variables read as configuration.
pub const ENVIRONMENT_PREFIX: &str = "METHODSTATS";

/// Loads the application configuration.
///
/// Configuration is read from the given YAML file, if any, and then from environment variables prefixed with
/// `METHODSTATS_`, which take precedence. A missing file is ignored.
///
/// # Errors
///
/// If the environment can't be read as configuration, an error is returned.
pub fn load_configuration(config_file: Option<&Path>) -> Result<GenericConfiguration, GenericError> {
    let mut loader = ConfigurationLoader::default();
    if let Some(config_file) = config_file {
        loader = loader.try_from_yaml(config_file);
    }

    let loader = loader.from_environment(ENVIRONMENT_PREFIX)?;
    Ok(loader.into_generic())
}

/// Initializes the call site bindings from the given configuration.
///
/// # Errors
///
/// If the configured bindings don't have the expected shape, an error is returned. Bindings with invalid settings are
/// skipped.
pub fn initialize_bindings(config: &GenericConfiguration) -> Result<BindingRegistry, GenericError> {
    let registry =
        BindingRegistry::from_configuration(config).context("Failed to initialize call site bindings.")?;

    if registry.is_empty() {
        warn!("No call site bindings configured. Only call sites instrumented in code will capture metrics.");
    } else {
        info!(bindings = registry.len(), "Initialized call site bindings.");
    }

    Ok(registry)
}
