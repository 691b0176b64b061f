//! High-level application primitives.
//!
//! This crate provides what an application needs to set up before running instrumented code: initializing logging, and
//! loading the call site bindings from configuration.
#![deny(missing_docs)]

pub mod bootstrap;
pub mod logging;

/// Common imports.
pub mod prelude {
    pub use super::bootstrap::{initialize_bindings, load_configuration};
    pub use super::logging::{initialize_logging, LoggingConfiguration, LoggingGuard};
}
