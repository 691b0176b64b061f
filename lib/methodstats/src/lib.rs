//! Per-call metrics for methods and functions.
//!
//! Wrapping a call with an [`Interceptor`] counts its invocations, tagged by outcome, and records the latency of the ones
//! that succeed. The metric names and tags are derived from the call site: its signature, its [`MetricConfig`], and
//! the values of any parameters marked for capture.
//!
//! Call sites can be wrapped explicitly, or instrumented with the [`method_stats`] attribute:
//!
//! ```rust,ignore
//! use methodstats::method_stats;
//!
//! struct OrderService;
//!
//! impl OrderService {
//!     #[method_stats(tags = "region,us-east")]
//!     fn place(&self, #[tag("order.id")] id: u64) -> Result<Receipt, OrderError> {
//!         // ...
//!     }
//! }
//! ```
//!
//! A successful call to `place(42)` then increments
//! `methodstats_count!method.name=orderservice_place!method.outcome=SUCCESS!order.id=42!region=us-east`, and records its
//! latency to the matching `methodstats_gauge` and `methodstats_timer` metrics.
#![deny(missing_docs)]

mod call_site;
pub use self::call_site::{ArgumentCapture, CallSite, CapturedArgument, CapturedArguments, MethodSignature, ParameterTags};

mod config;
pub use self::config::{ConfigError, MetricConfig, MethodAction};

mod interceptor;
pub use self::interceptor::{Classify, Fallible, Infallible, Instrumented, Interceptor};

pub mod name;

mod registry;
pub use self::registry::{BindingRegistry, BINDINGS_CONFIG_KEY};

pub mod resolver;
pub use self::resolver::Outcome;

mod tags;
pub use self::tags::{AdditionalTags, TagError, TagSet};

pub use methodstats_macros::method_stats;
pub use methodstats_metrics::{GenericError, MetricsSink, RecorderSink};

#[doc(hidden)]
pub mod __private {
    use std::future::Future;

    pub use std::sync::OnceLock;

    use crate::{CallSite, MethodSignature, MetricConfig, ParameterTags};

    pub fn call_site(
        declaring_type: &'static str, method_name: &'static str, parameters: &[(usize, &'static str)],
        config: MetricConfig,
    ) -> CallSite {
        let parameters = parameters
            .iter()
            .fold(ParameterTags::new(), |tags, (index, tag_name)| tags.with_parameter(*index, *tag_name));

        CallSite::new(MethodSignature::new(declaring_type, method_name), parameters, config)
    }

    /// Returns the unqualified name of `T`, without generic arguments.
    pub fn short_type_name<T: ?Sized>() -> &'static str {
        let name = std::any::type_name::<T>();
        let name = name.split('<').next().unwrap_or(name);
        name.rsplit("::").next().unwrap_or(name)
    }

    /// Returns the last segment of a module path.
    pub fn short_module_name(module_path: &'static str) -> &'static str {
        module_path.rsplit("::").next().unwrap_or(module_path)
    }

    pub fn typed_call<T, F>(f: F) -> F
    where
        F: FnOnce() -> T,
    {
        f
    }

    pub fn typed_future<T, F>(f: F) -> F
    where
        F: Future<Output = T>,
    {
        f
    }

}
