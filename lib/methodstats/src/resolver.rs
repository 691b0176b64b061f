//! Tag resolution.
//!
//! Every metric emitted for a call carries tags from several sources. They are applied in a fixed order, and a later
//! source overwrites any tag already set by an earlier one:
//!
//! 1. `method.name`, from the explicit name or the method signature
//! 2. `method.outcome`, on the count path only
//! 3. `method.action`, if an action is configured
//! 4. the additional static tags of the call site
//! 5. the captured arguments, in parameter order

use std::fmt;

use crate::{
    call_site::{CallSite, CapturedArguments, MethodSignature},
    config::MetricConfig,
    tags::TagSet,
};

/// Tag holding the normalized method name.
pub const TAG_METHOD_NAME: &str = "method.name";

/// Tag holding the call outcome.
pub const TAG_METHOD_OUTCOME: &str = "method.outcome";

/// Tag holding the configured method action.
pub const TAG_METHOD_ACTION: &str = "method.action";

/// How a call terminated.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Outcome {
    /// The call returned normally.
    Success,

    /// The call failed, either by returning an error or by panicking.
    Error,
}

impl Outcome {
    /// Returns the tag value for this outcome.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves the tags for a single invocation of a call site.
///
/// `outcome` is only given when resolving tags for the invocation counter; latency metrics are never tagged with the
/// outcome.
pub fn resolve_tags(site: &CallSite, captured: &CapturedArguments, outcome: Option<Outcome>) -> TagSet {
    let config = site.config();

    let mut tags = TagSet::new();
    tags.insert(TAG_METHOD_NAME, site.method_tag());

    if let Some(outcome) = outcome {
        tags.insert(TAG_METHOD_OUTCOME, outcome.as_str());
    }

    if let Some(action) = config.action() {
        tags.insert(TAG_METHOD_ACTION, action.as_str());
    }

    tags.extend(config.additional_tags().iter());
    tags.extend(captured.iter().map(|arg| (arg.tag_name(), arg.value())));

    tags
}

/// Derives the `method.name` tag value of a call site.
///
/// The explicit name is used when one is configured. Otherwise, the name is `<declaring type>.<method name>`. Either way,
/// the result is normalized with [`normalize_method_name`].
pub(crate) fn derive_method_name(config: &MetricConfig, signature: &MethodSignature) -> String {
    match config.explicit_name() {
        Some(name) => normalize_method_name(name),
        None => normalize_method_name(&signature.identity()),
    }
}

/// Normalizes a method name so that it is safe in any metric name dialect.
///
/// Path separators (`.` and `::`) are replaced with `_`, and the result is lower-cased.
pub fn normalize_method_name(name: &str) -> String {
    name.replace("::", "_").replace('.', "_").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        call_site::ParameterTags,
        config::MethodAction,
        name::{MetricIdentity, MetricKind},
        tags::AdditionalTags,
    };

    fn order_site(config: MetricConfig) -> CallSite {
        CallSite::new(
            MethodSignature::new("OrderService", "place"),
            ParameterTags::new().with_parameter(0, "order.id"),
            config,
        )
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_method_name("OrderService.place"), "orderservice_place");
        assert_eq!(normalize_method_name("shop::orders::OrderService.place"), "shop_orders_orderservice_place");
        assert_eq!(normalize_method_name("Checkout.Total"), "checkout_total");
    }

    #[test]
    fn explicit_name_is_normalized_too() {
        let site = order_site(MetricConfig::new().with_explicit_name("Orders.Place"));
        assert_eq!(site.method_tag(), "orders_place");
    }

    #[test]
    fn worked_example() {
        let site = order_site(MetricConfig::new().with_flat_tags("region,us-east").unwrap());
        let captured = site.arguments().capture(0, &42).finish();

        let tags = resolve_tags(&site, &captured, Some(Outcome::Success));
        let expected: TagSet = [
            ("method.name", "orderservice_place"),
            ("method.outcome", "SUCCESS"),
            ("region", "us-east"),
            ("order.id", "42"),
        ]
        .into_iter()
        .collect();
        assert_eq!(tags, expected);

        assert_eq!(
            MetricIdentity::new(MetricKind::Count, tags).encode(),
            "methodstats_count!method.name=orderservice_place!method.outcome=SUCCESS!order.id=42!region=us-east"
        );
    }

    #[test]
    fn no_outcome_on_latency_path() {
        let site = order_site(MetricConfig::new().with_action(MethodAction::Create));
        let tags = resolve_tags(&site, &CapturedArguments::new(), None);

        assert_eq!(tags.get(TAG_METHOD_OUTCOME), None);
        assert_eq!(tags.get(TAG_METHOD_ACTION), Some("CREATE"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn later_sources_win() {
        // Additional tags override the derived tags, and captured arguments override everything.
        let config = MetricConfig::new()
            .with_action(MethodAction::Read)
            .with_additional_tags(AdditionalTags::from_pairs([
                ("method.name", "static_name"),
                ("method.action", "STATIC"),
                ("order.id", "static"),
            ]));
        let site = order_site(config);
        let captured = site.arguments().capture(0, "captured").finish();

        let tags = resolve_tags(&site, &captured, Some(Outcome::Error));
        assert_eq!(tags.get(TAG_METHOD_NAME), Some("static_name"));
        assert_eq!(tags.get(TAG_METHOD_ACTION), Some("STATIC"));
        assert_eq!(tags.get(TAG_METHOD_OUTCOME), Some("ERROR"));
        assert_eq!(tags.get("order.id"), Some("captured"));
    }

    #[test]
    fn captured_arguments_apply_in_parameter_order() {
        let site = CallSite::new(
            MethodSignature::new("Svc", "op"),
            ParameterTags::new().with_parameter(1, "key").with_parameter(0, "key"),
            MetricConfig::default(),
        );
        let captured = site.arguments().capture(1, "second").capture(0, "first").finish();

        let tags = resolve_tags(&site, &captured, None);
        assert_eq!(tags.get("key"), Some("second"));
    }
}
