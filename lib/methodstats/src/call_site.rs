//! Call sites and the arguments captured from them.

use std::{borrow::Cow, fmt};

use crate::{config::MetricConfig, resolver::derive_method_name};

/// Static metadata identifying an instrumented method.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MethodSignature {
    declaring_type: Cow<'static, str>,
    method_name: Cow<'static, str>,
}

impl MethodSignature {
    /// Creates a new `MethodSignature`.
    pub fn new<T, M>(declaring_type: T, method_name: M) -> Self
    where
        T: Into<Cow<'static, str>>,
        M: Into<Cow<'static, str>>,
    {
        Self {
            declaring_type: declaring_type.into(),
            method_name: method_name.into(),
        }
    }

    /// Returns the name of the type, or module, declaring the method.
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Returns the method name.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Returns the identity of the method, `<declaring type>.<method name>`.
    ///
    /// This is the key call sites are bound under in a [`BindingRegistry`][crate::BindingRegistry].
    pub fn identity(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.method_name)
    }
}

/// Which parameters of a method are captured as tags.
///
/// Each entry maps a parameter index to the tag its runtime value is captured under. Indexes count the method's regular
/// parameters from zero, skipping any `self` receiver. Entries are kept in parameter order, which is the order captured
/// values are applied in.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParameterTags {
    entries: Vec<(usize, String)>,
}

impl ParameterTags {
    /// Creates an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the parameter at `index` to be captured as the tag `tag_name`.
    ///
    /// An empty tag name leaves the parameter unmarked. Marking a parameter again replaces its tag name.
    pub fn with_parameter<S: Into<String>>(mut self, index: usize, tag_name: S) -> Self {
        let tag_name = tag_name.into();
        if tag_name.is_empty() {
            return self;
        }

        match self.entries.binary_search_by_key(&index, |(i, _)| *i) {
            Ok(pos) => self.entries[pos].1 = tag_name,
            Err(pos) => self.entries.insert(pos, (index, tag_name)),
        }
        self
    }

    /// Returns the tag name of the parameter at `index`, if it is marked.
    pub fn tag_name(&self, index: usize) -> Option<&str> {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| self.entries[pos].1.as_str())
    }

    /// Returns `true` if no parameters are marked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over the marked parameters, in parameter order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries.iter().map(|(i, name)| (*i, name.as_str()))
    }
}

/// The runtime value of a single marked parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CapturedArgument {
    index: usize,
    tag_name: String,
    value: String,
}

impl CapturedArgument {
    /// Returns the tag the value is captured under.
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    /// Returns the string form of the argument.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// The arguments captured from a single invocation, in parameter order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CapturedArguments {
    arguments: Vec<CapturedArgument>,
}

impl CapturedArguments {
    /// Creates an empty set of captured arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of captured arguments.
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    /// Returns `true` if no arguments were captured.
    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// Returns an iterator over the captured arguments, in parameter order.
    pub fn iter(&self) -> impl Iterator<Item = &CapturedArgument> {
        self.arguments.iter()
    }

    fn push(&mut self, argument: CapturedArgument) {
        match self.arguments.binary_search_by_key(&argument.index, |a| a.index) {
            Ok(pos) => self.arguments[pos] = argument,
            Err(pos) => self.arguments.insert(pos, argument),
        }
    }
}

/// Captures the marked arguments of an invocation.
///
/// Arguments are converted to strings as they are captured, before the call proceeds, so the call itself is free to
/// consume them.
#[must_use]
pub struct ArgumentCapture<'a> {
    parameters: &'a ParameterTags,
    captured: CapturedArguments,
}

impl ArgumentCapture<'_> {
    /// Captures the argument for the parameter at `index`.
    ///
    /// If the parameter is not marked for capture, the value is ignored.
    pub fn capture<V>(mut self, index: usize, value: &V) -> Self
    where
        V: fmt::Display + ?Sized,
    {
        if let Some(tag_name) = self.parameters.tag_name(index) {
            self.captured.push(CapturedArgument {
                index,
                tag_name: tag_name.to_string(),
                value: value.to_string(),
            });
        }
        self
    }

    /// Finishes capturing.
    pub fn finish(self) -> CapturedArguments {
        self.captured
    }
}

/// An instrumented call site.
///
/// Combines the method's signature, its parameter descriptor, and its metric configuration. The `method.name` tag value
/// is derived once, when the call site is created.
#[derive(Clone, Debug)]
pub struct CallSite {
    signature: MethodSignature,
    parameters: ParameterTags,
    config: MetricConfig,
    method_tag: String,
}

impl CallSite {
    /// Creates a new `CallSite`.
    pub fn new(signature: MethodSignature, parameters: ParameterTags, config: MetricConfig) -> Self {
        let method_tag = derive_method_name(&config, &signature);
        Self {
            signature,
            parameters,
            config,
            method_tag,
        }
    }

    /// Returns the method signature.
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// Returns the parameter descriptor.
    pub fn parameters(&self) -> &ParameterTags {
        &self.parameters
    }

    /// Returns the metric configuration.
    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Returns the value of the `method.name` tag.
    pub fn method_tag(&self) -> &str {
        &self.method_tag
    }

    /// Starts capturing the arguments of an invocation.
    pub fn arguments(&self) -> ArgumentCapture<'_> {
        ArgumentCapture {
            parameters: &self.parameters,
            captured: CapturedArguments::new(),
        }
    }
}
