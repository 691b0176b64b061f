//! Procedural macros for `methodstats`.
//!
//! This crate provides the `#[method_stats]` attribute, which wraps the body of a function in a call to the global
//! interceptor. It should be used through the re-export in the `methodstats` crate.

use proc_macro::TokenStream;
use proc_macro2::{TokenStream as TokenStream2, TokenTree};
use quote::{format_ident, quote, ToTokens as _};
use syn::{
    parse_macro_input, punctuated::Punctuated, Block, Expr, ExprLit, FnArg, Ident, ItemFn, Lit, LitStr, Meta, Pat,
    ReturnType, Signature, Token, Type,
};

/// Captures metrics for every call of the annotated function.
///
/// Every call is counted, tagged by outcome, and the latency of successful calls is recorded. Functions returning a
/// `Result` fail when they return `Err`; any other function only fails by panicking. `async fn` is supported, in which
/// case timing starts when the returned future is first polled.
///
/// # Arguments
///
/// - `name = "..."`: explicit value of the `method.name` tag
/// - `tags = "k,v,..."`: additional static tags, as a flat comma-delimited list of keys and values
/// - `action = "..."`: method action (`CREATE`, `READ`, `UPDATE`, `DELETE`, `LIST`, `SEARCH` or `EXECUTE`)
/// - `count = bool`: whether calls are counted (default: `true`)
/// - `latency = bool`: whether the latency of successful calls is recorded (default: `true`)
/// - `declaring_type = "..."`: declaring type used in the derived method name
/// - `fallible = bool`: overrides whether the return value is classified as a `Result`
///
/// Without `declaring_type`, methods taking `self` use the name of `Self`, and anything else uses the name of the
/// enclosing module.
///
/// Parameters marked with `#[tag("tag.name")]` have their value captured, through `Display`, as a tag.
///
/// # Example
///
/// ```rust,ignore
/// use methodstats::method_stats;
///
/// struct OrderService;
///
/// impl OrderService {
///     #[method_stats(tags = "region,us-east", action = "CREATE")]
///     fn place(&self, #[tag("order.id")] id: u64) -> Result<(), String> {
///         Ok(())
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn method_stats(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input_fn = parse_macro_input!(input as ItemFn);

    match generate_instrumented_fn(args, input_fn) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Settings given through the attribute arguments.
#[derive(Debug)]
struct StatsConfig {
    name: Option<String>,
    tags: Vec<(String, String)>,
    action: Option<Ident>,
    count: bool,
    latency: bool,
    declaring_type: Option<String>,
    fallible: Option<bool>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            name: None,
            tags: Vec::new(),
            action: None,
            count: true,
            latency: true,
            declaring_type: None,
            fallible: None,
        }
    }
}

/// A parameter whose value is captured as a tag.
#[derive(Debug)]
struct TaggedParameter {
    index: usize,
    tag_name: String,
    ident: Ident,
}

fn generate_instrumented_fn(args: Punctuated<Meta, Token![,]>, mut input_fn: ItemFn) -> syn::Result<TokenStream2> {
    let config = parse_stats_args(&args)?;

    if let Some(constness) = &input_fn.sig.constness {
        return Err(syn::Error::new_spanned(
            constness,
            "`#[method_stats]` can't be used on a `const fn`",
        ));
    }

    let tagged = extract_tagged_parameters(&mut input_fn.sig)?;

    let declaring_type = generate_declaring_type(&config, &input_fn.sig);
    let method_name = input_fn.sig.ident.to_string();
    let metric_config = generate_metric_config(&config);
    let indexes = tagged.iter().map(|p| p.index);
    let tag_names = tagged.iter().map(|p| p.tag_name.as_str());
    let captures = tagged.iter().map(|p| {
        let index = p.index;
        let ident = &p.ident;
        quote!(.capture(#index, &#ident))
    });
    let dispatch = generate_dispatch(&config, &input_fn.sig, &input_fn.block);

    let body = quote! {{
        static __METHODSTATS_CALL_SITE: ::methodstats::__private::OnceLock<::methodstats::CallSite> =
            ::methodstats::__private::OnceLock::new();

        let __methodstats_site = __METHODSTATS_CALL_SITE.get_or_init(|| {
            ::methodstats::__private::call_site(
                #declaring_type,
                #method_name,
                &[#((#indexes, #tag_names)),*],
                #metric_config,
            )
        });
        let __methodstats_captured = __methodstats_site.arguments() #(#captures)* .finish();

        #dispatch
    }};

    input_fn.block = Box::new(syn::parse2::<Block>(body)?);

    Ok(input_fn.into_token_stream())
}

/// Parse attribute arguments.
fn parse_stats_args(args: &Punctuated<Meta, Token![,]>) -> syn::Result<StatsConfig> {
    let mut config = StatsConfig::default();

    for arg in args {
        let Meta::NameValue(nv) = arg else {
            return Err(unsupported_argument(arg));
        };
        let Some(key) = nv.path.get_ident().map(ToString::to_string) else {
            return Err(unsupported_argument(arg));
        };

        match key.as_str() {
            "name" => config.name = Some(lit_str(&nv.value)?.value()),
            "tags" => {
                let lit = lit_str(&nv.value)?;
                config.tags = parse_flat_tags(&lit.value()).map_err(|msg| syn::Error::new_spanned(&lit, msg))?;
            }
            "action" => {
                let lit = lit_str(&nv.value)?;
                config.action = parse_action(&lit.value())
                    .map_err(|msg| syn::Error::new_spanned(&lit, msg))?
                    .map(|variant| format_ident!("{}", variant));
            }
            "count" => config.count = lit_bool(&nv.value)?,
            "latency" => config.latency = lit_bool(&nv.value)?,
            "declaring_type" => {
                let lit = lit_str(&nv.value)?;
                if lit.value().is_empty() {
                    return Err(syn::Error::new_spanned(lit, "`declaring_type` must not be empty"));
                }
                config.declaring_type = Some(lit.value());
            }
            "fallible" => config.fallible = Some(lit_bool(&nv.value)?),
            _ => return Err(unsupported_argument(arg)),
        }
    }

    Ok(config)
}

fn unsupported_argument(arg: &Meta) -> syn::Error {
    syn::Error::new_spanned(
        arg,
        "Unsupported argument. Use `name`, `tags`, `action`, `count`, `latency`, `declaring_type` or `fallible`",
    )
}

fn lit_str(expr: &Expr) -> syn::Result<LitStr> {
    match expr {
        Expr::Lit(ExprLit { lit: Lit::Str(lit), .. }) => Ok(lit.clone()),
        _ => Err(syn::Error::new_spanned(expr, "expected a string literal")),
    }
}

fn lit_bool(expr: &Expr) -> syn::Result<bool> {
    match expr {
        Expr::Lit(ExprLit { lit: Lit::Bool(lit), .. }) => Ok(lit.value),
        _ => Err(syn::Error::new_spanned(expr, "expected `true` or `false`")),
    }
}

/// Splits a flat `key,value,...` tag list into pairs.
///
/// Mirrors `AdditionalTags::parse`, so that malformed lists are rejected at compile time rather than when the call site
/// is first used.
fn parse_flat_tags(raw: &str) -> Result<Vec<(String, String)>, String> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut tokens = raw.split(',').map(|token| token.trim().to_string()).collect::<Vec<_>>();
    while tokens.last().is_some_and(|token| token.is_empty()) {
        tokens.pop();
    }

    if tokens.len() % 2 != 0 {
        return Err(format!(
            "tag list must contain an even number of keys and values, got {} token(s)",
            tokens.len()
        ));
    }

    Ok(tokens
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

/// Maps an action setting to the name of its `MethodAction` variant.
fn parse_action(raw: &str) -> Result<Option<&'static str>, String> {
    let raw = raw.trim();
    let variant = match raw.to_ascii_uppercase().as_str() {
        "" | "NONE" => return Ok(None),
        "CREATE" => "Create",
        "READ" => "Read",
        "UPDATE" => "Update",
        "DELETE" => "Delete",
        "LIST" => "List",
        "SEARCH" => "Search",
        "EXECUTE" => "Execute",
        _ => return Err(format!("unknown method action `{}`", raw)),
    };
    Ok(Some(variant))
}

/// Removes the `#[tag(..)]` attributes from the signature, returning the parameters they marked.
fn extract_tagged_parameters(sig: &mut Signature) -> syn::Result<Vec<TaggedParameter>> {
    let mut tagged = Vec::new();
    let mut index = 0;

    for input in sig.inputs.iter_mut() {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };

        let mut tag_name: Option<LitStr> = None;
        let mut kept = Vec::with_capacity(pat_type.attrs.len());
        for attr in pat_type.attrs.drain(..) {
            if !attr.path().is_ident("tag") {
                kept.push(attr);
                continue;
            }

            if tag_name.is_some() {
                return Err(syn::Error::new_spanned(attr, "parameter is already tagged"));
            }
            let lit = attr.parse_args::<LitStr>()?;
            if lit.value().is_empty() {
                return Err(syn::Error::new_spanned(lit, "tag name must not be empty"));
            }
            tag_name = Some(lit);
        }
        pat_type.attrs = kept;

        if let Some(tag_name) = tag_name {
            match pat_type.pat.as_ref() {
                Pat::Ident(pat_ident) => tagged.push(TaggedParameter {
                    index,
                    tag_name: tag_name.value(),
                    ident: pat_ident.ident.clone(),
                }),
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "tagged parameters must be bound to a plain identifier",
                    ));
                }
            }
        }

        index += 1;
    }

    Ok(tagged)
}

fn generate_declaring_type(config: &StatsConfig, sig: &Signature) -> TokenStream2 {
    match (&config.declaring_type, sig.receiver().is_some()) {
        (Some(declaring_type), _) => quote!(#declaring_type),
        (None, true) => quote!(::methodstats::__private::short_type_name::<Self>()),
        (None, false) => quote!(::methodstats::__private::short_module_name(::core::module_path!())),
    }
}

fn generate_metric_config(config: &StatsConfig) -> TokenStream2 {
    let mut tokens = quote!(::methodstats::MetricConfig::new());

    if let Some(name) = &config.name {
        tokens = quote!(#tokens.with_explicit_name(#name));
    }

    if !config.tags.is_empty() {
        let keys = config.tags.iter().map(|(k, _)| k);
        let values = config.tags.iter().map(|(_, v)| v);
        tokens = quote!(#tokens.with_additional_tags(::methodstats::AdditionalTags::from_pairs([#((#keys, #values)),*])));
    }

    if let Some(action) = &config.action {
        tokens = quote!(#tokens.with_action(::methodstats::MethodAction::#action));
    }

    if !config.count {
        tokens = quote!(#tokens.with_capture_count(false));
    }

    if !config.latency {
        tokens = quote!(#tokens.with_capture_latency(false));
    }

    tokens
}

fn generate_dispatch(config: &StatsConfig, sig: &Signature, block: &Block) -> TokenStream2 {
    let fallible = config.fallible.unwrap_or_else(|| is_result_type(&sig.output));
    let return_type = match &sig.output {
        ReturnType::Default => quote!(()),
        ReturnType::Type(_, ty) => ty.to_token_stream(),
    };

    // An opaque return type can't be named inside the body, so it's left to inference.
    let typed = !has_impl_token(return_type.clone());

    if sig.asyncness.is_some() {
        let method = if fallible {
            quote!(instrument_future)
        } else {
            quote!(instrument_future_infallible)
        };
        let future = if typed {
            quote!(::methodstats::__private::typed_future::<#return_type, _>(async move #block))
        } else {
            quote!(async move #block)
        };

        quote! {
            ::methodstats::Interceptor::global()
                .#method(__methodstats_site, __methodstats_captured, #future)
                .await
        }
    } else {
        let method = if fallible {
            quote!(call)
        } else {
            quote!(call_infallible)
        };
        let call = if typed {
            quote!(::methodstats::__private::typed_call::<#return_type, _>(move || #block))
        } else {
            quote!(move || #block)
        };

        quote! {
            ::methodstats::Interceptor::global().#method(__methodstats_site, __methodstats_captured, #call)
        }
    }
}

/// Returns `true` if the return type is spelled as a `Result`, including aliases such as `io::Result`.
fn is_result_type(output: &ReturnType) -> bool {
    let ReturnType::Type(_, ty) = output else {
        return false;
    };

    match ty.as_ref() {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Result"),
        _ => false,
    }
}

fn has_impl_token(tokens: TokenStream2) -> bool {
    tokens.into_iter().any(|tt| match tt {
        TokenTree::Ident(ident) => ident == "impl",
        TokenTree::Group(group) => has_impl_token(group.stream()),
        _ => false,
    })
}
