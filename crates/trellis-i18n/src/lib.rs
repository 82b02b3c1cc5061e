/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Locale negotiation and translation functions for `trellis-engine`.
//!
//! Wire this crate into an engine as a function provider: it reads the
//! request's `Accept-Language` header out of the [`RenderContext`], picks
//! the best supported locale, and exposes `t(key, ...)` and `locale()` to
//! templates. Pair it with
//! [`locale_cache_keys`](trellis_engine::EngineBuilder::locale_cache_keys)
//! so compiled templates are cached per locale.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use minijinja::value::Value;
use tracing::debug;
use trellis_engine::{FunctionRegistry, RenderContext};

/// Context key the header extractor reads the `Accept-Language` value from.
pub const ACCEPT_LANGUAGE_KEY: &str = "accept-language";

/// Translates message keys for one locale.
pub trait Translator: Send + Sync {
    /// Translate `key`, with optional positional arguments. Implementations
    /// decide how arguments interpolate; a missing key conventionally
    /// returns the key itself.
    fn translate(&self, key: &str, args: &[Value]) -> String;
}

/// Loads the translator for a locale, or `None` when the locale has no
/// catalog. Called at most once per locale per provider; results are
/// cached.
pub type TranslatorLoader = Arc<dyn Fn(&str) -> Option<Arc<dyn Translator>> + Send + Sync>;

/// Configuration for [`function_provider`].
pub struct I18nOptions {
    loader: TranslatorLoader,
    default_locale: String,
    supported: Vec<String>,
}

impl I18nOptions {
    pub fn new<F>(default_locale: impl Into<String>, loader: F) -> Self
    where
        F: Fn(&str) -> Option<Arc<dyn Translator>> + Send + Sync + 'static,
    {
        Self {
            loader: Arc::new(loader),
            default_locale: normalize_locale(&default_locale.into()),
            supported: Vec::new(),
        }
    }

    /// Declare a locale as negotiable. The default locale is always
    /// supported.
    pub fn supported_locale(mut self, locale: impl Into<String>) -> Self {
        self.supported.push(normalize_locale(&locale.into()));
        self
    }
}

/// Store a request's `Accept-Language` header on the context.
pub fn with_accept_language(ctx: RenderContext, header: impl Into<String>) -> RenderContext {
    ctx.with_value(ACCEPT_LANGUAGE_KEY, header.into())
}

/// The `Accept-Language` header carried by a context, if any.
pub fn accept_language(ctx: &RenderContext) -> Option<&str> {
    ctx.get_str(ACCEPT_LANGUAGE_KEY)
}

/// The locale a context negotiates to under the given options.
pub fn negotiated_locale(options: &I18nOptions, ctx: &RenderContext) -> String {
    let header = ctx.get_str(ACCEPT_LANGUAGE_KEY).unwrap_or_default();
    pick_locale(header, &options.supported, &options.default_locale)
}

/// Build a function provider exposing `t(key, ...)` and `locale()`.
///
/// `t` falls back to formatting the key itself when the locale has no
/// translator (`{}` placeholders filled from the arguments), so
/// untranslated deployments degrade to visible messages rather than
/// errors.
pub fn function_provider(
    options: I18nOptions,
) -> impl Fn(&RenderContext) -> FunctionRegistry + Send + Sync + 'static {
    let translators: Arc<RwLock<HashMap<String, Option<Arc<dyn Translator>>>>> =
        Arc::default();
    move |ctx: &RenderContext| {
        let locale = negotiated_locale(&options, ctx);
        let translator = cached_translator(&translators, &options.loader, &locale);
        debug!(locale = %locale, has_catalog = translator.is_some(), "i18n functions bound");

        let locale_value = locale.clone();
        let mut funcs = FunctionRegistry::new();
        funcs.insert("locale", move |_args: &[Value]| {
            Ok(Value::from(locale_value.clone()))
        });
        funcs.insert("t", move |args: &[Value]| {
            let key = args.first().and_then(|v| v.as_str()).unwrap_or_default();
            let rest = args.get(1..).unwrap_or(&[]);
            let text = match &translator {
                Some(translator) => translator.translate(key, rest),
                None => format_key(key, rest),
            };
            Ok(Value::from(text))
        });
        funcs
    }
}

/// Fill `{}` placeholders in an untranslated key from the arguments, so
/// messages with interpolation stay legible without a catalog.
fn format_key(key: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(key.len());
    let mut args = args.iter();
    let mut rest = key;
    while let Some(idx) = rest.find("{}") {
        out.push_str(&rest[..idx]);
        match args.next() {
            Some(arg) => out.push_str(&arg.to_string()),
            None => out.push_str("{}"),
        }
        rest = &rest[idx + 2..];
    }
    out.push_str(rest);
    out
}

fn cached_translator(
    cache: &RwLock<HashMap<String, Option<Arc<dyn Translator>>>>,
    loader: &TranslatorLoader,
    locale: &str,
) -> Option<Arc<dyn Translator>> {
    if let Some(entry) = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(locale)
    {
        return entry.clone();
    }
    let loaded = loader(locale);
    cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(locale.to_owned(), loaded.clone());
    loaded
}

/// Pick the best supported locale for an `Accept-Language` header.
///
/// Candidates are tried in descending preference order; an exact supported
/// match wins, then the candidate's base language. Wildcard entries are
/// skipped in favor of concrete candidates further down the list. With no
/// supported set at all, the top concrete preference is taken as-is. The
/// default applies when nothing matches or the header is absent.
pub fn pick_locale(header: &str, supported: &[String], default_locale: &str) -> String {
    let candidates = parse_accept_language(header);
    if supported.is_empty() {
        return candidates
            .into_iter()
            .map(|(tag, _q)| tag)
            .find(|tag| tag != "*")
            .unwrap_or_else(|| default_locale.to_owned());
    }
    for (candidate, _q) in candidates {
        if candidate == "*" {
            continue;
        }
        if is_supported(&candidate, supported, default_locale) {
            return candidate;
        }
        let base = base_locale(&candidate);
        if base != candidate && is_supported(base, supported, default_locale) {
            return base.to_owned();
        }
    }
    default_locale.to_owned()
}

fn is_supported(locale: &str, supported: &[String], default_locale: &str) -> bool {
    locale == default_locale || supported.iter().any(|s| s == locale)
}

/// Parse an `Accept-Language` header into `(locale, quality)` pairs,
/// highest quality first. Entries with an unparsable or non-positive `q`
/// are dropped; ties keep header order.
pub fn parse_accept_language(header: &str) -> Vec<(String, f32)> {
    let mut entries: Vec<(String, f32)> = Vec::new();
    for part in header.split(',') {
        let mut pieces = part.split(';');
        let tag = normalize_locale(pieces.next().unwrap_or_default());
        if tag.is_empty() {
            continue;
        }
        let mut quality = 1.0f32;
        let mut valid = true;
        for param in pieces {
            let param = param.trim();
            if let Some(value) = param.strip_prefix("q=") {
                match value.trim().parse::<f32>() {
                    Ok(q) if q > 0.0 => quality = q,
                    _ => valid = false,
                }
            }
        }
        if valid {
            entries.push((tag, quality));
        }
    }
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries
}

/// Lowercase, trimmed, with `_` separators folded to `-`.
pub fn normalize_locale(locale: &str) -> String {
    locale.trim().replace('_', "-").to_lowercase()
}

/// The language part of a locale tag: `en-us` gives `en`.
pub fn base_locale(locale: &str) -> &str {
    locale.split('-').next().unwrap_or(locale)
}
