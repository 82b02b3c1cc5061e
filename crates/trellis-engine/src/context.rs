/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Request-scoped ambient values.
//!
//! A [`RenderContext`] travels with a single top-level render call and is
//! handed to every caller-supplied hook (function providers, augmenters,
//! cache-key functions, pipeline stages, instrumentation). The engine never
//! interprets its contents; it only injects the context into template data
//! under the `Ctx` key so templates and registered functions can read it.

use std::collections::BTreeMap;

use minijinja::value::Value;

/// An opaque carrier of per-request values.
///
/// Values are stored under string keys and surface in templates as a map,
/// so `{{ Ctx.user }}` reads the value inserted under `"user"`.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    values: BTreeMap<String, Value>,
}

impl RenderContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a string value by key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// Whether the context carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The context as a template value (a map of the carried entries).
    pub fn to_value(&self) -> Value {
        Value::from_serialize(&self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut ctx = RenderContext::new();
        ctx.insert("user", "ada");
        ctx.insert("count", 3);

        assert_eq!(ctx.get_str("user"), Some("ada"));
        assert_eq!(ctx.get("count"), Some(&Value::from(3)));
        assert!(ctx.get("missing").is_none());
    }

    #[test]
    fn test_to_value_is_a_map() {
        let ctx = RenderContext::new().with_value("locale", "fr");
        let value = ctx.to_value();
        assert_eq!(
            value.get_attr("locale").unwrap().as_str(),
            Some("fr")
        );
    }

    #[test]
    fn test_empty_context() {
        let ctx = RenderContext::new();
        assert!(ctx.is_empty());
        assert!(!ctx.to_value().is_true());
    }
}
