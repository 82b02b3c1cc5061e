/*
 * functions.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template function registries and the template-engine boundary.
//!
//! The underlying expression language is minijinja, consumed as a black box:
//! compile a source string together with a set of named functions, then
//! execute the result against a data value. This module owns that boundary;
//! nothing outside it touches minijinja environments directly.
//!
//! Registries merge per render call: the engine's static registry is cloned
//! and the per-render provider output (if any) is layered on top, so two
//! concurrent renders can observe different function sets without sharing
//! mutable state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use minijinja::value::{Rest, Value};
use minijinja::{AutoEscape, Environment, UndefinedBehavior};

use crate::error::{Error, Result};

/// A named template function: variadic over values, fallible.
pub type TemplateFunction =
    Arc<dyn Fn(&[Value]) -> std::result::Result<Value, minijinja::Error> + Send + Sync>;

/// A set of named functions exposed to templates and attribute expressions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    entries: HashMap<String, TemplateFunction>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, replacing any previous one of the same name.
    pub fn insert<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, minijinja::Error> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(func));
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, minijinja::Error> + Send + Sync + 'static,
    {
        self.insert(name, func);
        self
    }

    /// Layer another registry on top of this one. Names collide in favor of
    /// `other`.
    pub fn merge(&mut self, other: &FunctionRegistry) {
        for (name, func) in &other.entries {
            self.entries.insert(name.clone(), Arc::clone(func));
        }
    }

    /// Whether a function of this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a template environment with this registry installed.
    ///
    /// The environment resolves undefined lookups to zero values and never
    /// auto-escapes: the engine splices raw markup, and escaping decisions
    /// belong to component authors. Pipeline stages that want to evaluate
    /// the buffer as a template use this too.
    pub fn build_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        self.install(&mut env);
        env
    }

    fn install(&self, env: &mut Environment<'static>) {
        for (name, func) in &self.entries {
            let func = Arc::clone(func);
            env.add_function(name.clone(), move |args: Rest<Value>| func(&args.0));
        }
    }
}

/// Evaluate a one-shot template source against `data`.
///
/// Used for attribute expressions and the final full-document pass.
pub(crate) fn evaluate_str(
    source: &str,
    funcs: &FunctionRegistry,
    data: &Value,
) -> std::result::Result<String, minijinja::Error> {
    funcs.build_environment().render_str(source, data)
}

/// A component template compiled against a fixed function set.
///
/// Each compiled template owns its environment, so cached templates from
/// different cache keys never share function state.
#[derive(Debug)]
pub(crate) struct CompiledTemplate {
    name: String,
    env: Environment<'static>,
}

impl CompiledTemplate {
    /// Compile a component body. Syntax failures are enriched with the
    /// resolved origin path and the 1-based line reported by the engine.
    pub(crate) fn compile(
        component: &str,
        source: &str,
        origin: &str,
        funcs: &FunctionRegistry,
    ) -> Result<Self> {
        let mut env = funcs.build_environment();
        env.add_function("forward_attrs", crate::attrs::forward_attrs);

        if let Err(err) = env.add_template_owned(component.to_owned(), source.to_owned()) {
            let location = match err.line() {
                Some(line) => format!("{origin}:{line}"),
                None => origin.to_owned(),
            };
            return Err(Error::TemplateParse {
                component: component.to_owned(),
                location,
                detail: err.to_string(),
            });
        }

        Ok(Self {
            name: component.to_owned(),
            env,
        })
    }

    /// Execute the template against an invocation payload.
    pub(crate) fn execute(
        &self,
        payload: &Value,
    ) -> std::result::Result<String, minijinja::Error> {
        self.env.get_template(&self.name)?.render(payload)
    }
}
