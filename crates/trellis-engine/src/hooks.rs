/*
 * hooks.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Extension points invoked around component rendering.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use minijinja::value::Value;
use serde::Serialize;

use crate::attrs::ResolvedAttr;
use crate::context::RenderContext;
use crate::error::{BoxedHookError, Error};

/// Which edge of a component render an instrumentation event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentStage {
    Begin,
    End,
}

/// Emitted to instrumentation hooks around each component render.
///
/// `error` and `duration` are only populated on [`InstrumentStage::End`].
#[derive(Debug)]
pub struct InstrumentEvent<'a> {
    pub component: &'a str,
    pub stage: InstrumentStage,
    pub error: Option<&'a Error>,
    pub duration: Duration,
}

/// Observes component renders; must not fail.
pub type InstrumentHook = Arc<dyn Fn(&RenderContext, &InstrumentEvent<'_>) + Send + Sync>;

/// Mutates a component's payload before its template executes. Registered
/// per component name, or under `"*"` to run for every component.
pub type ComponentAugmenter =
    Arc<dyn Fn(&RenderContext, &mut ComponentPayload) -> std::result::Result<(), BoxedHookError> + Send + Sync>;

/// Everything a component template sees, assembled per invocation.
///
/// Augmenters receive this mutably; after augmentation it is frozen into a
/// template value whose top-level keys are the capitalized names templates
/// address (`Props`, `Attrs`, `Children`, and so on).
#[derive(Debug)]
pub struct ComponentPayload {
    pub component: String,
    pub props: BTreeMap<String, Value>,
    pub attrs: Vec<ResolvedAttr>,
    pub children: String,
    pub children_raw: String,
    pub has_children: bool,
    pub self_closing: bool,
}

#[derive(Serialize)]
struct PayloadShape<'a> {
    #[serde(rename = "Component")]
    component: &'a str,
    #[serde(rename = "Props")]
    props: &'a BTreeMap<String, Value>,
    #[serde(rename = "Attrs")]
    attrs: &'a [ResolvedAttr],
    #[serde(rename = "Children")]
    children: &'a str,
    #[serde(rename = "ChildrenRaw")]
    children_raw: &'a str,
    #[serde(rename = "HasChildren")]
    has_children: bool,
    #[serde(rename = "SelfClosing")]
    self_closing: bool,
    #[serde(rename = "Ctx")]
    ctx: Value,
    #[serde(rename = "Data")]
    data: &'a Value,
    #[serde(rename = "Root")]
    root: &'a Value,
}

impl ComponentPayload {
    /// Freeze the payload into the value handed to the template. `data` is
    /// the caller's render data, exposed both as `Data` and as `Root` so
    /// nested components can always reach the top-level document data.
    pub(crate) fn to_value(&self, ctx: &RenderContext, data: &Value) -> Value {
        Value::from_serialize(&PayloadShape {
            component: &self.component,
            props: &self.props,
            attrs: &self.attrs,
            children: &self.children,
            children_raw: &self.children_raw,
            has_children: self.has_children,
            self_closing: self.self_closing,
            ctx: ctx.to_value(),
            data,
            root: data,
        })
    }
}
