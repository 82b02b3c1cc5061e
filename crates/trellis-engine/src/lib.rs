/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Server-side component expansion for HTML documents.
//!
//! Documents are plain markup with one addition: tags whose name starts
//! with an uppercase letter (`<Card title="Hi">...</Card>`) are components,
//! backed by template files resolved from the engine's folder or embedded
//! bundle. Rendering replaces each component usage with its template's
//! output and repeats until no component tags remain.
//!
//! ```no_run
//! use trellis_engine::{Engine, RenderContext};
//!
//! let engine = Engine::builder("templates").build();
//! let ctx = RenderContext::new().with_value("user", "ada");
//! let mut out = Vec::new();
//! let data = serde_json::json!({ "Message": "welcome" });
//! engine.render_file_with_context(&ctx, "index.html", data, Some(&mut out))?;
//! # Ok::<(), trellis_engine::Error>(())
//! ```
//!
//! Inside a component template, `Props` holds the evaluated attributes,
//! `Children` the expanded inner markup, `Ctx` the request context, and
//! `Data`/`Root` the caller's render data. `forward_attrs(Attrs, ...)`
//! re-emits attributes onto an inner element.

pub mod attrs;
pub mod context;
pub mod engine;
pub mod error;
pub mod functions;
pub mod hooks;
pub mod pipeline;

mod cache;
mod expand;
mod loader;
mod scanner;

pub use attrs::{AttrRules, ResolvedAttr, forward_attrs};
pub use context::RenderContext;
pub use engine::{CacheKeyFn, DataAugmenter, Engine, EngineBuilder, FunctionProvider, LocaleExtractor};
pub use error::{BoxedHookError, Error, Result};
pub use expand::MAX_EXPANSION_PASSES;
pub use functions::{FunctionRegistry, TemplateFunction};
pub use hooks::{
    ComponentAugmenter, ComponentPayload, InstrumentEvent, InstrumentHook, InstrumentStage,
};
pub use pipeline::{StageFn, stage};

pub use minijinja::value::Value;
