/*
 * engine.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The rendering engine: configuration, caching, and render entry points.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use include_dir::Dir;
use minijinja::value::Value;
use serde::Serialize;
use tracing::debug;

use crate::attrs::AttrRules;
use crate::cache::{ComponentSource, SourceCache, TemplateCache};
use crate::context::RenderContext;
use crate::error::{Error, Result};
use crate::expand::{Expander, MAX_EXPANSION_PASSES};
use crate::functions::{CompiledTemplate, FunctionRegistry, evaluate_str};
use crate::hooks::{ComponentAugmenter, InstrumentHook};
use crate::pipeline::{Pipeline, StageFn};

/// Produces per-render template functions from the request context.
///
/// When a provider is configured the compiled-template cache is bypassed:
/// cached templates bake their function set in, and the provider's output
/// can differ per context.
pub type FunctionProvider = Arc<dyn Fn(&RenderContext) -> FunctionRegistry + Send + Sync>;

/// Rewrites the caller's render data before expansion starts.
pub type DataAugmenter = Arc<dyn Fn(&RenderContext, Value) -> Value + Send + Sync>;

/// Derives the compiled-template cache key base for a component from the
/// request context and the component name, replacing the default
/// lower-cased name. A locale prefix still applies on top.
pub type CacheKeyFn = Arc<dyn Fn(&RenderContext, &str) -> Option<String> + Send + Sync>;

/// Extracts a locale tag from the request context.
pub type LocaleExtractor = Arc<dyn Fn(&RenderContext) -> Option<String> + Send + Sync>;

/// Per-render immutable state, shared by every component rendered within
/// one top-level call.
pub(crate) struct RenderState {
    pub(crate) ctx: RenderContext,
    pub(crate) funcs: FunctionRegistry,
    pub(crate) data: Value,
    provider_active: bool,
}

/// Configures and builds an [`Engine`].
pub struct EngineBuilder {
    folder: PathBuf,
    bundle: Option<&'static Dir<'static>>,
    functions: FunctionRegistry,
    provider: Option<FunctionProvider>,
    augmenter: Option<DataAugmenter>,
    cache_key_fn: Option<CacheKeyFn>,
    locale_extractor: Option<LocaleExtractor>,
    locale_default: String,
    final_template_pass: bool,
    streaming_writes: bool,
    max_passes: usize,
    pipelines: Vec<Pipeline>,
    post_processors: Vec<StageFn>,
    instrument_hooks: Vec<InstrumentHook>,
    augmenters: HashMap<String, Vec<ComponentAugmenter>>,
    attr_rules: HashMap<String, AttrRules>,
}

impl EngineBuilder {
    fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            bundle: None,
            functions: FunctionRegistry::new(),
            provider: None,
            augmenter: None,
            cache_key_fn: None,
            locale_extractor: None,
            locale_default: String::new(),
            final_template_pass: false,
            streaming_writes: false,
            max_passes: MAX_EXPANSION_PASSES,
            pipelines: Vec::new(),
            post_processors: Vec::new(),
            instrument_hooks: Vec::new(),
            augmenters: HashMap::new(),
            attr_rules: HashMap::new(),
        }
    }

    /// Serve documents and components from an embedded directory instead of
    /// the filesystem.
    pub fn bundle(mut self, bundle: &'static Dir<'static>) -> Self {
        self.bundle = Some(bundle);
        self
    }

    /// Replace the engine's static function registry.
    pub fn functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Register a single static template function.
    pub fn function<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, minijinja::Error> + Send + Sync + 'static,
    {
        self.functions.insert(name, func);
        self
    }

    /// Supply per-render functions derived from the request context. See
    /// [`FunctionProvider`] for the caching consequences.
    pub fn function_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn(&RenderContext) -> FunctionRegistry + Send + Sync + 'static,
    {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Rewrite the render data before expansion (e.g. inject CSRF tokens).
    pub fn data_augmenter<F>(mut self, augmenter: F) -> Self
    where
        F: Fn(&RenderContext, Value) -> Value + Send + Sync + 'static,
    {
        self.augmenter = Some(Arc::new(augmenter));
        self
    }

    /// Partition the compiled-template cache by a context-derived key.
    pub fn cache_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&RenderContext, &str) -> Option<String> + Send + Sync + 'static,
    {
        self.cache_key_fn = Some(Arc::new(key_fn));
        self
    }

    /// Partition the compiled-template cache by locale. The extractor reads
    /// the locale from the context; `default` applies when it yields
    /// nothing. Combines with [`cache_key_fn`](Self::cache_key_fn): the
    /// locale prefixes whatever base the key fn produces.
    pub fn locale_cache_keys<F>(mut self, default: impl Into<String>, extractor: F) -> Self
    where
        F: Fn(&RenderContext) -> Option<String> + Send + Sync + 'static,
    {
        self.locale_default = default.into();
        self.locale_extractor = Some(Arc::new(extractor));
        self
    }

    /// Like [`locale_cache_keys`](Self::locale_cache_keys), reading the
    /// locale from a context value under `key`.
    pub fn locale_cache_keys_from_value(
        self,
        key: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        let key = key.into();
        self.locale_cache_keys(default, move |ctx: &RenderContext| {
            ctx.get_str(&key).map(str::to_owned)
        })
    }

    /// Evaluate the fully expanded document as one template at the end of
    /// every render.
    pub fn final_template_pass(mut self, enabled: bool) -> Self {
        self.final_template_pass = enabled;
        self
    }

    /// Write output incrementally as components resolve. Only takes effect
    /// when no final pass, pipelines, or post-processors are configured,
    /// since those need the whole buffer.
    pub fn streaming_writes(mut self, enabled: bool) -> Self {
        self.streaming_writes = enabled;
        self
    }

    /// Override the expansion pass budget (defaults to
    /// [`MAX_EXPANSION_PASSES`]).
    pub fn max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes.max(1);
        self
    }

    /// Append a named pipeline run over the rendered buffer.
    pub fn pipeline(mut self, name: impl Into<String>, stages: Vec<StageFn>) -> Self {
        self.pipelines.push(Pipeline {
            name: name.into(),
            stages,
        });
        self
    }

    /// Append a post-processor, run after every pipeline.
    pub fn post_processor(mut self, stage: StageFn) -> Self {
        self.post_processors.push(stage);
        self
    }

    /// Observe component renders.
    pub fn instrument<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RenderContext, &crate::hooks::InstrumentEvent<'_>) + Send + Sync + 'static,
    {
        self.instrument_hooks.push(Arc::new(hook));
        self
    }

    /// Mutate a component's payload before its template executes. An empty
    /// name registers the augmenter for every component.
    pub fn augment_component<F>(mut self, name: impl Into<String>, augmenter: F) -> Self
    where
        F: Fn(&RenderContext, &mut crate::hooks::ComponentPayload) -> std::result::Result<(), crate::error::BoxedHookError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let key = if name.is_empty() {
            "*".to_owned()
        } else {
            name.to_lowercase()
        };
        self.augmenters.entry(key).or_default().push(Arc::new(augmenter));
        self
    }

    /// Constrain the attributes a component accepts.
    pub fn attr_rules(mut self, component: impl Into<String>, rules: AttrRules) -> Self {
        self.attr_rules.insert(component.into().to_lowercase(), rules);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            loader: crate::loader::SourceLoader::new(self.folder, self.bundle),
            functions: self.functions,
            provider: self.provider,
            augmenter: self.augmenter,
            cache_key_fn: self.cache_key_fn,
            locale_extractor: self.locale_extractor,
            locale_default: self.locale_default,
            final_template_pass: self.final_template_pass,
            streaming_writes: self.streaming_writes,
            max_passes: self.max_passes,
            pipelines: self.pipelines,
            post_processors: self.post_processors,
            instrument_hooks: self.instrument_hooks,
            augmenters: self.augmenters,
            attr_rules: self.attr_rules,
            templates: TemplateCache::default(),
            sources: SourceCache::default(),
        }
    }
}

/// Expands component tags in markup documents.
///
/// An engine is immutable once built and safe to share across threads; its
/// caches synchronize internally.
pub struct Engine {
    loader: crate::loader::SourceLoader,
    functions: FunctionRegistry,
    provider: Option<FunctionProvider>,
    augmenter: Option<DataAugmenter>,
    cache_key_fn: Option<CacheKeyFn>,
    locale_extractor: Option<LocaleExtractor>,
    locale_default: String,
    final_template_pass: bool,
    streaming_writes: bool,
    pub(crate) max_passes: usize,
    pipelines: Vec<Pipeline>,
    post_processors: Vec<StageFn>,
    pub(crate) instrument_hooks: Vec<InstrumentHook>,
    pub(crate) augmenters: HashMap<String, Vec<ComponentAugmenter>>,
    pub(crate) attr_rules: HashMap<String, AttrRules>,
    templates: TemplateCache,
    sources: SourceCache,
}

impl Engine {
    /// Start configuring an engine rooted at `folder`.
    pub fn builder(folder: impl Into<PathBuf>) -> EngineBuilder {
        EngineBuilder::new(folder)
    }

    /// Render a document with an empty context.
    pub fn render_file(
        &self,
        path: &str,
        data: impl Serialize,
        writer: Option<&mut dyn Write>,
    ) -> Result<()> {
        self.render_file_with_context(&RenderContext::new(), path, data, writer)
    }

    /// Render a document: expand components, then apply the final pass,
    /// pipelines, and post-processors as configured. With no writer the
    /// document renders for its side effects only (hooks, cache warming).
    pub fn render_file_with_context(
        &self,
        ctx: &RenderContext,
        path: &str,
        data: impl Serialize,
        writer: Option<&mut dyn Write>,
    ) -> Result<()> {
        self.render(ctx, path, Value::from_serialize(&data), writer, false)
    }

    /// Render a document and additionally evaluate the expanded result as
    /// one template, regardless of the engine's final-pass setting.
    pub fn render_file_template(
        &self,
        ctx: &RenderContext,
        path: &str,
        data: impl Serialize,
        writer: Option<&mut dyn Write>,
    ) -> Result<()> {
        self.render(ctx, path, Value::from_serialize(&data), writer, true)
    }

    /// Buffered render into a string.
    pub fn render_to_string(
        &self,
        ctx: &RenderContext,
        path: &str,
        data: impl Serialize,
    ) -> Result<String> {
        let mut out = Vec::new();
        self.render_file_with_context(ctx, path, data, Some(&mut out))?;
        String::from_utf8(out).map_err(|_| Error::InvalidUtf8 {
            path: path.to_owned(),
        })
    }

    fn render(
        &self,
        ctx: &RenderContext,
        path: &str,
        data: Value,
        writer: Option<&mut dyn Write>,
        force_final: bool,
    ) -> Result<()> {
        let text = self.loader.read_document(path)?;
        if text.is_empty() {
            return Err(Error::EmptyFile {
                path: path.to_owned(),
            });
        }

        let state = self.prepare_render_state(ctx, data);
        let final_pass = self.final_template_pass || force_final;
        let can_stream = self.streaming_writes
            && !final_pass
            && self.pipelines.is_empty()
            && self.post_processors.is_empty();
        debug!(
            path,
            streaming = can_stream && writer.is_some(),
            final_pass,
            "rendering document"
        );

        let expander = Expander::new(self, &state);
        match writer {
            Some(writer) if can_stream => expander.stream(&text, writer, 0),
            writer => {
                let expanded = expander.expand(text, 0)?;
                let out = self.apply_post_processing(&state, expanded.into_bytes(), final_pass)?;
                if let Some(writer) = writer {
                    writer.write_all(&out).map_err(Error::output)?;
                }
                Ok(())
            }
        }
    }

    fn prepare_render_state(&self, ctx: &RenderContext, data: Value) -> RenderState {
        let mut funcs = self.functions.clone();
        let provider_active = match &self.provider {
            Some(provider) => {
                funcs.merge(&provider(ctx));
                true
            }
            None => false,
        };
        let data = match &self.augmenter {
            Some(augmenter) => augmenter(ctx, data),
            None => data,
        };
        let data = inject_context(data, ctx);
        RenderState {
            ctx: ctx.clone(),
            funcs,
            data,
            provider_active,
        }
    }

    /// Compiled-template cache key for a component under this context.
    ///
    /// The key fn, when set and non-empty, replaces the lower-cased name as
    /// the base; the locale prefix applies either way.
    fn cache_key(&self, ctx: &RenderContext, component: &str) -> String {
        let mut base = component.to_lowercase();
        if let Some(key_fn) = &self.cache_key_fn {
            if let Some(key) = key_fn(ctx, component).filter(|k| !k.is_empty()) {
                base = key;
            }
        }
        if let Some(extractor) = &self.locale_extractor {
            let locale = extractor(ctx)
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| self.locale_default.clone());
            return format!("{}:{base}", locale.to_lowercase());
        }
        base
    }

    pub(crate) fn load_component_template(
        &self,
        state: &RenderState,
        component: &str,
    ) -> Result<Arc<CompiledTemplate>> {
        if state.provider_active {
            let source = self.component_source(component)?;
            let template =
                CompiledTemplate::compile(component, &source.text, &source.origin, &state.funcs)?;
            return Ok(Arc::new(template));
        }

        let key = self.cache_key(&state.ctx, component);
        if let Some(template) = self.templates.get(&key) {
            return Ok(template);
        }
        let source = self.component_source(component)?;
        let template = Arc::new(CompiledTemplate::compile(
            component,
            &source.text,
            &source.origin,
            &state.funcs,
        )?);
        self.templates.insert(key, Arc::clone(&template));
        Ok(template)
    }

    fn component_source(&self, component: &str) -> Result<Arc<ComponentSource>> {
        let key = component.to_lowercase();
        if let Some(source) = self.sources.get(&key) {
            return Ok(source);
        }
        let (text, origin) = self.loader.read_component(component)?;
        let source = Arc::new(ComponentSource { text, origin });
        self.sources.insert(key, Arc::clone(&source));
        Ok(source)
    }

    fn apply_post_processing(
        &self,
        state: &RenderState,
        buffer: Vec<u8>,
        final_pass: bool,
    ) -> Result<Vec<u8>> {
        let mut buffer = buffer;
        if final_pass {
            let text = String::from_utf8_lossy(&buffer).into_owned();
            let rendered = evaluate_str(&text, &state.funcs, &state.data)
                .map_err(|source| Error::FinalPass { source })?;
            buffer = rendered.into_bytes();
        }
        for pipeline in &self.pipelines {
            buffer = pipeline.run(&state.ctx, buffer, &state.data, &state.funcs)?;
        }
        for (idx, post) in self.post_processors.iter().enumerate() {
            buffer = post(&state.ctx, &buffer, &state.data, &state.funcs).map_err(|source| {
                Error::Stage {
                    stage: format!("post-processor[{idx}]"),
                    source,
                }
            })?;
        }
        Ok(buffer)
    }

    #[cfg(test)]
    pub(crate) fn cached_template_count(&self) -> usize {
        self.templates.len()
    }

    #[cfg(test)]
    pub(crate) fn cached_source_count(&self) -> usize {
        self.sources.len()
    }
}

/// Expose the request context to templates under `Ctx`. Map-shaped data is
/// shallow-copied with the extra key; a caller-supplied `Ctx` key wins and
/// the map passes through untouched. Non-map data passes through, and
/// absent data becomes a map holding only the context.
fn inject_context(data: Value, ctx: &RenderContext) -> Value {
    use minijinja::value::ValueKind;
    match data.kind() {
        ValueKind::Map => {
            if let Ok(existing) = data.get_attr("Ctx") {
                if !existing.is_undefined() {
                    return data;
                }
            }
            let mut entries: Vec<(String, Value)> = Vec::new();
            if let Ok(keys) = data.try_iter() {
                for key in keys {
                    let name = match key.as_str() {
                        Some(name) => name.to_owned(),
                        None => continue,
                    };
                    if let Ok(value) = data.get_item(&key) {
                        entries.push((name, value));
                    }
                }
            }
            entries.push(("Ctx".to_owned(), ctx.to_value()));
            Value::from_iter(entries)
        }
        ValueKind::Undefined | ValueKind::None => {
            Value::from_iter([("Ctx".to_owned(), ctx.to_value())])
        }
        _ => data,
    }
}
