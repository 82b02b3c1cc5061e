/*
 * expand.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Component expansion: the pass loop and the streaming walk.

use std::io::Write;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::engine::{Engine, RenderState};
use crate::error::{Error, Result};
use crate::hooks::{ComponentPayload, InstrumentEvent, InstrumentStage};
use crate::scanner::{ComponentScanner, ComponentSpan, split_component_body};

/// Default budget for expansion passes and nesting depth. A document whose
/// components keep emitting new component tags past this bound is cyclic.
pub const MAX_EXPANSION_PASSES: usize = 16;

/// Walks a document and replaces component usages with rendered markup.
pub(crate) struct Expander<'e> {
    engine: &'e Engine,
    state: &'e RenderState,
}

impl<'e> Expander<'e> {
    pub(crate) fn new(engine: &'e Engine, state: &'e RenderState) -> Self {
        Self { engine, state }
    }

    /// Expand to a fixed point: each pass replaces every component usage
    /// found in the current buffer, and rendered output is rescanned on the
    /// next pass. A buffer with no component tags is final.
    pub(crate) fn expand(&self, input: String, depth: usize) -> Result<String> {
        let mut buffer = input;
        for pass in 0..self.engine.max_passes {
            let spans = collect_spans(&buffer)?;
            if spans.is_empty() {
                return Ok(buffer);
            }
            debug!(pass, components = spans.len(), "expansion pass");

            let mut out = String::with_capacity(buffer.len());
            let mut cursor = 0;
            for span in &spans {
                out.push_str(&buffer[cursor..span.start]);
                let fragment =
                    self.render_component(span, &buffer[span.start..span.end], depth)?;
                out.push_str(&fragment);
                cursor = span.end;
            }
            out.push_str(&buffer[cursor..]);
            buffer = out;
        }
        Err(Error::PassLimitExceeded {
            limit: self.engine.max_passes,
        })
    }

    /// Depth-first streaming expansion: literal text goes to the writer as
    /// soon as it is known final, and each rendered fragment is streamed
    /// recursively before the text after it.
    pub(crate) fn stream(&self, input: &str, writer: &mut dyn Write, depth: usize) -> Result<()> {
        let mut scanner = ComponentScanner::new(input);
        let mut cursor = 0;
        while let Some(span) = scanner.next_span()? {
            writer
                .write_all(input[cursor..span.start].as_bytes())
                .map_err(Error::output)?;
            let fragment = self.render_component(&span, &input[span.start..span.end], depth)?;
            self.stream(&fragment, writer, depth + 1)?;
            cursor = span.end;
        }
        writer
            .write_all(input[cursor..].as_bytes())
            .map_err(Error::output)
    }

    fn render_component(&self, span: &ComponentSpan, raw: &str, depth: usize) -> Result<String> {
        if !self.engine.instrument_hooks.is_empty() {
            let begin = InstrumentEvent {
                component: &span.name,
                stage: InstrumentStage::Begin,
                error: None,
                duration: Duration::ZERO,
            };
            for hook in &self.engine.instrument_hooks {
                hook(&self.state.ctx, &begin);
            }
        }

        let started = Instant::now();
        let result = self.render_component_inner(span, raw, depth);

        if !self.engine.instrument_hooks.is_empty() {
            let end = InstrumentEvent {
                component: &span.name,
                stage: InstrumentStage::End,
                error: result.as_ref().err(),
                duration: started.elapsed(),
            };
            for hook in &self.engine.instrument_hooks {
                hook(&self.state.ctx, &end);
            }
        }
        result
    }

    fn render_component_inner(
        &self,
        span: &ComponentSpan,
        raw: &str,
        depth: usize,
    ) -> Result<String> {
        if depth > self.engine.max_passes {
            return Err(Error::PassLimitExceeded {
                limit: self.engine.max_passes,
            });
        }

        let template = self.engine.load_component_template(self.state, &span.name)?;
        let (children_raw, self_closing) = split_component_body(raw, &span.name)?;
        let children = if children_raw.is_empty() {
            String::new()
        } else {
            self.expand(children_raw.to_owned(), depth + 1)?
        };

        let (props, attrs) =
            crate::attrs::resolve_attrs(&span.attrs, &self.state.funcs, &self.state.data)?;
        if let Some(rules) = self.engine.attr_rules.get(&span.name.to_lowercase()) {
            rules.validate(&span.name, &attrs)?;
        }

        let mut payload = ComponentPayload {
            component: span.name.clone(),
            props,
            attrs,
            // Presence of a body, not of rendered output: a whitespace-only
            // body still counts.
            has_children: !children_raw.is_empty(),
            children,
            children_raw: children_raw.to_owned(),
            self_closing,
        };
        self.apply_augmenters(&mut payload)?;

        let value = payload.to_value(&self.state.ctx, &self.state.data);
        template.execute(&value).map_err(|source| Error::ComponentRender {
            component: span.name.clone(),
            source,
        })
    }

    fn apply_augmenters(&self, payload: &mut ComponentPayload) -> Result<()> {
        let keys = ["*".to_owned(), payload.component.to_lowercase()];
        for key in &keys {
            let Some(augmenters) = self.engine.augmenters.get(key) else {
                continue;
            };
            for augmenter in augmenters {
                augmenter(&self.state.ctx, payload).map_err(|source| Error::Augment {
                    component: payload.component.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

fn collect_spans(input: &str) -> Result<Vec<ComponentSpan>> {
    let mut scanner = ComponentScanner::new(input);
    let mut spans = Vec::new();
    while let Some(span) = scanner.next_span()? {
        spans.push(span);
    }
    Ok(spans)
}
