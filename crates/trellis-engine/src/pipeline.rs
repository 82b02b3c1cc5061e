/*
 * pipeline.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named post-expansion pipelines.
//!
//! Pipelines run after component expansion (and after the final template
//! pass, when one is configured), in registration order, each stage feeding
//! the next. A stage failure aborts the render with the stage's position in
//! the error.

use std::sync::Arc;

use minijinja::value::Value;
use tracing::debug;

use crate::context::RenderContext;
use crate::error::{BoxedHookError, Error, Result};
use crate::functions::FunctionRegistry;

/// A single transformation over the rendered buffer.
pub type StageFn = Arc<
    dyn Fn(&RenderContext, &[u8], &Value, &FunctionRegistry) -> std::result::Result<Vec<u8>, BoxedHookError>
        + Send
        + Sync,
>;

/// Wrap a closure as a pipeline stage.
pub fn stage<F>(f: F) -> StageFn
where
    F: Fn(&RenderContext, &[u8], &Value, &FunctionRegistry) -> std::result::Result<Vec<u8>, BoxedHookError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

pub(crate) struct Pipeline {
    pub(crate) name: String,
    pub(crate) stages: Vec<StageFn>,
}

impl Pipeline {
    pub(crate) fn run(
        &self,
        ctx: &RenderContext,
        input: Vec<u8>,
        data: &Value,
        funcs: &FunctionRegistry,
    ) -> Result<Vec<u8>> {
        let mut buffer = input;
        for (idx, stage) in self.stages.iter().enumerate() {
            debug!(pipeline = %self.name, stage = idx, bytes = buffer.len(), "running pipeline stage");
            buffer = stage(ctx, &buffer, data, funcs).map_err(|source| Error::Stage {
                stage: format!("{}[{idx}]", self.name),
                source,
            })?;
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(suffix: &'static str) -> StageFn {
        stage(move |_, input, _, _| {
            let mut out = input.to_vec();
            out.extend_from_slice(suffix.as_bytes());
            Ok(out)
        })
    }

    #[test]
    fn test_stages_run_in_order() {
        let pipeline = Pipeline {
            name: "p".to_owned(),
            stages: vec![append("-a"), append("-b")],
        };
        let out = pipeline
            .run(
                &RenderContext::new(),
                b"base".to_vec(),
                &Value::UNDEFINED,
                &FunctionRegistry::new(),
            )
            .unwrap();
        assert_eq!(out, b"base-a-b");
    }

    #[test]
    fn test_stage_error_names_position() {
        let pipeline = Pipeline {
            name: "minify".to_owned(),
            stages: vec![append("-a"), stage(|_, _, _, _| Err("boom".into()))],
        };
        let err = pipeline
            .run(
                &RenderContext::new(),
                Vec::new(),
                &Value::UNDEFINED,
                &FunctionRegistry::new(),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "pipeline stage minify[1] failed: boom");
    }
}
