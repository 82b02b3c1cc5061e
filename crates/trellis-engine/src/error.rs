/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for component expansion and rendering.

use thiserror::Error;

/// Boxed error produced by caller-supplied hooks and pipeline stages.
pub type BoxedHookError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while rendering a document.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a document or component file.
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to the output sink.
    #[error("write output: {source}")]
    Output {
        #[source]
        source: std::io::Error,
    },

    /// The requested document exists but has no content.
    #[error("file is empty: {path}")]
    EmptyFile { path: String },

    /// A bundled file is not valid UTF-8.
    #[error("file {path} is not valid UTF-8")]
    InvalidUtf8 { path: String },

    /// No candidate file matched the component name.
    #[error("component {name} not found; looked in {}", attempts.join(", "))]
    ComponentNotFound { name: String, attempts: Vec<String> },

    /// The document ended before the component's closing tag.
    #[error("unclosed component tag: {component}")]
    UnclosedTag { component: String },

    /// The component's open tag never terminates.
    #[error("component {component} has no closing bracket")]
    MissingClosingBracket { component: String },

    /// A non-self-closing component has no matching close tag.
    #[error("component {component} missing closing tag")]
    MissingClosingTag { component: String },

    /// The tokenizer reported byte offsets outside the buffer.
    #[error("invalid offsets for component {component}")]
    InvalidOffsets { component: String },

    /// Expansion did not reach a fixed point within the pass budget.
    #[error("component rendering exceeded {limit} passes")]
    PassLimitExceeded { limit: usize },

    /// The markup itself could not be tokenized.
    #[error("markup error: {message}")]
    Markup { message: String },

    /// A component template failed to compile. The location carries the
    /// resolved file path and, when known, a 1-based line number.
    #[error("parse component {component} ({location}): {detail}")]
    TemplateParse {
        component: String,
        location: String,
        detail: String,
    },

    /// An attribute expression failed to evaluate.
    #[error("attr {attr}: {source}")]
    Attr {
        attr: String,
        #[source]
        source: minijinja::Error,
    },

    /// A component template failed during execution.
    #[error("render component {component}: {source}")]
    ComponentRender {
        component: String,
        #[source]
        source: minijinja::Error,
    },

    /// The final full-document template pass failed.
    #[error("final template pass: {source}")]
    FinalPass {
        #[source]
        source: minijinja::Error,
    },

    /// A required attribute was absent on a component usage.
    #[error("component {component} missing required attr {attr:?}")]
    MissingRequiredAttr { component: String, attr: String },

    /// An attribute outside the allowed set was present.
    #[error("component {component} received unsupported attr {attr:?}")]
    UnsupportedAttr { component: String, attr: String },

    /// A component augmenter rejected the invocation payload.
    #[error("augment component {component}: {source}")]
    Augment {
        component: String,
        #[source]
        source: BoxedHookError,
    },

    /// A pipeline stage or post-processor failed.
    #[error("pipeline stage {stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: BoxedHookError,
    },
}

impl Error {
    pub(crate) fn output(source: std::io::Error) -> Self {
        Error::Output { source }
    }
}

/// Result type for rendering operations.
pub type Result<T> = std::result::Result<T, Error>;
