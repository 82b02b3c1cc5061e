/*
 * cache.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Engine-local caches for compiled templates and component sources.
//!
//! Both caches are read-heavy: a render takes a read lock per component and
//! only writes on a miss. Poisoned locks are recovered rather than
//! propagated; a panicked writer leaves at worst a missing entry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::functions::CompiledTemplate;

/// A component source with the path it was resolved from.
#[derive(Debug, Clone)]
pub(crate) struct ComponentSource {
    pub(crate) text: String,
    pub(crate) origin: String,
}

#[derive(Default)]
pub(crate) struct TemplateCache {
    entries: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
}

impl TemplateCache {
    pub(crate) fn get(&self, key: &str) -> Option<Arc<CompiledTemplate>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub(crate) fn insert(&self, key: String, template: Arc<CompiledTemplate>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, template);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Default)]
pub(crate) struct SourceCache {
    entries: RwLock<HashMap<String, Arc<ComponentSource>>>,
}

impl SourceCache {
    pub(crate) fn get(&self, key: &str) -> Option<Arc<ComponentSource>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub(crate) fn insert(&self, key: String, source: Arc<ComponentSource>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, source);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
