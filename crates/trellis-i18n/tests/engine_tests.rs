/*
 * engine_tests.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use minijinja::value::Value;
use pretty_assertions::assert_eq;
use trellis_engine::{Engine, RenderContext};
use trellis_i18n::{I18nOptions, Translator, function_provider, with_accept_language};

struct MapTranslator(HashMap<String, String>);

impl Translator for MapTranslator {
    fn translate(&self, key: &str, _args: &[Value]) -> String {
        self.0.get(key).cloned().unwrap_or_else(|| key.to_owned())
    }
}

fn catalog(pairs: &[(&str, &str)]) -> Arc<dyn Translator> {
    Arc::new(MapTranslator(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
    ))
}

#[test]
fn engine_renders_translated_components_per_request_locale() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("greeting.html"),
        "<p>{{ t('hello') }} ({{ locale() }})</p>",
    )
    .unwrap();
    fs::write(dir.path().join("page.html"), "<Greeting/>").unwrap();

    let options = I18nOptions::new("en", |locale: &str| match locale {
        "fr" => Some(catalog(&[("hello", "bonjour")])),
        "en" => Some(catalog(&[("hello", "hello")])),
        _ => None,
    })
    .supported_locale("fr");

    let engine = Engine::builder(dir.path())
        .function_provider(function_provider(options))
        .build();

    let fr = with_accept_language(RenderContext::new(), "fr-CA,en;q=0.8");
    let out = engine
        .render_to_string(&fr, "page.html", serde_json::json!({}))
        .unwrap();
    assert_eq!(out, "<p>bonjour (fr)</p>");

    let en = RenderContext::new();
    let out = engine
        .render_to_string(&en, "page.html", serde_json::json!({}))
        .unwrap();
    assert_eq!(out, "<p>hello (en)</p>");
}
