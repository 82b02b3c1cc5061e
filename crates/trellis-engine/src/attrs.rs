/*
 * attrs.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Attribute evaluation, validation rules, and attribute forwarding.

use std::collections::{BTreeMap, BTreeSet};

use minijinja::value::{Rest, Value};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::functions::{FunctionRegistry, evaluate_str};
use crate::scanner::RawAttr;

/// An attribute after expression evaluation.
///
/// `name` is the attribute exactly as written; `canonical` is its lowercase
/// form, which validation rules and forwarding excludes match against.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAttr {
    pub name: String,
    pub canonical: String,
    pub value: Value,
}

/// Evaluate every attribute of a component usage.
///
/// Returns the props map (keyed by the lower-cased attribute name)
/// alongside the ordered attribute list templates receive as `Attrs`.
pub(crate) fn resolve_attrs(
    attrs: &[RawAttr],
    funcs: &FunctionRegistry,
    data: &Value,
) -> Result<(BTreeMap<String, Value>, Vec<ResolvedAttr>)> {
    let mut props = BTreeMap::new();
    let mut resolved = Vec::with_capacity(attrs.len());
    for attr in attrs {
        let value = evaluate_attr(&attr.value, funcs, data).map_err(|source| Error::Attr {
            attr: attr.name.clone(),
            source,
        })?;
        let canonical = attr.name.to_lowercase();
        props.insert(canonical.clone(), value.clone());
        resolved.push(ResolvedAttr {
            name: attr.name.clone(),
            canonical,
            value,
        });
    }
    Ok((props, resolved))
}

/// Evaluate a single attribute value.
///
/// Values without template syntax pass through as-is. Evaluated output that
/// trims to `true` or `false` coerces to a boolean so conditionals in
/// component bodies behave naturally; anything else stays an untrimmed
/// string.
fn evaluate_attr(
    raw: &str,
    funcs: &FunctionRegistry,
    data: &Value,
) -> std::result::Result<Value, minijinja::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::from(""));
    }
    let evaluated = if raw.contains("{{") || raw.contains("{%") {
        evaluate_str(raw, funcs, data)?
    } else {
        raw.to_owned()
    };
    Ok(interpret_attr_value(evaluated))
}

fn interpret_attr_value(evaluated: String) -> Value {
    match evaluated.trim() {
        "true" => Value::from(true),
        "false" => Value::from(false),
        "" => Value::from(""),
        _ => Value::from(evaluated),
    }
}

/// Declarative attribute constraints for one component.
#[derive(Debug, Clone, Default)]
pub struct AttrRules {
    required: BTreeSet<String>,
    allowed: BTreeSet<String>,
    allow_others: bool,
}

impl AttrRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// The attribute must be present on every usage. Implies allowed.
    pub fn require(mut self, attr: impl Into<String>) -> Self {
        self.required.insert(attr.into().to_lowercase());
        self
    }

    /// The attribute may be present.
    pub fn allow(mut self, attr: impl Into<String>) -> Self {
        self.allowed.insert(attr.into().to_lowercase());
        self
    }

    /// Accept attributes beyond the declared set.
    pub fn allow_others(mut self) -> Self {
        self.allow_others = true;
        self
    }

    pub(crate) fn validate(&self, component: &str, attrs: &[ResolvedAttr]) -> Result<()> {
        let present: BTreeSet<&str> = attrs.iter().map(|a| a.canonical.as_str()).collect();
        for required in &self.required {
            if !present.contains(required.as_str()) {
                return Err(Error::MissingRequiredAttr {
                    component: component.to_owned(),
                    attr: required.clone(),
                });
            }
        }
        if !self.allow_others {
            for attr in attrs {
                if !self.required.contains(&attr.canonical)
                    && !self.allowed.contains(&attr.canonical)
                {
                    return Err(Error::UnsupportedAttr {
                        component: component.to_owned(),
                        attr: attr.canonical.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Template function that re-emits a component's attributes as markup.
///
/// `{{ forward_attrs(Attrs, "title") }}` renders every attribute except
/// `title` in source order: ` name="value"` for strings, a bare ` name` for
/// boolean true, nothing for false, empty, or absent values. Names and
/// values are HTML-escaped; the result is marked safe so it splices
/// verbatim.
pub fn forward_attrs(attrs: Value, exclude: Rest<String>) -> Value {
    let excluded: BTreeSet<String> = exclude.0.iter().map(|name| name.to_lowercase()).collect();
    let mut out = String::new();
    if let Ok(iter) = attrs.try_iter() {
        for attr in iter {
            let canonical = attr
                .get_attr("canonical")
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            if excluded.contains(&canonical) {
                continue;
            }
            let name = attr
                .get_attr("name")
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            let name = escape_html(&name);
            let value = attr.get_attr("value").unwrap_or(Value::UNDEFINED);
            match value.kind() {
                minijinja::value::ValueKind::Undefined | minijinja::value::ValueKind::None => {}
                minijinja::value::ValueKind::Bool => {
                    if value.is_true() {
                        out.push(' ');
                        out.push_str(&name);
                    }
                }
                _ => {
                    let text = match value.as_str() {
                        Some(text) => text.to_owned(),
                        None => value.to_string(),
                    };
                    if !text.is_empty() {
                        out.push(' ');
                        out.push_str(&name);
                        out.push_str("=\"");
                        out.push_str(&escape_html(&text));
                        out.push('"');
                    }
                }
            }
        }
    }
    Value::from_safe_string(out)
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, value: &str) -> RawAttr {
        RawAttr {
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }

    #[test]
    fn test_literal_and_expression_attrs() {
        let funcs = FunctionRegistry::new().with("shout", |_| Ok(Value::from("LOUD")));
        let data = Value::from_serialize(&serde_json::json!({ "Message": "hello" }));
        let attrs = [
            raw("title", "Plain"),
            raw("msg", "{{ Message }}"),
            raw("fn", "{{ shout() }}"),
        ];
        let (props, resolved) = resolve_attrs(&attrs, &funcs, &data).unwrap();
        assert_eq!(props["title"], Value::from("Plain"));
        assert_eq!(props["msg"], Value::from("hello"));
        assert_eq!(props["fn"], Value::from("LOUD"));
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[1].canonical, "msg");
    }

    #[test]
    fn test_bool_and_empty_coercion() {
        let funcs = FunctionRegistry::new();
        let data = Value::UNDEFINED;
        let attrs = [
            raw("visible", "true"),
            raw("hidden", " false "),
            raw("blank", "   "),
            raw("spaced", " keep me "),
        ];
        let (props, _) = resolve_attrs(&attrs, &funcs, &data).unwrap();
        assert_eq!(props["visible"], Value::from(true));
        assert_eq!(props["hidden"], Value::from(false));
        assert_eq!(props["blank"], Value::from(""));
        assert_eq!(props["spaced"], Value::from(" keep me "));
    }

    #[test]
    fn test_attr_error_names_the_attr() {
        let funcs = FunctionRegistry::new().with("boom", |_| {
            Err(minijinja::Error::new(
                minijinja::ErrorKind::InvalidOperation,
                "boom",
            ))
        });
        let err = resolve_attrs(&[raw("bad", "{{ boom() }}")], &funcs, &Value::UNDEFINED)
            .unwrap_err();
        assert!(err.to_string().starts_with("attr bad:"), "{err}");
    }

    #[test]
    fn test_rules_required_and_unsupported() {
        let rules = AttrRules::new().require("title").allow("class");
        let title = ResolvedAttr {
            name: "Title".to_owned(),
            canonical: "title".to_owned(),
            value: Value::from("x"),
        };
        let extra = ResolvedAttr {
            name: "onclick".to_owned(),
            canonical: "onclick".to_owned(),
            value: Value::from("x"),
        };

        let err = rules.validate("Card", &[]).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredAttr { .. }));

        let err = rules.validate("Card", &[title.clone(), extra.clone()]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedAttr { attr, .. } if attr == "onclick"));

        let open = AttrRules::new().require("title").allow_others();
        open.validate("Card", &[title, extra]).unwrap();
    }

    #[test]
    fn test_forward_attrs_rendering() {
        let attrs = Value::from_serialize(&vec![
            ResolvedAttr {
                name: "label".to_owned(),
                canonical: "label".to_owned(),
                value: Value::from("Save"),
            },
            ResolvedAttr {
                name: "data-id".to_owned(),
                canonical: "data-id".to_owned(),
                value: Value::from("123"),
            },
            ResolvedAttr {
                name: "disabled".to_owned(),
                canonical: "disabled".to_owned(),
                value: Value::from(true),
            },
            ResolvedAttr {
                name: "hidden".to_owned(),
                canonical: "hidden".to_owned(),
                value: Value::from(false),
            },
            ResolvedAttr {
                name: "note".to_owned(),
                canonical: "note".to_owned(),
                value: Value::from("a<b"),
            },
        ]);
        let out = forward_attrs(attrs, Rest(vec!["Label".to_owned()]));
        assert_eq!(
            out.as_str().unwrap(),
            " data-id=\"123\" disabled note=\"a&lt;b\""
        );
    }

    #[test]
    fn test_forward_attrs_escapes_names() {
        let attrs = Value::from_serialize(&vec![
            ResolvedAttr {
                name: "x\"><script".to_owned(),
                canonical: "x\"><script".to_owned(),
                value: Value::from("v"),
            },
            ResolvedAttr {
                name: "a<b".to_owned(),
                canonical: "a<b".to_owned(),
                value: Value::from(true),
            },
        ]);
        let out = forward_attrs(attrs, Rest(vec![]));
        assert_eq!(
            out.as_str().unwrap(),
            " x&quot;&gt;&lt;script=\"v\" a&lt;b"
        );
    }
}
