/*
 * scanner.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Lenient markup scanning for component tags.
//!
//! Documents are tokenized with quick-xml in a permissive configuration so
//! that ordinary hand-written HTML (unmatched closes, unquoted attributes,
//! bare ampersands) passes through untouched. The scanner only cares about
//! tags whose name starts with an uppercase letter; everything else is
//! opaque text to be copied verbatim.
//!
//! Byte offsets come from the tokenizer's buffer position, so a span always
//! addresses the raw input slice including the open and close tags.

use memchr::memchr;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};

/// Tags that never take a closing tag in HTML. They must not participate in
/// depth counting or a `<br>` inside a component body would unbalance the
/// scan for the component's close tag.
const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

fn is_void_element(name: &str) -> bool {
    HTML_VOID_ELEMENTS
        .iter()
        .any(|void| name.eq_ignore_ascii_case(void))
}

/// Whether a tag name denotes a component (first character is uppercase).
pub(crate) fn is_component_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

/// An attribute exactly as written in the source, value unevaluated.
#[derive(Debug, Clone)]
pub(crate) struct RawAttr {
    pub(crate) name: String,
    pub(crate) value: String,
}

/// A component usage located in the input: `input[start..end]` covers the
/// whole tag from `<` through the matching close (or `/>`).
#[derive(Debug)]
pub(crate) struct ComponentSpan {
    pub(crate) name: String,
    pub(crate) attrs: Vec<RawAttr>,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

/// Streams component spans out of a document, left to right.
pub(crate) struct ComponentScanner<'a> {
    input: &'a str,
    reader: Reader<&'a [u8]>,
}

impl<'a> ComponentScanner<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        let mut reader = Reader::from_reader(input.as_bytes());
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.allow_dangling_amp = true;
        config.trim_text_start = false;
        config.trim_text_end = false;
        Self { input, reader }
    }

    /// The next component usage, or `None` once the document is exhausted.
    pub(crate) fn next_span(&mut self) -> Result<Option<ComponentSpan>> {
        let mut buf = Vec::new();
        loop {
            let start = self.reader.buffer_position() as usize;
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(tag)) => {
                    let name = tag_name(&tag);
                    if is_component_name(&name) {
                        let attrs = collect_attrs(&tag);
                        let end = self.scan_to_close(&name)?;
                        return Ok(Some(self.bounded_span(name, attrs, start, end)?));
                    }
                }
                Ok(Event::Empty(tag)) => {
                    let name = tag_name(&tag);
                    if is_component_name(&name) {
                        let attrs = collect_attrs(&tag);
                        let end = self.reader.buffer_position() as usize;
                        return Ok(Some(self.bounded_span(name, attrs, start, end)?));
                    }
                }
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => {}
                Err(err) => {
                    return Err(Error::Markup {
                        message: err.to_string(),
                    });
                }
            }
            buf.clear();
        }
    }

    /// Scan forward to the close tag matching an already-consumed component
    /// open tag, tracking nesting depth across all intervening tags.
    fn scan_to_close(&mut self, component: &str) -> Result<usize> {
        let mut buf = Vec::new();
        let mut depth = 0usize;
        loop {
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(tag)) => {
                    if !is_void_element(&tag_name(&tag)) {
                        depth += 1;
                    }
                }
                Ok(Event::End(tag)) => {
                    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                    if !is_void_element(&name) {
                        if depth == 0 {
                            return Ok(self.reader.buffer_position() as usize);
                        }
                        depth -= 1;
                    }
                }
                Ok(Event::Eof) => {
                    return Err(Error::UnclosedTag {
                        component: component.to_owned(),
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    return Err(Error::Markup {
                        message: err.to_string(),
                    });
                }
            }
            buf.clear();
        }
    }

    fn bounded_span(
        &self,
        name: String,
        attrs: Vec<RawAttr>,
        start: usize,
        end: usize,
    ) -> Result<ComponentSpan> {
        if start >= end || end > self.input.len() {
            return Err(Error::InvalidOffsets { component: name });
        }
        Ok(ComponentSpan {
            name,
            attrs,
            start,
            end,
        })
    }
}

fn tag_name(tag: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(tag.name().as_ref()).into_owned()
}

/// Collect attributes in HTML mode (unquoted and bare attributes allowed),
/// skipping anything the tokenizer cannot make sense of.
fn collect_attrs(tag: &BytesStart<'_>) -> Vec<RawAttr> {
    tag.html_attributes()
        .flatten()
        .map(|attr| {
            let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            RawAttr { name, value }
        })
        .collect()
}

/// Split a component's raw span into its children markup.
///
/// Returns the text between the open tag's `>` and the final close tag,
/// plus whether the usage was self-closing. Self-closing usages have no
/// children by definition.
pub(crate) fn split_component_body<'a>(raw: &'a str, component: &str) -> Result<(&'a str, bool)> {
    let bytes = raw.as_bytes();
    let gt = memchr(b'>', bytes).ok_or_else(|| Error::MissingClosingBracket {
        component: component.to_owned(),
    })?;

    // Walk back over whitespace to spot `/>` written as `/ >` too.
    let mut i = gt;
    while i > 0 && bytes[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    if i > 0 && bytes[i - 1] == b'/' {
        return Ok(("", true));
    }

    let close = format!("</{component}");
    let close_idx = raw.rfind(&close).ok_or_else(|| Error::MissingClosingTag {
        component: component.to_owned(),
    })?;
    if close_idx < gt + 1 {
        return Err(Error::MissingClosingTag {
            component: component.to_owned(),
        });
    }
    Ok((&raw[gt + 1..close_idx], false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(input: &str) -> Vec<ComponentSpan> {
        let mut scanner = ComponentScanner::new(input);
        let mut out = Vec::new();
        while let Some(span) = scanner.next_span().unwrap() {
            out.push(span);
        }
        out
    }

    #[test]
    fn test_plain_html_yields_no_spans() {
        assert!(spans("<div class=\"x\"><p>hi &amp; bye</p></div>").is_empty());
    }

    #[test]
    fn test_finds_component_with_children() {
        let input = "<html><Card title=\"Hi\"><p>body</p></Card></html>";
        let found = spans(input);
        assert_eq!(found.len(), 1);
        let span = &found[0];
        assert_eq!(span.name, "Card");
        assert_eq!(&input[span.start..span.end], "<Card title=\"Hi\"><p>body</p></Card>");
        assert_eq!(span.attrs.len(), 1);
        assert_eq!(span.attrs[0].name, "title");
        assert_eq!(span.attrs[0].value, "Hi");
    }

    #[test]
    fn test_self_closing_component() {
        let input = "before <Icon name=\"star\"/> after";
        let found = spans(input);
        assert_eq!(found.len(), 1);
        assert_eq!(&input[found[0].start..found[0].end], "<Icon name=\"star\"/>");
    }

    #[test]
    fn test_nested_same_name_components() {
        let input = "<Card><Card>inner</Card></Card>";
        let found = spans(input);
        assert_eq!(found.len(), 1);
        assert_eq!(&input[found[0].start..found[0].end], input);
    }

    #[test]
    fn test_void_elements_do_not_unbalance_depth() {
        let input = "<Card><br><img src=\"x.png\"><hr></Card>";
        let found = spans(input);
        assert_eq!(found.len(), 1);
        assert_eq!(&input[found[0].start..found[0].end], input);
    }

    #[test]
    fn test_unclosed_component_errors() {
        let mut scanner = ComponentScanner::new("<Card><p>never closed</p>");
        let err = scanner.next_span().unwrap_err();
        assert!(matches!(err, Error::UnclosedTag { component } if component == "Card"));
    }

    #[test]
    fn test_split_body_with_children() {
        let (children, self_closing) =
            split_component_body("<Card a=\"1\"><b>x</b></Card>", "Card").unwrap();
        assert_eq!(children, "<b>x</b>");
        assert!(!self_closing);
    }

    #[test]
    fn test_split_body_self_closing() {
        let (children, self_closing) = split_component_body("<Card a=\"1\" />", "Card").unwrap();
        assert_eq!(children, "");
        assert!(self_closing);
    }

    #[test]
    fn test_split_body_missing_close() {
        let err = split_component_body("<Card>", "Card").unwrap_err();
        assert!(matches!(err, Error::MissingClosingTag { .. }));
    }
}
