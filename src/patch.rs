//! In-place XML attribute patching
//!
//! Transform edits must not reserialize model XML: vendor parts carry
//! attributes and ordering quirks a round-trip would normalize away, and
//! some slicer binaries reject normalized files. Instead, edits locate the
//! exact byte span of each target tag and rewrite single attributes inside
//! that span, leaving every other byte of the document untouched.
//!
//! Spans come from the XML reader itself: the reader position immediately
//! before and after a tag event delimits exactly `<tag ...>` or
//! `<tag .../>`, because intervening text is always its own event.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};

/// Byte span of one tag within a document, `start..end` inclusive of `<`/`>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpan {
    /// Offset of the `<`
    pub start: usize,
    /// Offset one past the `>`
    pub end: usize,
}

impl TagSpan {
    /// The tag text within `document`
    pub fn text<'a>(&self, document: &'a str) -> &'a str {
        &document[self.start..self.end]
    }
}

/// Byte spans of `<item>` tags that are direct children of `<build>`
///
/// Nested `<item>` tags inside extension content are skipped via depth
/// tracking. Errors when the document has no `<build>` section.
pub fn build_item_spans(xml: &str) -> Result<Vec<TagSpan>> {
    let mut reader = Reader::from_str(xml);
    let mut spans = Vec::new();
    let mut depth_in_build: Option<usize> = None;
    let mut saw_build = false;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(Error::Xml)?;
        let after = reader.buffer_position() as usize;
        match event {
            Event::Start(ref e) => {
                let local = e.local_name();
                if local.as_ref() == b"build" && depth_in_build.is_none() {
                    saw_build = true;
                    depth_in_build = Some(0);
                } else if let Some(depth) = depth_in_build.as_mut() {
                    if *depth == 0 && local.as_ref() == b"item" {
                        spans.push(TagSpan {
                            start: before,
                            end: after,
                        });
                    }
                    *depth += 1;
                }
            }
            Event::Empty(ref e) => {
                if let Some(0) = depth_in_build {
                    if e.local_name().as_ref() == b"item" {
                        spans.push(TagSpan {
                            start: before,
                            end: after,
                        });
                    }
                }
            }
            Event::End(ref e) => {
                if let Some(depth) = depth_in_build.as_mut() {
                    if *depth == 0 {
                        debug_assert_eq!(e.local_name().as_ref(), b"build");
                        depth_in_build = None;
                    } else {
                        *depth -= 1;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_build {
        return Err(Error::InvalidXml("3MF missing build section".to_string()));
    }
    Ok(spans)
}

/// Byte spans of all `<assemble_item>` tags in document order
pub fn assemble_item_spans(xml: &str) -> Result<Vec<TagSpan>> {
    named_tag_spans(xml, b"assemble_item")
}

/// Byte spans of all tags with the given local name, any nesting depth
pub fn named_tag_spans(xml: &str, local_name: &[u8]) -> Result<Vec<TagSpan>> {
    let mut reader = Reader::from_str(xml);
    let mut spans = Vec::new();

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(Error::Xml)?;
        let after = reader.buffer_position() as usize;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if e.local_name().as_ref() == local_name {
                    spans.push(TagSpan {
                        start: before,
                        end: after,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(spans)
}

/// Byte spans of `<component>` tags keyed by their enclosing object's id
///
/// Objects whose `id` attribute is missing or non-numeric are skipped, as
/// are components outside any object.
pub fn component_spans_by_object(xml: &str) -> Result<Vec<(usize, TagSpan)>> {
    let mut reader = Reader::from_str(xml);
    let mut spans = Vec::new();
    let mut current_object: Option<usize> = None;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(Error::Xml)?;
        let after = reader.buffer_position() as usize;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let local = e.local_name();
                if local.as_ref() == b"object" {
                    if matches!(event, Event::Start(_)) {
                        current_object = get_attr(
                            &xml[before..after],
                            "id",
                        )
                        .and_then(|v| v.parse::<usize>().ok());
                    }
                } else if local.as_ref() == b"component" {
                    if let Some(object_id) = current_object {
                        spans.push((
                            object_id,
                            TagSpan {
                                start: before,
                                end: after,
                            },
                        ));
                    }
                }
            }
            Event::End(ref e) => {
                if e.local_name().as_ref() == b"object" {
                    current_object = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(spans)
}

/// Read an attribute value out of raw tag text
pub fn get_attr(tag_text: &str, name: &str) -> Option<String> {
    let (_, value_range) = find_attr(tag_text, name)?;
    Some(tag_text[value_range].to_string())
}

/// Rewrite one attribute inside raw tag text
///
/// Replaces the existing value when the attribute is present, otherwise
/// inserts the attribute before the closing `/>` or `>`. All other bytes of
/// the tag are preserved exactly.
pub fn set_attr(tag_text: &str, name: &str, value: &str) -> String {
    if let Some((_, value_range)) = find_attr(tag_text, name) {
        let mut out = String::with_capacity(tag_text.len() + value.len());
        out.push_str(&tag_text[..value_range.start]);
        out.push_str(value);
        out.push_str(&tag_text[value_range.end..]);
        return out;
    }

    let insert_at = if tag_text.ends_with("/>") {
        tag_text.len() - 2
    } else if tag_text.ends_with('>') {
        tag_text.len() - 1
    } else {
        tag_text.len()
    };
    let mut out = String::with_capacity(tag_text.len() + name.len() + value.len() + 4);
    out.push_str(tag_text[..insert_at].trim_end());
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(value);
    out.push('"');
    out.push_str(&tag_text[insert_at..]);
    out
}

/// Locate an attribute: returns (name start, value byte range between quotes)
fn find_attr(tag_text: &str, name: &str) -> Option<(usize, std::ops::Range<usize>)> {
    let bytes = tag_text.as_bytes();
    let mut search_from = 0;
    while let Some(rel) = tag_text[search_from..].find(name) {
        let name_start = search_from + rel;
        search_from = name_start + 1;

        // Whole-word attribute name: preceded by whitespace, followed by
        // optional whitespace then '='. Rejects matches inside values and
        // longer names ("transform" inside "old_transform").
        let preceded_ok = name_start > 0
            && bytes[name_start - 1].is_ascii_whitespace();
        if !preceded_ok {
            continue;
        }

        let mut i = name_start + name.len();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || (bytes[i] != b'"' && bytes[i] != b'\'') {
            continue;
        }
        let quote = bytes[i];
        let value_start = i + 1;
        let value_end = tag_text[value_start..]
            .find(quote as char)
            .map(|p| value_start + p)?;
        return Some((name_start, value_start..value_end));
    }
    None
}

/// Splice replacement tag texts into a document at the given spans
///
/// Spans must be non-overlapping; they are applied in ascending order
/// regardless of map iteration order.
pub fn splice_spans(document: &str, replacements: &[(TagSpan, String)]) -> String {
    let mut ordered: Vec<&(TagSpan, String)> = replacements.iter().collect();
    ordered.sort_by_key(|(span, _)| span.start);

    let mut out = String::with_capacity(document.len());
    let mut cursor = 0;
    for (span, replacement) in ordered {
        out.push_str(&document[cursor..span.start]);
        out.push_str(replacement);
        cursor = span.end;
    }
    out.push_str(&document[cursor..]);
    out
}
