//! SVG clean-up and sprite assembly.
//!
//! Both operations run on the `quick-xml` event stream, so markup is never
//! re-serialised from a DOM: attribute values keep their original escaping
//! and element order is untouched.
//!
//! ## Clean-up
//!
//! Removed: XML declaration, doctype, comments, processing instructions,
//! `<metadata>` subtrees, editor-namespace elements and attributes
//! (`sodipodi:`, `inkscape:`, `sketch:`), whitespace-only text between
//! elements. Whitespace inside attribute values is collapsed.
//!
//! ## Sprite
//!
//! ```text
//! icon-cart.svg  <svg viewBox="0 0 24 24"><path …/></svg>
//! logo.svg       <svg viewBox="0 0 90 30"><defs><linearGradient id="g"…/></defs><rect …/></svg>
//!
//! sprite.svg     <svg xmlns=… xmlns:xlink=…>
//!                  <defs><linearGradient id="g"…/></defs>
//!                  <symbol id="icon-cart" viewBox="0 0 24 24"><path …/></symbol>
//!                  <symbol id="logo" viewBox="0 0 90 30"><rect …/></symbol>
//!                </svg>
//! ```
//!
//! Symbol ids must be unique across the sprite.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashSet;
use thiserror::Error;

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

const EDITOR_PREFIXES: &[&[u8]] = &[
    b"sodipodi:",
    b"inkscape:",
    b"sketch:",
    b"xmlns:sodipodi",
    b"xmlns:inkscape",
    b"xmlns:sketch",
];

#[derive(Error, Debug)]
pub enum SvgError {
    #[error("malformed SVG: {0}")]
    Parse(String),
    #[error("failed to write SVG: {0}")]
    Write(String),
    #[error("'{0}' has no <svg> root element")]
    NotSvg(String),
    #[error("duplicate sprite symbol id '{0}'; file names must be unique")]
    DuplicateId(String),
}

/// One input to [`build_sprite`].
#[derive(Debug, Clone)]
pub struct SpriteSymbol {
    /// Symbol id, usually the file stem.
    pub id: String,
    pub svg: String,
}

fn is_editor_name(name: &[u8]) -> bool {
    EDITOR_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn is_dropped_element(e: &BytesStart) -> bool {
    let name = e.name();
    name.as_ref() == b"metadata" || is_editor_name(name.as_ref())
}

fn collapse_whitespace(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    let mut pending_space = false;
    for &b in value {
        if b.is_ascii_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(b' ');
            pending_space = false;
        }
        out.push(b);
    }
    out
}

fn clean_start(e: &BytesStart) -> Result<BytesStart<'static>, SvgError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| SvgError::Parse(err.to_string()))?;
        let key = attr.key.as_ref();
        if is_editor_name(key) {
            continue;
        }
        let value = collapse_whitespace(&attr.value);
        out.push_attribute((key, value.as_slice()));
    }
    Ok(out)
}

/// Parse `svg` into an owned, cleaned event list (without `Eof`).
fn clean_events(svg: &str) -> Result<Vec<Event<'static>>, SvgError> {
    let mut reader = Reader::from_str(svg);
    let mut events = Vec::new();
    // Depth inside a dropped subtree; 0 when emitting.
    let mut skip_depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SvgError::Parse(e.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                if skip_depth > 0 || is_dropped_element(&e) {
                    skip_depth += 1;
                    continue;
                }
                events.push(Event::Start(clean_start(&e)?));
            }
            Event::End(e) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                events.push(Event::End(e.into_owned()));
            }
            Event::Empty(e) => {
                if skip_depth > 0 || is_dropped_element(&e) {
                    continue;
                }
                events.push(Event::Empty(clean_start(&e)?));
            }
            Event::Text(t) => {
                if skip_depth > 0 || t.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                events.push(Event::Text(t.into_owned()));
            }
            Event::CData(c) => {
                if skip_depth == 0 {
                    events.push(Event::CData(c.into_owned()));
                }
            }
            // Declarations, doctype, comments, processing instructions.
            _ => {}
        }
    }
    Ok(events)
}

fn write_events<'a>(
    writer: &mut Writer<Vec<u8>>,
    events: impl IntoIterator<Item = Event<'a>>,
) -> Result<(), SvgError> {
    for event in events {
        writer
            .write_event(event)
            .map_err(|e| SvgError::Write(e.to_string()))?;
    }
    Ok(())
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String, SvgError> {
    String::from_utf8(writer.into_inner()).map_err(|e| SvgError::Write(e.to_string()))
}

/// Strip editor cruft and insignificant whitespace from an SVG document.
pub fn optimize(svg: &str) -> Result<String, SvgError> {
    let events = clean_events(svg)?;
    let mut writer = Writer::new(Vec::new());
    write_events(&mut writer, events)?;
    into_string(writer)
}

fn attribute_value(e: &BytesStart, key: &[u8]) -> Option<Vec<u8>> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| a.value.into_owned())
}

/// Root attributes that still mean something on a `<symbol>`.
const SYMBOL_ATTRIBUTES: [&[u8]; 2] = [b"viewBox", b"preserveAspectRatio"];

fn symbol_attributes(root: &BytesStart) -> Vec<(&'static [u8], Vec<u8>)> {
    SYMBOL_ATTRIBUTES
        .iter()
        .filter_map(|&key| attribute_value(root, key).map(|value| (key, value)))
        .collect()
}

/// Body of one symbol plus the `<defs>` content hoisted out of it.
struct SymbolParts {
    attributes: Vec<(&'static [u8], Vec<u8>)>,
    body: Vec<Event<'static>>,
    defs: Vec<Event<'static>>,
}

fn split_symbol(id: &str, svg: &str) -> Result<SymbolParts, SvgError> {
    let events = clean_events(svg)?;
    let mut iter = events.into_iter();

    let root = loop {
        match iter.next() {
            Some(Event::Start(e)) if e.name().as_ref() == b"svg" => break e,
            Some(Event::Empty(e)) if e.name().as_ref() == b"svg" => {
                return Ok(SymbolParts {
                    attributes: symbol_attributes(&e),
                    body: Vec::new(),
                    defs: Vec::new(),
                });
            }
            Some(Event::Start(_)) | Some(Event::Empty(_)) | None => {
                return Err(SvgError::NotSvg(id.to_string()));
            }
            Some(_) => continue,
        }
    };

    let mut parts = SymbolParts {
        attributes: symbol_attributes(&root),
        body: Vec::new(),
        defs: Vec::new(),
    };
    // Depth below the root element.
    let mut depth = 0usize;
    // Set while inside a direct-child <defs>; holds the depth it opened at.
    let mut in_defs: Option<usize> = None;

    for event in iter {
        match &event {
            Event::Start(e) => {
                depth += 1;
                if depth == 1 && in_defs.is_none() && e.name().as_ref() == b"defs" {
                    in_defs = Some(depth);
                    continue;
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                if in_defs == Some(depth) {
                    in_defs = None;
                    depth -= 1;
                    continue;
                }
                depth -= 1;
            }
            Event::Empty(e) if depth == 0 && e.name().as_ref() == b"defs" => continue,
            _ => {}
        }
        if in_defs.is_some() {
            parts.defs.push(event);
        } else {
            parts.body.push(event);
        }
    }
    Ok(parts)
}

/// Combine several SVG documents into one sprite of `<symbol>` elements.
pub fn build_sprite(symbols: &[SpriteSymbol]) -> Result<String, SvgError> {
    let mut seen = HashSet::new();
    let mut defs = Vec::new();
    let mut bodies = Vec::new();

    for symbol in symbols {
        if !seen.insert(symbol.id.as_str()) {
            return Err(SvgError::DuplicateId(symbol.id.clone()));
        }
        let parts = split_symbol(&symbol.id, &symbol.svg)?;
        defs.extend(parts.defs);
        bodies.push((symbol.id.as_str(), parts.attributes, parts.body));
    }

    let mut writer = Writer::new(Vec::new());
    let mut root = BytesStart::new("svg");
    root.push_attribute(("xmlns", SVG_NS));
    root.push_attribute(("xmlns:xlink", XLINK_NS));
    write_events(&mut writer, [Event::Start(root)])?;

    if !defs.is_empty() {
        write_events(&mut writer, [Event::Start(BytesStart::new("defs"))])?;
        write_events(&mut writer, defs)?;
        write_events(&mut writer, [Event::End(BytesEnd::new("defs"))])?;
    }

    for (id, attributes, body) in bodies {
        let mut start = BytesStart::new("symbol");
        start.push_attribute(("id", id));
        for (key, value) in &attributes {
            start.push_attribute((*key, value.as_slice()));
        }
        if body.is_empty() {
            write_events(&mut writer, [Event::Empty(start)])?;
        } else {
            write_events(&mut writer, [Event::Start(start)])?;
            write_events(&mut writer, body)?;
            write_events(&mut writer, [Event::End(BytesEnd::new("symbol"))])?;
        }
    }

    write_events(&mut writer, [Event::End(BytesEnd::new("svg"))])?;
    into_string(writer)
}
