//! A quick-xml driver that turns XML text into [`ContentHandler`] events.

use crate::builder::{ContentHandler, TreeBuilder};
use crate::document::Document;
use crate::error::TreeError;
use crate::names::NamePool;
use crate::space::SpaceRules;
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use std::sync::Arc;

/// Parses `source` into a document sharing `pool`.
pub fn parse_document(source: &str, pool: &Arc<NamePool>) -> Result<Arc<Document>, TreeError> {
    let mut builder = TreeBuilder::new(Arc::clone(pool));
    drive(source, &mut builder)?;
    builder.finish()
}

/// Parses `source`, dropping whitespace-only text nodes as `rules` direct.
pub fn parse_document_with(
    source: &str,
    pool: &Arc<NamePool>,
    rules: &SpaceRules,
    base_uri: Option<&str>,
) -> Result<Arc<Document>, TreeError> {
    let mut builder = TreeBuilder::new(Arc::clone(pool)).with_space_rules(rules.clone());
    if let Some(base) = base_uri {
        builder = builder.with_base_uri(base);
    }
    drive(source, &mut builder)?;
    builder.finish()
}

/// Maps byte offsets to 1-based line numbers, scanning forward only.
struct LineTracker<'s> {
    source: &'s [u8],
    offset: usize,
    line: u32,
}

impl<'s> LineTracker<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source: source.as_bytes(),
            offset: 0,
            line: 1,
        }
    }

    fn line_at(&mut self, position: usize) -> u32 {
        let position = position.min(self.source.len());
        if position > self.offset {
            self.line += self.source[self.offset..position]
                .iter()
                .filter(|&&b| b == b'\n')
                .count() as u32;
            self.offset = position;
        }
        self.line
    }
}

fn element_attributes(e: &BytesStart<'_>, line: u32) -> Result<Vec<(String, String)>, TreeError> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| TreeError::Xml {
            source: err.into(),
            line,
        })?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let raw = std::str::from_utf8(&attr.value)?;
        let value = unescape(raw).map_err(|err| TreeError::Xml {
            source: err.into(),
            line,
        })?;
        attributes.push((key, value.into_owned()));
    }
    Ok(attributes)
}

fn resolve_entity(name: &str, line: u32) -> Result<String, TreeError> {
    let resolved = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => name
            .strip_prefix("#x")
            .map(|hex| u32::from_str_radix(hex, 16).ok())
            .or_else(|| name.strip_prefix('#').map(|dec| dec.parse::<u32>().ok()))
            .flatten()
            .and_then(char::from_u32),
    };
    resolved
        .map(String::from)
        .ok_or_else(|| TreeError::structure(format!("unknown entity reference &{};", name), line))
}

/// The `(name, system id)` of each unparsed entity declared in a document type
/// declaration's internal subset.
fn unparsed_entities(doctype: &str) -> Vec<(&str, &str)> {
    let mut found = Vec::new();
    for declaration in doctype.split("<!ENTITY").skip(1) {
        let declaration = declaration.split('>').next().unwrap_or_default();
        let mut rest = declaration.trim_start();
        if rest.starts_with('%') {
            continue;
        }
        let name_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = rest[name_end..].trim_start();
        let literals = if rest.starts_with("SYSTEM") {
            1
        } else if rest.starts_with("PUBLIC") {
            2
        } else {
            continue;
        };
        rest = rest[6..].trim_start();
        let mut system_id = "";
        for _ in 0..literals {
            let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
                break;
            };
            let Some(end) = rest[1..].find(quote) else {
                break;
            };
            system_id = &rest[1..1 + end];
            rest = rest[end + 2..].trim_start();
        }
        if rest.starts_with("NDATA") && !name.is_empty() {
            found.push((name, system_id));
        }
    }
    found
}

/// Reads `source` and reports every event to `handler`, bracketed by document events.
pub fn drive<H: ContentHandler>(source: &str, handler: &mut H) -> Result<(), TreeError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(false);
    let mut lines = LineTracker::new(source);
    let mut buf = Vec::new();

    handler.start_document()?;
    loop {
        let pos = reader.buffer_position() as usize;
        let line = lines.line_at(pos);
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|source| TreeError::Xml { source, line })?;
        match event {
            XmlEvent::Start(e) => {
                let name = e.name();
                let qname = std::str::from_utf8(name.as_ref())?.to_string();
                let attributes = element_attributes(&e, line)?;
                handler.start_element(&qname, &attributes, line)?;
            }
            XmlEvent::Empty(e) => {
                let name = e.name();
                let qname = std::str::from_utf8(name.as_ref())?.to_string();
                let attributes = element_attributes(&e, line)?;
                handler.start_element(&qname, &attributes, line)?;
                handler.end_element(&qname, line)?;
            }
            XmlEvent::End(e) => {
                let name = e.name();
                let qname = std::str::from_utf8(name.as_ref())?;
                handler.end_element(qname, line)?;
            }
            XmlEvent::Text(e) => {
                let raw = std::str::from_utf8(&e)?;
                let text = unescape(raw).map_err(|err| TreeError::Xml {
                    source: err.into(),
                    line,
                })?;
                handler.characters(&text, line)?;
            }
            XmlEvent::GeneralRef(e) => {
                let name = std::str::from_utf8(&e)?;
                handler.characters(&resolve_entity(name, line)?, line)?;
            }
            XmlEvent::CData(e) => {
                let text = std::str::from_utf8(&e)?;
                handler.characters(text, line)?;
            }
            XmlEvent::Comment(e) => {
                let text = std::str::from_utf8(&e)?;
                handler.comment(text, line)?;
            }
            XmlEvent::PI(e) => {
                let content = std::str::from_utf8(&e)?;
                let (target, data) = content
                    .split_once(char::is_whitespace)
                    .map(|(t, d)| (t, d.trim_start()))
                    .unwrap_or((content, ""));
                handler.processing_instruction(target, data, line)?;
            }
            XmlEvent::DocType(e) => {
                let doctype = std::str::from_utf8(&e)?;
                for (name, system_id) in unparsed_entities(doctype) {
                    handler.unparsed_entity(name, system_id)?;
                }
            }
            XmlEvent::Eof => break,
            _ => (),
        }
        buf.clear();
    }
    handler.end_document()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use proptest::prelude::*;

    #[test]
    fn test_parse_with_entities_and_lines() {
        let pool = NamePool::new();
        let doc = parse_document(
            "<?xml version=\"1.0\"?>\n<doc a=\"x &amp; y\">\n  <p>1 &lt; 2 &#65;</p>\n  <?page break?>\n</doc>",
            &pool,
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        assert_eq!(root.line_number(), 2);
        let a = pool.intern("", "a");
        assert_eq!(root.attribute_value(a).as_deref(), Some("x & y"));
        let p = root.children().find(|c| c.is_element()).unwrap();
        assert_eq!(p.string_value(), "1 < 2 A");
        assert_eq!(p.line_number(), 3);
        let pi = root
            .children()
            .find(|c| c.node_type() == NodeType::ProcessingInstruction)
            .unwrap();
        assert_eq!(pi.local_name(), "page");
        assert_eq!(pi.string_value(), "break");
    }

    #[test]
    fn test_unparsed_entities_from_the_internal_subset() {
        let pool = NamePool::new();
        let doc = parse_document(
            r#"<!DOCTYPE doc [
  <!NOTATION gif SYSTEM "image/gif">
  <!ENTITY logo SYSTEM "images/logo.gif" NDATA gif>
  <!ENTITY banner PUBLIC "-//weft//banner" "images/banner.gif" NDATA gif>
  <!ENTITY text SYSTEM "chapter.xml">
]>
<doc/>"#,
            &pool,
        )
        .unwrap();
        assert_eq!(doc.unparsed_entity_uri("logo"), Some("images/logo.gif"));
        assert_eq!(doc.unparsed_entity_uri("banner"), Some("images/banner.gif"));
        assert_eq!(doc.unparsed_entity_uri("text"), None);
        assert_eq!(doc.unparsed_entity_uri("missing"), None);
    }

    #[test]
    fn test_malformed_input_fails_without_a_tree() {
        let pool = NamePool::new();
        assert!(parse_document("<a><b></a>", &pool).is_err());
        assert!(parse_document("<a>", &pool).is_err());
        assert!(parse_document("<a/><b/>", &pool).is_err());
        assert!(parse_document("", &pool).is_err());
    }

    #[test]
    fn test_axes_over_parsed_tree() {
        let pool = NamePool::new();
        let doc = parse_document("<r><a><b/><c/></a><d/></r>", &pool).unwrap();
        let r = doc.document_element().unwrap();
        let a = r.first_child().unwrap();
        let b = a.first_child().unwrap();
        let c = b.next_sibling().unwrap();
        let d = r.last_child().unwrap();

        let following: Vec<_> = b.following().map(|n| n.local_name()).collect();
        assert_eq!(following, vec!["c", "d"]);
        let preceding: Vec<_> = d.preceding().map(|n| n.local_name()).collect();
        assert_eq!(preceding, vec!["c", "b", "a"]);
        assert_eq!(c.previous_sibling(), Some(b.clone()));
        assert!(r.is_ancestor_of(&c));
        assert!(!c.is_ancestor_of(&r));
        assert_eq!(c.path(), "/r[1]/a[1]/c[1]");
        assert_eq!(c.ancestors().count(), 3);
    }

    fn render(shape: &[u8]) -> String {
        // Each byte opens a child (even), closes the current element (odd), or adds text.
        let mut out = String::from("<root>");
        let mut depth = 0;
        for (i, b) in shape.iter().enumerate() {
            match b % 3 {
                0 => {
                    out.push_str(&format!("<e{} n=\"{}\">", i % 4, i));
                    depth += 1;
                }
                1 if depth > 0 => {
                    out.push_str(&format!("</e{}>", last_open(&out)));
                    depth -= 1;
                }
                _ => out.push_str("t"),
            }
        }
        while depth > 0 {
            out.push_str(&format!("</e{}>", last_open(&out)));
            depth -= 1;
        }
        out.push_str("</root>");
        out
    }

    fn last_open(partial: &str) -> String {
        // Find the innermost unclosed `<eN` in the rendered prefix.
        let mut stack: Vec<String> = Vec::new();
        let mut rest = partial;
        while let Some(start) = rest.find('<') {
            let tail = &rest[start + 1..];
            let end = tail.find('>').unwrap_or(tail.len());
            let tag = &tail[..end];
            if let Some(name) = tag.strip_prefix('/') {
                if name != "root" {
                    stack.pop();
                }
            } else if let Some(name) = tag.split_whitespace().next() {
                if name.starts_with('e') {
                    stack.push(name[1..].to_string());
                }
            }
            rest = &tail[end..];
        }
        stack.pop().unwrap_or_default()
    }

    fn collect_in_order(node: &crate::node::Node, out: &mut Vec<crate::node::Node>) {
        out.push(node.clone());
        for attr in node.attributes() {
            out.push(attr);
        }
        for child in node.children() {
            collect_in_order(&child, out);
        }
    }

    proptest! {
        #[test]
        fn prop_sequence_numbers_follow_document_order(shape in proptest::collection::vec(any::<u8>(), 0..60)) {
            let pool = NamePool::new();
            let doc = parse_document(&render(&shape), &pool).unwrap();
            let mut ordered = Vec::new();
            collect_in_order(&doc.root(), &mut ordered);
            for (i, n) in ordered.iter().enumerate() {
                for m in &ordered[i + 1..] {
                    prop_assert!(n.sequence_number() < m.sequence_number());
                    prop_assert!(n < m);
                }
            }
            prop_assert_eq!(ordered.len(), doc.len());
        }
    }
}
