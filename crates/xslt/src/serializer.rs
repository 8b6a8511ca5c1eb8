//! Serializes an event stream to text using the `xml`, `html` or `text` output method.

use crate::config::{OutputMethod, OutputProperties};
use crate::error::XsltError;
use crate::output::Emitter;
use quick_xml::escape::{escape, partial_escape};
use weft_tree::{Atom, Name};

const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const HTML_RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Picks the output method: the declared one, else `html` when the first element is
/// `html` in no namespace, else `xml`.
pub fn resolve_method(properties: &OutputProperties, first_element: Option<&Name>) -> OutputMethod {
    if let Some(method) = properties.method {
        return method;
    }
    match first_element {
        Some(name) if name.uri.is_empty() && str::eq_ignore_ascii_case(&name.local, "html") => {
            OutputMethod::Html
        }
        _ => OutputMethod::Xml,
    }
}

struct OpenTag {
    name: String,
    html_name: Option<String>,
    has_element_children: bool,
    has_text: bool,
}

/// An [`Emitter`] writing serialized markup into a `String`.
pub struct Serializer {
    properties: OutputProperties,
    method: OutputMethod,
    out: String,
    stack: Vec<OpenTag>,
    start_tag_open: bool,
    prolog_written: bool,
    wrote_anything: bool,
}

impl Serializer {
    pub fn new(properties: OutputProperties, method: OutputMethod) -> Self {
        Self {
            properties,
            method,
            out: String::new(),
            stack: Vec::new(),
            start_tag_open: false,
            prolog_written: false,
            wrote_anything: false,
        }
    }

    pub fn method(&self) -> OutputMethod {
        self.method
    }

    pub fn into_string(self) -> String {
        self.out
    }

    fn write_declaration(&mut self) {
        if self.prolog_written {
            return;
        }
        self.prolog_written = true;
        if self.method == OutputMethod::Xml && !self.properties.omit_xml_declaration {
            self.out.push_str(&format!(
                "<?xml version=\"1.0\" encoding=\"{}\"?>",
                self.properties.encoding
            ));
            if self.properties.indent {
                self.out.push('\n');
            }
        }
    }

    fn write_doctype(&mut self, root: &str) {
        let system = self.properties.doctype_system.clone();
        let public = self.properties.doctype_public.clone();
        let doctype = match (public, system) {
            (Some(public), Some(system)) => {
                format!("<!DOCTYPE {} PUBLIC \"{}\" \"{}\">", root, public, system)
            }
            (None, Some(system)) => format!("<!DOCTYPE {} SYSTEM \"{}\">", root, system),
            (Some(public), None) if self.method == OutputMethod::Html => {
                format!("<!DOCTYPE {} PUBLIC \"{}\">", root, public)
            }
            _ => return,
        };
        if self.wrote_anything && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.out.push_str(&doctype);
        self.out.push('\n');
    }

    fn close_start_tag(&mut self) {
        if self.start_tag_open {
            self.out.push('>');
            self.start_tag_open = false;
        }
    }

    fn indenting(&self) -> bool {
        self.properties.indent && self.method != OutputMethod::Text
    }

    fn newline_and_indent(&mut self, depth: usize) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        for _ in 0..depth {
            self.out.push_str("  ");
        }
    }

    fn in_raw_text(&self) -> bool {
        self.method == OutputMethod::Html
            && self
                .stack
                .last()
                .and_then(|tag| tag.html_name.as_deref())
                .is_some_and(|name| HTML_RAW_TEXT_ELEMENTS.contains(&name))
    }
}

impl Emitter for Serializer {
    fn start_document(&mut self) -> Result<(), XsltError> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), XsltError> {
        self.close_start_tag();
        if self.indenting() && !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &Name,
        namespaces: &[(Atom, Atom)],
        attributes: &[(Name, String)],
    ) -> Result<(), XsltError> {
        if self.method == OutputMethod::Text {
            return Ok(());
        }
        self.write_declaration();
        let qname = name.display_name();
        if self.stack.is_empty() && !self.wrote_anything {
            self.write_doctype(&qname);
        }
        self.close_start_tag();
        if let Some(parent) = self.stack.last_mut() {
            parent.has_element_children = true;
        }
        let mixed = self.stack.last().is_some_and(|tag| tag.has_text);
        if self.indenting() && !mixed && self.wrote_anything {
            self.newline_and_indent(self.stack.len());
        }

        self.out.push('<');
        self.out.push_str(&qname);
        for (prefix, uri) in namespaces {
            if prefix.is_empty() {
                self.out.push_str(" xmlns=\"");
            } else {
                self.out.push_str(" xmlns:");
                self.out.push_str(prefix);
                self.out.push_str("=\"");
            }
            self.out.push_str(&escape(uri.as_ref()));
            self.out.push('"');
        }
        for (attr, value) in attributes {
            self.out.push(' ');
            self.out.push_str(&attr.display_name());
            self.out.push_str("=\"");
            self.out.push_str(&escape(value.as_str()));
            self.out.push('"');
        }
        self.start_tag_open = true;
        self.wrote_anything = true;
        let html_name = (self.method == OutputMethod::Html && name.uri.is_empty())
            .then(|| str::to_ascii_lowercase(&name.local));
        self.stack.push(OpenTag {
            name: qname,
            html_name,
            has_element_children: false,
            has_text: false,
        });
        Ok(())
    }

    fn end_element(&mut self, _name: &Name) -> Result<(), XsltError> {
        if self.method == OutputMethod::Text {
            return Ok(());
        }
        let Some(tag) = self.stack.pop() else {
            return Ok(());
        };
        if self.start_tag_open {
            self.start_tag_open = false;
            match tag.html_name.as_deref() {
                Some(html) if HTML_VOID_ELEMENTS.contains(&html) => self.out.push('>'),
                Some(_) => {
                    self.out.push_str("></");
                    self.out.push_str(&tag.name);
                    self.out.push('>');
                }
                None => self.out.push_str("/>"),
            }
            return Ok(());
        }
        if self.indenting() && tag.has_element_children && !tag.has_text {
            self.newline_and_indent(self.stack.len());
        }
        self.out.push_str("</");
        self.out.push_str(&tag.name);
        self.out.push('>');
        Ok(())
    }

    fn characters(&mut self, text: &str, disable_escaping: bool) -> Result<(), XsltError> {
        if self.method == OutputMethod::Text {
            self.out.push_str(text);
            return Ok(());
        }
        if self.stack.is_empty() && text.trim().is_empty() && !self.wrote_anything {
            return Ok(());
        }
        self.write_declaration();
        self.close_start_tag();
        if let Some(tag) = self.stack.last_mut() {
            tag.has_text = true;
        }
        if disable_escaping || self.in_raw_text() {
            self.out.push_str(text);
        } else {
            self.out.push_str(&partial_escape(text));
        }
        self.wrote_anything = true;
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), XsltError> {
        if self.method == OutputMethod::Text {
            return Ok(());
        }
        self.write_declaration();
        self.close_start_tag();
        if self.indenting() && self.stack.last().is_none_or(|tag| !tag.has_text) && self.wrote_anything {
            self.newline_and_indent(self.stack.len());
        }
        self.out.push_str("<!--");
        self.out.push_str(text);
        self.out.push_str("-->");
        self.wrote_anything = true;
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XsltError> {
        if self.method == OutputMethod::Text {
            return Ok(());
        }
        self.write_declaration();
        self.close_start_tag();
        self.out.push_str("<?");
        self.out.push_str(target);
        if !data.is_empty() {
            self.out.push(' ');
            self.out.push_str(data);
        }
        self.out
            .push_str(if self.method == OutputMethod::Html { ">" } else { "?>" });
        self.wrote_anything = true;
        Ok(())
    }
}
