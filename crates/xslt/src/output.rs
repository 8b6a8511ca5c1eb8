//! The output side of a run: the [`Emitter`] event sink, the destinations the controller
//! writes to, and the [`Outputter`] that turns instruction-level calls into well-formed
//! event streams.

use crate::error::{Location, XsltError};
use std::sync::Arc;
use weft_tree::{Atom, ContentHandler, Document, Name, NamePool, TreeBuilder, XML_NAMESPACE};

/// A sink for the serialization event stream of a result tree.
pub trait Emitter {
    fn start_document(&mut self) -> Result<(), XsltError>;
    fn end_document(&mut self) -> Result<(), XsltError>;
    /// `namespaces` are the `(prefix, uri)` declarations new on this element.
    fn start_element(
        &mut self,
        name: &Name,
        namespaces: &[(Atom, Atom)],
        attributes: &[(Name, String)],
    ) -> Result<(), XsltError>;
    fn end_element(&mut self, name: &Name) -> Result<(), XsltError>;
    fn characters(&mut self, text: &str, disable_escaping: bool) -> Result<(), XsltError>;
    fn comment(&mut self, text: &str) -> Result<(), XsltError>;
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XsltError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    StartDocument,
    EndDocument,
    StartElement {
        name: Name,
        namespaces: Vec<(Atom, Atom)>,
        attributes: Vec<(Name, String)>,
    },
    EndElement(Name),
    Characters {
        text: String,
        disable_escaping: bool,
    },
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

/// Records events so they can be inspected or replayed into another emitter.
#[derive(Debug, Default, Clone)]
pub struct EventRecorder {
    events: Vec<OutputEvent>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<OutputEvent> {
        self.events
    }

    /// The first element started, if any.
    pub fn first_element(&self) -> Option<&Name> {
        self.events.iter().find_map(|event| match event {
            OutputEvent::StartElement { name, .. } => Some(name),
            _ => None,
        })
    }

    pub fn replay(&self, target: &mut dyn Emitter) -> Result<(), XsltError> {
        for event in &self.events {
            match event {
                OutputEvent::StartDocument => target.start_document()?,
                OutputEvent::EndDocument => target.end_document()?,
                OutputEvent::StartElement {
                    name,
                    namespaces,
                    attributes,
                } => target.start_element(name, namespaces, attributes)?,
                OutputEvent::EndElement(name) => target.end_element(name)?,
                OutputEvent::Characters {
                    text,
                    disable_escaping,
                } => target.characters(text, *disable_escaping)?,
                OutputEvent::Comment(text) => target.comment(text)?,
                OutputEvent::ProcessingInstruction { target: t, data } => {
                    target.processing_instruction(t, data)?
                }
            }
        }
        Ok(())
    }
}

impl Emitter for EventRecorder {
    fn start_document(&mut self) -> Result<(), XsltError> {
        self.events.push(OutputEvent::StartDocument);
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), XsltError> {
        self.events.push(OutputEvent::EndDocument);
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &Name,
        namespaces: &[(Atom, Atom)],
        attributes: &[(Name, String)],
    ) -> Result<(), XsltError> {
        self.events.push(OutputEvent::StartElement {
            name: name.clone(),
            namespaces: namespaces.to_vec(),
            attributes: attributes.to_vec(),
        });
        Ok(())
    }

    fn end_element(&mut self, name: &Name) -> Result<(), XsltError> {
        self.events.push(OutputEvent::EndElement(name.clone()));
        Ok(())
    }

    fn characters(&mut self, text: &str, disable_escaping: bool) -> Result<(), XsltError> {
        // Adjacent text is merged, as it would be in a tree.
        if let Some(OutputEvent::Characters {
            text: last,
            disable_escaping: last_disabled,
        }) = self.events.last_mut()
        {
            if *last_disabled == disable_escaping {
                last.push_str(text);
                return Ok(());
            }
        }
        self.events.push(OutputEvent::Characters {
            text: text.to_string(),
            disable_escaping,
        });
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), XsltError> {
        self.events.push(OutputEvent::Comment(text.to_string()));
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XsltError> {
        self.events.push(OutputEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
        Ok(())
    }
}

/// Builds a result tree fragment as a fresh document.
pub struct TreeEmitter {
    builder: TreeBuilder,
}

impl TreeEmitter {
    pub fn new(pool: Arc<NamePool>) -> Self {
        Self {
            builder: TreeBuilder::new(pool).fragment(),
        }
    }

    pub fn finish(self) -> Result<Arc<Document>, XsltError> {
        Ok(self.builder.finish()?)
    }
}

impl Emitter for TreeEmitter {
    fn start_document(&mut self) -> Result<(), XsltError> {
        Ok(self.builder.start_document()?)
    }

    fn end_document(&mut self) -> Result<(), XsltError> {
        Ok(self.builder.end_document()?)
    }

    fn start_element(
        &mut self,
        name: &Name,
        namespaces: &[(Atom, Atom)],
        attributes: &[(Name, String)],
    ) -> Result<(), XsltError> {
        Ok(self
            .builder
            .start_element_named(name, namespaces, attributes, 0)?)
    }

    fn end_element(&mut self, _name: &Name) -> Result<(), XsltError> {
        Ok(self.builder.end_element_named()?)
    }

    fn characters(&mut self, text: &str, _disable_escaping: bool) -> Result<(), XsltError> {
        Ok(self.builder.characters(text, 0)?)
    }

    fn comment(&mut self, text: &str) -> Result<(), XsltError> {
        Ok(self.builder.comment(text, 0)?)
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XsltError> {
        Ok(self.builder.processing_instruction(target, data, 0)?)
    }
}

/// Collects the text of content that may only produce text. Nodes of other kinds are
/// dropped together with their content.
#[derive(Debug, Default)]
pub struct TextCollector {
    text: String,
    skipped_depth: usize,
    skipped: usize,
}

impl TextCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many non-text nodes were dropped.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl Emitter for TextCollector {
    fn start_document(&mut self) -> Result<(), XsltError> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), XsltError> {
        Ok(())
    }

    fn start_element(
        &mut self,
        _name: &Name,
        _namespaces: &[(Atom, Atom)],
        _attributes: &[(Name, String)],
    ) -> Result<(), XsltError> {
        if self.skipped_depth == 0 {
            self.skipped += 1;
        }
        self.skipped_depth += 1;
        Ok(())
    }

    fn end_element(&mut self, _name: &Name) -> Result<(), XsltError> {
        self.skipped_depth = self.skipped_depth.saturating_sub(1);
        Ok(())
    }

    fn characters(&mut self, text: &str, _disable_escaping: bool) -> Result<(), XsltError> {
        if self.skipped_depth == 0 {
            self.text.push_str(text);
        }
        Ok(())
    }

    fn comment(&mut self, _text: &str) -> Result<(), XsltError> {
        self.skipped += usize::from(self.skipped_depth == 0);
        Ok(())
    }

    fn processing_instruction(&mut self, _target: &str, _data: &str) -> Result<(), XsltError> {
        self.skipped += usize::from(self.skipped_depth == 0);
        Ok(())
    }
}

/// Where an [`Outputter`] sends its events.
pub enum Destination {
    /// The principal result, recorded and replayed to the caller's emitter once the run
    /// has succeeded.
    Result(EventRecorder),
    Tree(TreeEmitter),
    Text(TextCollector),
}

impl Destination {
    fn emitter(&mut self) -> &mut dyn Emitter {
        match self {
            Destination::Result(recorder) => recorder,
            Destination::Tree(tree) => tree,
            Destination::Text(text) => text,
        }
    }
}

struct PendingElement {
    name: Name,
    namespaces: Vec<(Atom, Atom)>,
    attributes: Vec<(Name, String)>,
}

/// Turns instruction-level output calls into a well-formed event stream: start tags are
/// held back until their first content so attributes can still be added, and namespace
/// declarations are fixed up so every name used is declared.
pub struct Outputter {
    destination: Destination,
    pending: Option<PendingElement>,
    open: Vec<(Name, usize)>,
    namespaces: Vec<(Atom, Atom)>,
    generated_prefixes: usize,
}

impl Outputter {
    pub fn new(mut destination: Destination) -> Result<Self, XsltError> {
        destination.emitter().start_document()?;
        Ok(Self {
            destination,
            pending: None,
            open: Vec::new(),
            namespaces: Vec::new(),
            generated_prefixes: 0,
        })
    }

    /// Element nesting depth, counting a start tag still being built.
    pub fn depth(&self) -> usize {
        self.open.len() + usize::from(self.pending.is_some())
    }

    pub fn start_element(
        &mut self,
        name: Name,
        namespaces: &[(Atom, Atom)],
    ) -> Result<(), XsltError> {
        self.flush()?;
        self.pending = Some(PendingElement {
            name,
            namespaces: namespaces.to_vec(),
            attributes: Vec::new(),
        });
        Ok(())
    }

    /// Adds an attribute to the start tag being built. A later attribute of the same
    /// name replaces an earlier one.
    pub fn attribute(&mut self, name: Name, value: String) -> Result<(), XsltError> {
        let Some(pending) = self.pending.as_mut() else {
            return Err(XsltError::recoverable(
                format!(
                    "attribute '{}' cannot be added after children or outside an element",
                    name
                ),
                Location::default(),
            ));
        };
        match pending.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => pending.attributes.push((name, value)),
        }
        Ok(())
    }

    /// Adds a namespace declaration to the start tag being built.
    pub fn namespace(&mut self, prefix: Atom, uri: Atom) -> Result<(), XsltError> {
        let Some(pending) = self.pending.as_mut() else {
            return Err(XsltError::recoverable(
                format!("namespace '{}' cannot be added after children", prefix),
                Location::default(),
            ));
        };
        if !pending.namespaces.iter().any(|(p, _)| *p == prefix) {
            pending.namespaces.push((prefix, uri));
        }
        Ok(())
    }

    pub fn end_element(&mut self) -> Result<(), XsltError> {
        self.flush()?;
        if let Some((name, mark)) = self.open.pop() {
            self.namespaces.truncate(mark);
            self.destination.emitter().end_element(&name)?;
        }
        Ok(())
    }

    pub fn characters(&mut self, text: &str, disable_escaping: bool) -> Result<(), XsltError> {
        if text.is_empty() {
            return Ok(());
        }
        self.flush()?;
        self.destination.emitter().characters(text, disable_escaping)
    }

    pub fn comment(&mut self, text: &str) -> Result<(), XsltError> {
        self.flush()?;
        self.destination.emitter().comment(text)
    }

    pub fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XsltError> {
        self.flush()?;
        self.destination.emitter().processing_instruction(target, data)
    }

    /// Closes elements until only `depth` remain open.
    pub fn unwind_to(&mut self, depth: usize) -> Result<(), XsltError> {
        while self.depth() > depth {
            self.end_element()?;
        }
        Ok(())
    }

    /// Closes everything still open and ends the document.
    pub fn finish(mut self) -> Result<Destination, XsltError> {
        self.unwind_to(0)?;
        self.destination.emitter().end_document()?;
        Ok(self.destination)
    }

    fn lookup(&self, prefix: &Atom) -> Option<&Atom> {
        self.namespaces
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri)
    }

    fn flush(&mut self) -> Result<(), XsltError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let mark = self.namespaces.len();
        let mut declared = Vec::new();
        for (prefix, uri) in &pending.namespaces {
            self.declare(prefix.clone(), uri.clone(), mark, &mut declared);
        }
        let mut name = pending.name;
        if self.conflicts(&name.prefix, &name.uri, mark) {
            name.prefix = self.fresh_prefix(&name.uri, mark);
        }
        self.declare(name.prefix.clone(), name.uri.clone(), mark, &mut declared);

        let mut attributes = pending.attributes;
        for (attr, _) in attributes.iter_mut() {
            if attr.uri.is_empty() {
                attr.prefix = Atom::from("");
                continue;
            }
            if attr.uri.as_ref() == XML_NAMESPACE {
                attr.prefix = Atom::from("xml");
                continue;
            }
            if attr.prefix.is_empty() || self.conflicts(&attr.prefix, &attr.uri, mark) {
                attr.prefix = self.fresh_prefix(&attr.uri, mark);
            }
            self.declare(attr.prefix.clone(), attr.uri.clone(), mark, &mut declared);
        }
        self.destination
            .emitter()
            .start_element(&name, &declared, &attributes)?;
        self.open.push((name, mark));
        Ok(())
    }

    /// True if `prefix` is already bound to another URI on the element being flushed.
    fn conflicts(&self, prefix: &Atom, uri: &Atom, mark: usize) -> bool {
        self.namespaces[mark..]
            .iter()
            .any(|(p, u)| p == prefix && u != uri)
    }

    /// A prefix for `uri`: one already in scope if there is one, else a new one.
    fn fresh_prefix(&mut self, uri: &Atom, mark: usize) -> Atom {
        let in_scope = self
            .namespaces
            .iter()
            .rev()
            .find(|(p, u)| u == uri && !p.is_empty() && !self.conflicts(p, uri, mark))
            .map(|(p, _)| p.clone());
        if let Some(prefix) = in_scope {
            return prefix;
        }
        loop {
            let candidate = Atom::from(format!("ns{}", self.generated_prefixes));
            self.generated_prefixes += 1;
            if self.lookup(&candidate).is_none() {
                return candidate;
            }
        }
    }

    fn declare(
        &mut self,
        prefix: Atom,
        uri: Atom,
        mark: usize,
        declared: &mut Vec<(Atom, Atom)>,
    ) {
        if prefix.as_ref() == "xml" {
            return;
        }
        let current = self.lookup(&prefix).cloned().unwrap_or_else(|| Atom::from(""));
        if current == uri {
            return;
        }
        // An unprefixed name in no namespace needs no declaration unless a default
        // namespace is in scope; a prefix cannot be undeclared.
        if uri.is_empty() && !prefix.is_empty() {
            return;
        }
        if self.conflicts(&prefix, &uri, mark) {
            return;
        }
        self.namespaces.push((prefix.clone(), uri.clone()));
        declared.push((prefix, uri));
    }
}
