//! Builds a [`Document`] from a SAX-like stream of events in a single forward pass.

use crate::document::{Document, NodeData};
use crate::error::TreeError;
use crate::names::{Atom, Name, NameId, NamePool, XML_NAMESPACE};
use crate::node::{NodeId, NodeKind};
use crate::space::SpaceRules;
use std::collections::HashMap;
use std::sync::Arc;

/// Receiver of parse events. Attributes arrive as ordered `(qname, value)` pairs,
/// namespace declarations included.
pub trait ContentHandler {
    fn start_document(&mut self) -> Result<(), TreeError>;
    fn end_document(&mut self) -> Result<(), TreeError>;
    fn start_element(
        &mut self,
        qname: &str,
        attributes: &[(String, String)],
        line: u32,
    ) -> Result<(), TreeError>;
    fn end_element(&mut self, qname: &str, line: u32) -> Result<(), TreeError>;
    fn characters(&mut self, text: &str, line: u32) -> Result<(), TreeError>;
    fn comment(&mut self, text: &str, line: u32) -> Result<(), TreeError>;
    fn processing_instruction(&mut self, target: &str, data: &str, line: u32)
    -> Result<(), TreeError>;

    /// An `<!ENTITY name SYSTEM "uri" NDATA type>` declaration.
    fn unparsed_entity(&mut self, _name: &str, _system_id: &str) -> Result<(), TreeError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Initial,
    Open,
    Ended,
}

struct OpenElement {
    id: NodeId,
    qname: String,
    ns_mark: usize,
    preserve: bool,
    strip: bool,
}

pub struct TreeBuilder {
    pool: Arc<NamePool>,
    nodes: Vec<NodeData>,
    open: Vec<OpenElement>,
    namespaces: Vec<(Atom, Atom)>,
    ids: HashMap<String, NodeId>,
    text: String,
    text_line: u32,
    space: Option<SpaceRules>,
    fragment: bool,
    state: BuildState,
    seen_root: bool,
    base_uri: Option<String>,
    unparsed_entities: HashMap<String, String>,
    id_name: NameId,
    xml_id_name: NameId,
    xml_space_name: NameId,
}

impl TreeBuilder {
    pub fn new(pool: Arc<NamePool>) -> Self {
        let id_name = pool.intern("", "id");
        let xml_id_name = pool.intern(XML_NAMESPACE, "id");
        let xml_space_name = pool.intern(XML_NAMESPACE, "space");
        Self {
            pool,
            nodes: Vec::new(),
            open: Vec::new(),
            namespaces: Vec::new(),
            ids: HashMap::new(),
            text: String::new(),
            text_line: 0,
            space: None,
            fragment: false,
            state: BuildState::Initial,
            seen_root: false,
            base_uri: None,
            unparsed_entities: HashMap::new(),
            id_name,
            xml_id_name,
            xml_space_name,
        }
    }

    pub fn with_space_rules(mut self, rules: SpaceRules) -> Self {
        self.space = (!rules.is_empty()).then_some(rules);
        self
    }

    /// Accept any number of top-level elements and top-level text, as a result tree
    /// fragment may contain.
    pub fn fragment(mut self) -> Self {
        self.fragment = true;
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn name_pool(&self) -> &Arc<NamePool> {
        &self.pool
    }

    /// Consumes the builder. Fails unless `end_document` has been seen.
    pub fn finish(self) -> Result<Arc<Document>, TreeError> {
        if self.state != BuildState::Ended {
            return Err(TreeError::structure("document is incomplete", self.text_line));
        }
        log::trace!("built document with {} nodes", self.nodes.len());
        Ok(Arc::new(Document::from_parts(
            self.pool,
            self.nodes,
            self.ids,
            self.base_uri,
            self.unparsed_entities,
        )))
    }

    /// Starts an element whose names are already resolved. `namespaces` are the
    /// `(prefix, uri)` declarations to record on it.
    pub fn start_element_named(
        &mut self,
        name: &Name,
        namespaces: &[(Atom, Atom)],
        attributes: &[(Name, String)],
        line: u32,
    ) -> Result<(), TreeError> {
        let mark = self.namespaces.len();
        self.namespaces.extend(namespaces.iter().cloned());
        let name_id = self.pool.intern_name(name);
        let attributes = attributes
            .iter()
            .map(|(n, v)| (self.pool.intern_name(n), n.prefix.clone(), v.clone()))
            .collect::<Vec<_>>();
        self.open_element(
            name_id,
            name.prefix.clone(),
            mark,
            attributes,
            name.display_name(),
            line,
        )
    }

    /// Closes the innermost open element without checking its name.
    pub fn end_element_named(&mut self) -> Result<(), TreeError> {
        let line = self.text_line;
        self.close_element(None, line)
    }

    fn require_open(&self, line: u32) -> Result<(), TreeError> {
        match self.state {
            BuildState::Open => Ok(()),
            BuildState::Initial => Err(TreeError::structure("content before start of document", line)),
            BuildState::Ended => Err(TreeError::structure("content after end of document", line)),
        }
    }

    fn current_parent(&self) -> NodeId {
        self.open.last().map(|o| o.id).unwrap_or(NodeId(0))
    }

    fn at_top_level(&self) -> bool {
        self.open.len() <= 1
    }

    fn push_node(&mut self, kind: NodeKind, parent: NodeId, line: u32) -> NodeId {
        let id = self.nodes.len() as u32;
        self.nodes.push(NodeData::new(kind, Some(parent), id, line));
        NodeId(id)
    }

    fn link_child(&mut self, parent: NodeId, child: NodeId) {
        match self.nodes[parent.index()].last_child {
            Some(previous) => {
                self.nodes[previous.index()].next_sibling = Some(child);
                self.nodes[child.index()].previous_sibling = Some(previous);
            }
            None => self.nodes[parent.index()].first_child = Some(child),
        }
        self.nodes[parent.index()].last_child = Some(child);
    }

    fn append_child(&mut self, kind: NodeKind, line: u32) -> NodeId {
        let parent = self.current_parent();
        let id = self.push_node(kind, parent, line);
        self.link_child(parent, id);
        id
    }

    fn resolve_prefix(&self, prefix: &str) -> Option<Atom> {
        if prefix == "xml" {
            return Some(Atom::from(XML_NAMESPACE));
        }
        self.namespaces
            .iter()
            .rev()
            .find(|(p, _)| &**p == prefix)
            .map(|(_, uri)| uri.clone())
    }

    fn resolve_name(
        &self,
        qname: &str,
        use_default: bool,
        line: u32,
    ) -> Result<(NameId, Atom), TreeError> {
        match qname.split_once(':') {
            Some((prefix, local)) => {
                let uri = self.resolve_prefix(prefix).filter(|u| !u.is_empty()).ok_or_else(|| {
                    TreeError::structure(
                        format!("namespace prefix '{}' is not declared", prefix),
                        line,
                    )
                })?;
                Ok((self.pool.intern(&uri, local), Atom::from(prefix)))
            }
            None => {
                let uri = if use_default {
                    self.resolve_prefix("").unwrap_or_else(|| Atom::from(""))
                } else {
                    Atom::from("")
                };
                Ok((self.pool.intern(&uri, qname), Atom::from("")))
            }
        }
    }

    fn flush_text(&mut self) -> Result<(), TreeError> {
        if self.text.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.text);
        let whitespace = text.chars().all(char::is_whitespace);
        if self.at_top_level() && !self.fragment {
            if whitespace {
                return Ok(());
            }
            return Err(TreeError::structure(
                "character data outside the document element",
                self.text_line,
            ));
        }
        if whitespace && self.open.last().is_some_and(|o| o.strip) {
            return Ok(());
        }
        let line = self.text_line;
        self.append_child(NodeKind::Text(text), line);
        Ok(())
    }

    fn open_element(
        &mut self,
        name: NameId,
        prefix: Atom,
        ns_mark: usize,
        attributes: Vec<(NameId, Atom, String)>,
        qname: String,
        line: u32,
    ) -> Result<(), TreeError> {
        self.require_open(line)?;
        self.flush_text()?;
        if self.at_top_level() && !self.fragment {
            if self.seen_root {
                return Err(TreeError::structure(
                    format!("element <{}> follows the document element", qname),
                    line,
                ));
            }
            self.seen_root = true;
        }

        let id = self.append_child(NodeKind::Element { name, prefix }, line);

        let declarations = self.namespaces[ns_mark..].to_vec();
        for (ns_prefix, uri) in &declarations {
            self.push_node(
                NodeKind::Namespace {
                    prefix: ns_prefix.clone(),
                    uri: uri.clone(),
                },
                id,
                line,
            );
        }

        let mut preserve = self.open.last().is_some_and(|o| o.preserve);
        let mut seen: Vec<NameId> = Vec::with_capacity(attributes.len());
        for (attr_name, attr_prefix, value) in &attributes {
            if seen.contains(attr_name) {
                return Err(TreeError::structure(
                    format!("duplicate attribute '{}' on <{}>", self.pool.local_name(*attr_name), qname),
                    line,
                ));
            }
            seen.push(*attr_name);
            if *attr_name == self.id_name || *attr_name == self.xml_id_name {
                self.ids.entry(value.trim().to_string()).or_insert(id);
            }
            if *attr_name == self.xml_space_name {
                match value.as_str() {
                    "preserve" => preserve = true,
                    "default" => preserve = false,
                    _ => {}
                }
            }
            self.push_node(
                NodeKind::Attribute {
                    name: *attr_name,
                    prefix: attr_prefix.clone(),
                    value: value.clone(),
                },
                id,
                line,
            );
        }

        let data = &mut self.nodes[id.index()];
        data.namespace_count = declarations.len() as u32;
        data.attribute_count = attributes.len() as u32;

        let strip = !preserve
            && self
                .space
                .as_ref()
                .is_some_and(|rules| rules.strips(name, &self.pool));
        self.open.push(OpenElement {
            id,
            qname,
            ns_mark,
            preserve,
            strip,
        });
        Ok(())
    }

    fn close_element(&mut self, qname: Option<&str>, line: u32) -> Result<(), TreeError> {
        self.require_open(line)?;
        self.flush_text()?;
        if self.at_top_level() {
            return Err(TreeError::structure(
                format!("unexpected end tag </{}>", qname.unwrap_or("?")),
                line,
            ));
        }
        let Some(element) = self.open.pop() else {
            return Err(TreeError::structure("no open element", line));
        };
        if let Some(qname) = qname {
            if qname != element.qname {
                return Err(TreeError::structure(
                    format!("end tag </{}> does not match <{}>", qname, element.qname),
                    line,
                ));
            }
        }
        self.nodes[element.id.index()].end = self.nodes.len() as u32;
        self.namespaces.truncate(element.ns_mark);
        Ok(())
    }
}

impl ContentHandler for TreeBuilder {
    fn start_document(&mut self) -> Result<(), TreeError> {
        if self.state != BuildState::Initial {
            return Err(TreeError::structure("document already started", 0));
        }
        self.nodes.push(NodeData::new(NodeKind::Document, None, 0, 0));
        self.open.push(OpenElement {
            id: NodeId(0),
            qname: String::new(),
            ns_mark: 0,
            preserve: false,
            strip: false,
        });
        self.state = BuildState::Open;
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), TreeError> {
        let line = self.text_line;
        self.require_open(line)?;
        self.flush_text()?;
        if let Some(unclosed) = self.open.get(1) {
            return Err(TreeError::structure(
                format!("element <{}> is not closed", unclosed.qname),
                self.nodes[unclosed.id.index()].line,
            ));
        }
        if !self.fragment && !self.seen_root {
            return Err(TreeError::structure("document has no document element", line));
        }
        self.nodes[0].end = self.nodes.len() as u32;
        self.open.clear();
        self.state = BuildState::Ended;
        Ok(())
    }

    fn start_element(
        &mut self,
        qname: &str,
        attributes: &[(String, String)],
        line: u32,
    ) -> Result<(), TreeError> {
        let mark = self.namespaces.len();
        let mut plain = Vec::with_capacity(attributes.len());
        for (attr_qname, value) in attributes {
            if attr_qname == "xmlns" {
                self.namespaces.push((Atom::from(""), Atom::from(value.as_str())));
            } else if let Some(prefix) = attr_qname.strip_prefix("xmlns:") {
                if value.is_empty() {
                    return Err(TreeError::structure(
                        format!("namespace prefix '{}' cannot be undeclared", prefix),
                        line,
                    ));
                }
                self.namespaces
                    .push((Atom::from(prefix), Atom::from(value.as_str())));
            } else {
                plain.push((attr_qname, value));
            }
        }
        let (name, prefix) = self.resolve_name(qname, true, line)?;
        let mut resolved = Vec::with_capacity(plain.len());
        for (attr_qname, value) in plain {
            let (attr_name, attr_prefix) = self.resolve_name(attr_qname, false, line)?;
            resolved.push((attr_name, attr_prefix, value.clone()));
        }
        self.open_element(name, prefix, mark, resolved, qname.to_string(), line)
    }

    fn end_element(&mut self, qname: &str, line: u32) -> Result<(), TreeError> {
        self.close_element(Some(qname), line)
    }

    fn characters(&mut self, text: &str, line: u32) -> Result<(), TreeError> {
        self.require_open(line)?;
        if self.text.is_empty() {
            self.text_line = line;
        }
        self.text.push_str(text);
        Ok(())
    }

    fn comment(&mut self, text: &str, line: u32) -> Result<(), TreeError> {
        self.require_open(line)?;
        self.flush_text()?;
        self.append_child(NodeKind::Comment(text.to_string()), line);
        Ok(())
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        line: u32,
    ) -> Result<(), TreeError> {
        self.require_open(line)?;
        self.flush_text()?;
        let target = self.pool.intern("", target);
        self.append_child(
            NodeKind::ProcessingInstruction {
                target,
                data: data.to_string(),
            },
            line,
        );
        Ok(())
    }

    fn unparsed_entity(&mut self, name: &str, system_id: &str) -> Result<(), TreeError> {
        self.unparsed_entities
            .entry(name.to_string())
            .or_insert_with(|| system_id.to_string());
        Ok(())
    }
}
