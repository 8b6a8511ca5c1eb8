//! Node kinds and the `Node` handle used for navigation.

use crate::document::{Document, NodeData};
use crate::names::{Atom, Name, NameId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Position of a node in its document's arena. Ids are allocated in document order, so the
/// id doubles as the node's sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The fieldless classification of a node, used by node tests and rule bucketing.
/// `Node` stands for "any type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Node = 0,
    Element = 1,
    Attribute = 2,
    Text = 3,
    Comment = 4,
    ProcessingInstruction = 5,
    Namespace = 6,
    Document = 7,
}

impl NodeType {
    pub const COUNT: usize = 8;

    pub fn index(self) -> usize {
        self as usize
    }

    /// True if a node of type `self` satisfies a test for `wanted`.
    pub fn isa(self, wanted: NodeType) -> bool {
        wanted == NodeType::Node || self == wanted
    }
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Element { name: NameId, prefix: Atom },
    Attribute { name: NameId, prefix: Atom, value: String },
    Text(String),
    Comment(String),
    ProcessingInstruction { target: NameId, data: String },
    Namespace { prefix: Atom, uri: Atom },
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Document => NodeType::Document,
            NodeKind::Element { .. } => NodeType::Element,
            NodeKind::Attribute { .. } => NodeType::Attribute,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::Comment(_) => NodeType::Comment,
            NodeKind::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
            NodeKind::Namespace { .. } => NodeType::Namespace,
        }
    }
}

/// A cheap, cloneable reference to one node of a shared [`Document`].
#[derive(Clone)]
pub struct Node {
    doc: Arc<Document>,
    id: NodeId,
}

impl Node {
    pub(crate) fn new(doc: Arc<Document>, id: NodeId) -> Self {
        Self { doc, id }
    }

    fn at(&self, id: NodeId) -> Node {
        Node::new(Arc::clone(&self.doc), id)
    }

    fn data(&self) -> &NodeData {
        self.doc.data(self.id)
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.doc
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Position in document order within this node's document.
    pub fn sequence_number(&self) -> u32 {
        self.id.0
    }

    pub fn line_number(&self) -> u32 {
        self.data().line
    }

    pub fn kind(&self) -> &NodeKind {
        &self.data().kind
    }

    pub fn node_type(&self) -> NodeType {
        self.kind().node_type()
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind(), NodeKind::Element { .. })
    }

    pub fn name_id(&self) -> Option<NameId> {
        match self.kind() {
            NodeKind::Element { name, .. } | NodeKind::Attribute { name, .. } => Some(*name),
            NodeKind::ProcessingInstruction { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<Name> {
        let pool = self.doc.name_pool();
        match self.kind() {
            NodeKind::Element { name, prefix } | NodeKind::Attribute { name, prefix, .. } => {
                Some(pool.name(*name, prefix))
            }
            NodeKind::ProcessingInstruction { target, .. } => {
                Some(pool.name(*target, &Atom::from("")))
            }
            NodeKind::Namespace { prefix, .. } => Some(Name {
                uri: Atom::from(""),
                prefix: Atom::from(""),
                local: prefix.clone(),
            }),
            _ => None,
        }
    }

    pub fn local_name(&self) -> String {
        self.name().map(|n| n.local.to_string()).unwrap_or_default()
    }

    pub fn display_name(&self) -> String {
        self.name().map(|n| n.display_name()).unwrap_or_default()
    }

    pub fn namespace_uri(&self) -> String {
        match self.kind() {
            NodeKind::Element { name, .. } | NodeKind::Attribute { name, .. } => {
                self.doc.name_pool().uri(*name).to_string()
            }
            _ => String::new(),
        }
    }

    /// The XPath string-value: descendant text for documents and elements.
    pub fn string_value(&self) -> String {
        match self.kind() {
            NodeKind::Document | NodeKind::Element { .. } => {
                let mut out = String::new();
                for index in self.id.index() + 1..self.data().end as usize {
                    if let NodeKind::Text(text) = &self.doc.data(NodeId(index as u32)).kind {
                        out.push_str(text);
                    }
                }
                out
            }
            NodeKind::Attribute { value, .. } => value.clone(),
            NodeKind::Text(text) | NodeKind::Comment(text) => text.clone(),
            NodeKind::ProcessingInstruction { data, .. } => data.clone(),
            NodeKind::Namespace { uri, .. } => uri.to_string(),
        }
    }

    pub fn parent(&self) -> Option<Node> {
        self.data().parent.map(|id| self.at(id))
    }

    pub fn first_child(&self) -> Option<Node> {
        self.data().first_child.map(|id| self.at(id))
    }

    pub fn last_child(&self) -> Option<Node> {
        self.data().last_child.map(|id| self.at(id))
    }

    pub fn next_sibling(&self) -> Option<Node> {
        self.data().next_sibling.map(|id| self.at(id))
    }

    pub fn previous_sibling(&self) -> Option<Node> {
        self.data().previous_sibling.map(|id| self.at(id))
    }

    pub fn has_children(&self) -> bool {
        self.data().first_child.is_some()
    }

    pub fn children(&self) -> Siblings {
        Siblings {
            doc: Arc::clone(&self.doc),
            next: self.data().first_child,
        }
    }

    /// Siblings after this node, nearest first.
    pub fn following_siblings(&self) -> Siblings {
        Siblings {
            doc: Arc::clone(&self.doc),
            next: self.data().next_sibling,
        }
    }

    /// Siblings before this node, nearest first.
    pub fn preceding_siblings(&self) -> PrecedingSiblings {
        PrecedingSiblings {
            doc: Arc::clone(&self.doc),
            next: self.data().previous_sibling,
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = Node> + '_ {
        let data = self.data();
        let start = self.id.0 + 1 + data.namespace_count;
        (start..start + data.attribute_count).map(move |i| self.at(NodeId(i)))
    }

    pub fn attribute(&self, name: NameId) -> Option<Node> {
        self.attributes()
            .find(|attr| matches!(attr.kind(), NodeKind::Attribute { name: n, .. } if *n == name))
    }

    pub fn attribute_value(&self, name: NameId) -> Option<String> {
        self.attribute(name).map(|attr| attr.string_value())
    }

    /// Namespace nodes for the declarations made on this element.
    pub fn declared_namespaces(&self) -> impl Iterator<Item = Node> + '_ {
        let start = self.id.0 + 1;
        (start..start + self.data().namespace_count).map(move |i| self.at(NodeId(i)))
    }

    /// All namespaces in scope, as namespace nodes, innermost declaration winning.
    /// An undeclaration (`xmlns=""`) hides the default namespace.
    pub fn namespace_nodes(&self) -> Vec<Node> {
        let mut seen: Vec<Atom> = Vec::new();
        let mut result = Vec::new();
        let mut current = if self.is_element() {
            Some(self.clone())
        } else {
            None
        };
        while let Some(element) = current {
            for ns in element.declared_namespaces() {
                if let NodeKind::Namespace { prefix, uri } = ns.kind() {
                    if seen.contains(prefix) {
                        continue;
                    }
                    seen.push(prefix.clone());
                    if !uri.is_empty() {
                        result.push(ns.clone());
                    }
                }
            }
            current = element.parent().filter(Node::is_element);
        }
        result
    }

    /// `(prefix, uri)` pairs for every namespace in scope.
    pub fn in_scope_namespaces(&self) -> Vec<(Atom, Atom)> {
        self.namespace_nodes()
            .into_iter()
            .filter_map(|ns| match ns.kind() {
                NodeKind::Namespace { prefix, uri } => Some((prefix.clone(), uri.clone())),
                _ => None,
            })
            .collect()
    }

    /// Descendants in document order, excluding attribute and namespace nodes.
    pub fn descendants(&self) -> Descendants {
        Descendants {
            doc: Arc::clone(&self.doc),
            next: self.id.0 + 1,
            end: self.data().end,
        }
    }

    /// Nodes after this one in document order that are not its descendants.
    pub fn following(&self) -> Descendants {
        // Attributes are followed by their owner's children.
        let start = match self.kind() {
            NodeKind::Attribute { .. } | NodeKind::Namespace { .. } => {
                self.parent().map(|p| p.id.0 + 1).unwrap_or(self.id.0 + 1)
            }
            _ => self.data().end,
        };
        Descendants {
            doc: Arc::clone(&self.doc),
            next: start,
            end: self.doc.len() as u32,
        }
    }

    /// Nodes before this one in document order that are not its ancestors, nearest first.
    pub fn preceding(&self) -> Preceding {
        let origin = match self.kind() {
            NodeKind::Attribute { .. } | NodeKind::Namespace { .. } => {
                self.parent().map(|p| p.id).unwrap_or(self.id)
            }
            _ => self.id,
        };
        Preceding {
            node: self.at(origin),
            cursor: origin.0,
        }
    }

    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: self.parent(),
        }
    }

    /// True when `other` lies strictly inside this node's subtree (attributes included).
    pub fn is_ancestor_of(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc)
            && other.id.0 > self.id.0
            && other.id.0 < self.data().end
    }

    pub fn root(&self) -> Node {
        self.at(NodeId(0))
    }

    /// A slash-separated path such as `/doc/item[2]/@id`, for diagnostics.
    pub fn path(&self) -> String {
        match self.kind() {
            NodeKind::Document => "/".to_string(),
            NodeKind::Element { name, .. } => {
                let position = 1 + self
                    .preceding_siblings()
                    .filter(|s| s.name_id() == Some(*name))
                    .count();
                format!("{}/{}[{}]", self.parent_path(), self.display_name(), position)
            }
            NodeKind::Attribute { .. } => {
                format!("{}/@{}", self.parent_path(), self.display_name())
            }
            NodeKind::Text(_) => format!("{}/text()", self.parent_path()),
            NodeKind::Comment(_) => format!("{}/comment()", self.parent_path()),
            NodeKind::ProcessingInstruction { .. } => {
                format!("{}/processing-instruction()", self.parent_path())
            }
            NodeKind::Namespace { prefix, .. } => {
                format!("{}/namespace::{}", self.parent_path(), prefix)
            }
        }
    }

    fn parent_path(&self) -> String {
        match self.parent() {
            Some(parent) if parent.node_type() != NodeType::Document => parent.path(),
            _ => String::new(),
        }
    }

    /// A token unique to this node among all documents sharing a name pool.
    pub fn generate_id(&self) -> String {
        format!("d{}n{}", self.doc.number(), self.id.0)
    }

    pub fn is_whitespace_text(&self) -> bool {
        matches!(self.kind(), NodeKind::Text(t) if t.chars().all(char::is_whitespace))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.doc.number() == other.doc.number()
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.doc.number().hash(state);
        self.id.hash(state);
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Document order: by document number, then sequence number.
impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.doc
            .number()
            .cmp(&other.doc.number())
            .then(self.id.cmp(&other.id))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}#{} {})", self.doc.number(), self.id.0, self.path())
    }
}

pub struct Siblings {
    doc: Arc<Document>,
    next: Option<NodeId>,
}

impl Iterator for Siblings {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let id = self.next?;
        self.next = self.doc.data(id).next_sibling;
        Some(Node::new(Arc::clone(&self.doc), id))
    }
}

pub struct PrecedingSiblings {
    doc: Arc<Document>,
    next: Option<NodeId>,
}

impl Iterator for PrecedingSiblings {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let id = self.next?;
        self.next = self.doc.data(id).previous_sibling;
        Some(Node::new(Arc::clone(&self.doc), id))
    }
}

/// Walks a contiguous id range, skipping attribute and namespace nodes.
pub struct Descendants {
    doc: Arc<Document>,
    next: u32,
    end: u32,
}

impl Iterator for Descendants {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        while self.next < self.end {
            let id = NodeId(self.next);
            self.next += 1;
            match self.doc.data(id).kind {
                NodeKind::Attribute { .. } | NodeKind::Namespace { .. } => continue,
                _ => return Some(Node::new(Arc::clone(&self.doc), id)),
            }
        }
        None
    }
}

pub struct Ancestors {
    next: Option<Node>,
}

impl Iterator for Ancestors {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let node = self.next.take()?;
        self.next = node.parent();
        Some(node)
    }
}

/// Reverse document order walk that skips the origin's ancestors.
pub struct Preceding {
    node: Node,
    cursor: u32,
}

impl Iterator for Preceding {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        while self.cursor > 0 {
            self.cursor -= 1;
            let candidate = self.node.at(NodeId(self.cursor));
            match candidate.kind() {
                NodeKind::Attribute { .. } | NodeKind::Namespace { .. } => continue,
                _ if candidate.is_ancestor_of(&self.node) => continue,
                _ => return Some(candidate),
            }
        }
        None
    }
}
