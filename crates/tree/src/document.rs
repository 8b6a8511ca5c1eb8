//! The document arena.

use crate::key_index::KeyIndexSlots;
use crate::names::NamePool;
use crate::node::{Node, NodeId, NodeKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
    pub(crate) previous_sibling: Option<NodeId>,
    /// Number of namespace nodes allocated directly after an element.
    pub(crate) namespace_count: u32,
    /// Number of attribute nodes allocated after the namespace nodes.
    pub(crate) attribute_count: u32,
    /// One past the last id in this node's subtree.
    pub(crate) end: u32,
    pub(crate) line: u32,
}

impl NodeData {
    pub(crate) fn new(kind: NodeKind, parent: Option<NodeId>, id: u32, line: u32) -> Self {
        Self {
            kind,
            parent,
            first_child: None,
            last_child: None,
            next_sibling: None,
            previous_sibling: None,
            namespace_count: 0,
            attribute_count: 0,
            end: id + 1,
            line,
        }
    }
}

/// An immutable tree. All nodes live in one vector in document order.
pub struct Document {
    number: u64,
    pool: Arc<NamePool>,
    nodes: Vec<NodeData>,
    ids: HashMap<String, NodeId>,
    base_uri: Option<String>,
    /// Unparsed entities declared in the DTD: name to system identifier.
    unparsed_entities: HashMap<String, String>,
    key_indexes: KeyIndexSlots,
}

impl Document {
    pub(crate) fn from_parts(
        pool: Arc<NamePool>,
        nodes: Vec<NodeData>,
        ids: HashMap<String, NodeId>,
        base_uri: Option<String>,
        unparsed_entities: HashMap<String, String>,
    ) -> Self {
        Self {
            number: pool.allocate_sequence(),
            pool,
            nodes,
            ids,
            base_uri,
            unparsed_entities,
            key_indexes: KeyIndexSlots::default(),
        }
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn name_pool(&self) -> &Arc<NamePool> {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    pub fn root(self: &Arc<Self>) -> Node {
        Node::new(Arc::clone(self), NodeId(0))
    }

    pub fn node(self: &Arc<Self>, id: NodeId) -> Option<Node> {
        (id.index() < self.nodes.len()).then(|| Node::new(Arc::clone(self), id))
    }

    pub fn document_element(self: &Arc<Self>) -> Option<Node> {
        self.root().children().find(Node::is_element)
    }

    /// The element carrying `id` (or `xml:id`) equal to `value`.
    pub fn select_id(self: &Arc<Self>, value: &str) -> Option<Node> {
        self.ids
            .get(value)
            .map(|id| Node::new(Arc::clone(self), *id))
    }

    pub fn unparsed_entity_uri(&self, name: &str) -> Option<&str> {
        self.unparsed_entities.get(name).map(String::as_str)
    }

    pub fn key_indexes(&self) -> &KeyIndexSlots {
        &self.key_indexes
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("number", &self.number)
            .field("nodes", &self.nodes.len())
            .field("base_uri", &self.base_uri)
            .finish()
    }
}
