//! Node collection along each XPath axis, and node tests.

use crate::ast::{Axis, NodeTest, NodeTypeTest};
use std::iter;
use weft_tree::{Node, NodeKind, NodeType};

/// Nodes on `axis` from `node`, in axis order: document order for forward axes,
/// nearest first for reverse axes.
pub fn axis_iter(node: &Node, axis: Axis) -> Box<dyn Iterator<Item = Node>> {
    let is_attached = !matches!(
        node.node_type(),
        NodeType::Attribute | NodeType::Namespace
    );
    match axis {
        Axis::Child => Box::new(node.children()),
        Axis::Descendant => Box::new(node.descendants()),
        Axis::DescendantOrSelf => Box::new(iter::once(node.clone()).chain(node.descendants())),
        Axis::Attribute => {
            let attributes: Vec<Node> = node.attributes().collect();
            Box::new(attributes.into_iter())
        }
        Axis::Namespace => Box::new(node.namespace_nodes().into_iter()),
        Axis::Parent => Box::new(node.parent().into_iter()),
        Axis::Ancestor => Box::new(node.ancestors()),
        Axis::AncestorOrSelf => Box::new(iter::once(node.clone()).chain(node.ancestors())),
        Axis::SelfAxis => Box::new(iter::once(node.clone())),
        Axis::FollowingSibling if is_attached => Box::new(node.following_siblings()),
        Axis::PrecedingSibling if is_attached => Box::new(node.preceding_siblings()),
        Axis::FollowingSibling | Axis::PrecedingSibling => Box::new(iter::empty()),
        Axis::Following => Box::new(node.following()),
        Axis::Preceding => Box::new(node.preceding()),
    }
}

/// The node type a name test selects on `axis`.
pub fn principal_node_type(axis: Axis) -> NodeType {
    match axis {
        Axis::Attribute => NodeType::Attribute,
        Axis::Namespace => NodeType::Namespace,
        _ => NodeType::Element,
    }
}

pub fn matches_node_test(node: &Node, test: &NodeTest, principal: NodeType) -> bool {
    match test {
        NodeTest::NodeType(type_test) => matches_type_test(node, type_test),
        _ if node.node_type() != principal => false,
        NodeTest::Wildcard => true,
        NodeTest::Name(name) => match node.kind() {
            NodeKind::Namespace { prefix, .. } => {
                let pool = node.document().name_pool();
                pool.uri(*name).is_empty() && pool.local_name(*name) == *prefix
            }
            _ => node.name_id() == Some(*name),
        },
        NodeTest::Namespace(uri) => node.namespace_uri() == uri.as_ref(),
        NodeTest::QName(qname) => node.display_name() == *qname,
        NodeTest::PrefixWildcard(prefix) => node
            .name()
            .is_some_and(|name| name.prefix.as_ref() == prefix.as_str()),
    }
}

fn matches_type_test(node: &Node, test: &NodeTypeTest) -> bool {
    match test {
        NodeTypeTest::Node => true,
        NodeTypeTest::Text => node.node_type() == NodeType::Text,
        NodeTypeTest::Comment => node.node_type() == NodeType::Comment,
        NodeTypeTest::ProcessingInstruction(target) => {
            node.node_type() == NodeType::ProcessingInstruction
                && target
                    .as_ref()
                    .is_none_or(|target| node.local_name() == *target)
        }
    }
}
