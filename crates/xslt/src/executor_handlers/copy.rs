//! `xsl:copy` and `xsl:copy-of`.

use crate::ast::Instruction;
use crate::context::Context;
use crate::controller::Controller;
use crate::error::XsltError;
use weft_tree::{Atom, NameId, Node, NodeType};
use weft_xpath::{Expression, XPathValue};

/// Copies the current node without its children or attributes. For an element or the
/// document node `body` supplies the content; for other nodes it is not instantiated.
/// Attribute sets apply to a copied element only.
pub(crate) fn handle_copy(
    controller: &mut Controller,
    attribute_sets: &[NameId],
    body: &[Instruction],
    context: &Context,
) -> Result<(), XsltError> {
    let node = &context.current_node;
    match node.node_type() {
        NodeType::Document => controller.execute_body(body, context),
        NodeType::Element => {
            let Some(name) = node.name() else {
                return controller.execute_body(body, context);
            };
            controller
                .output()?
                .start_element(name, &copied_namespaces(node))?;
            controller.apply_attribute_sets(attribute_sets, context)?;
            controller.execute_body(body, context)?;
            controller.output()?.end_element()
        }
        _ => copy_node(controller, node),
    }
}

pub(crate) fn handle_copy_of(
    controller: &mut Controller,
    select: &Expression,
    context: &Context,
) -> Result<(), XsltError> {
    match controller.evaluate_expression(select, context)? {
        XPathValue::NodeSet(nodes) => {
            for node in &nodes {
                copy_node(controller, node)?;
            }
            Ok(())
        }
        other => controller.output()?.characters(&other.to_string(), false),
    }
}

fn copied_namespaces(element: &Node) -> Vec<(Atom, Atom)> {
    element
        .in_scope_namespaces()
        .into_iter()
        .filter(|(prefix, _)| prefix.as_ref() != "xml")
        .collect()
}

/// Deep copy of `node`. A document node contributes its children.
fn copy_node(controller: &mut Controller, node: &Node) -> Result<(), XsltError> {
    match node.node_type() {
        NodeType::Document => {
            for child in node.children() {
                copy_node(controller, &child)?;
            }
            Ok(())
        }
        NodeType::Element => {
            let Some(name) = node.name() else {
                return Ok(());
            };
            controller
                .output()?
                .start_element(name, &copied_namespaces(node))?;
            for attribute in node.attributes() {
                copy_node(controller, &attribute)?;
            }
            for child in node.children() {
                copy_node(controller, &child)?;
            }
            controller.output()?.end_element()
        }
        NodeType::Attribute => {
            let Some(name) = node.name() else {
                return Ok(());
            };
            let result = controller.output()?.attribute(name, node.string_value());
            controller.recover(result)
        }
        NodeType::Namespace => {
            let prefix = Atom::from(node.local_name().as_str());
            let uri = Atom::from(node.string_value().as_str());
            let result = controller.output()?.namespace(prefix, uri);
            controller.recover(result)
        }
        NodeType::Text => controller.output()?.characters(&node.string_value(), false),
        NodeType::Comment => controller.output()?.comment(&node.string_value()),
        NodeType::ProcessingInstruction => controller
            .output()?
            .processing_instruction(&node.local_name(), &node.string_value()),
        NodeType::Node => Ok(()),
    }
}
