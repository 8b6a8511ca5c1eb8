//! Handlers for `<xsl:if>`, `<xsl:choose>`, `<xsl:for-each>` and `<xsl:message>`.

use crate::ast::{Instruction, When};
use crate::compiler::{BodyKind, CompilerBuilder};
use crate::error::XsltError;
use weft_tree::{Node, NodeType};

impl CompilerBuilder {
    pub(crate) fn compile_if(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let test = self.expression(node, &self.required_attr(node, "test")?)?;
        let body = self.compile_body(node, BodyKind::Plain)?;
        Ok(Instruction::If { test, body })
    }

    pub(crate) fn compile_choose(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let mut whens = Vec::new();
        let mut otherwise = None;
        for child in node.children() {
            match child.node_type() {
                NodeType::Element if self.is_xsl(&child, "when") => {
                    if otherwise.is_some() {
                        return Err(XsltError::structure(
                            "xsl:when cannot follow xsl:otherwise",
                            child.line_number(),
                        ));
                    }
                    let test = self.expression(&child, &self.required_attr(&child, "test")?)?;
                    let body = self.compile_body(&child, BodyKind::Plain)?;
                    whens.push(When { test, body });
                }
                NodeType::Element if self.is_xsl(&child, "otherwise") => {
                    if otherwise.is_some() {
                        return Err(XsltError::structure(
                            "xsl:choose has more than one xsl:otherwise",
                            child.line_number(),
                        ));
                    }
                    otherwise = Some(self.compile_body(&child, BodyKind::Plain)?);
                }
                NodeType::Text if child.is_whitespace_text() => {}
                NodeType::Comment | NodeType::ProcessingInstruction => {}
                _ => {
                    return Err(XsltError::structure(
                        "xsl:choose may only contain xsl:when and xsl:otherwise",
                        child.line_number(),
                    ));
                }
            }
        }
        if whens.is_empty() {
            return Err(XsltError::structure(
                "xsl:choose needs at least one xsl:when",
                node.line_number(),
            ));
        }
        Ok(Instruction::Choose { whens, otherwise })
    }

    pub(crate) fn compile_for_each(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let select = self.expression(node, &self.required_attr(node, "select")?)?;
        let sorts = self.compile_leading_sorts(node)?;
        let body = self.compile_body(node, BodyKind::ForEach)?;
        Ok(Instruction::ForEach {
            select,
            sorts,
            body,
            line: node.line_number(),
        })
    }

    pub(crate) fn compile_message(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let terminate = self.yes_no(node, "terminate")?;
        let body = self.compile_body(node, BodyKind::Plain)?;
        Ok(Instruction::Message {
            body,
            terminate,
            line: node.line_number(),
        })
    }
}
