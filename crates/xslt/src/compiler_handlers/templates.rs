//! Handlers for `xsl:apply-templates`, `xsl:call-template`, `xsl:sort` and
//! `xsl:with-param`.

use crate::ast::{CaseOrder, Instruction, SortDataType, SortKey, SortOrder, WithParam};
use crate::compiler::CompilerBuilder;
use crate::error::{Location, XsltError};
use weft_tree::{Node, NodeType};

impl CompilerBuilder {
    pub(crate) fn compile_apply_templates(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let select = match self.attr(node, "select") {
            Some(text) => Some(self.expression(node, &text)?),
            None => None,
        };
        let mode = match self.attr(node, "mode") {
            Some(text) => Some(self.qname(node, &text)?),
            None => None,
        };
        let mut sorts = Vec::new();
        let mut params = Vec::new();
        for child in node.children() {
            match child.node_type() {
                NodeType::Element if self.is_xsl(&child, "sort") => sorts.push(self.compile_sort(&child)?),
                NodeType::Element if self.is_xsl(&child, "with-param") => {
                    params.push(self.compile_with_param(&child)?)
                }
                NodeType::Text if child.is_whitespace_text() => {}
                NodeType::Comment | NodeType::ProcessingInstruction => {}
                _ => {
                    return Err(XsltError::structure(
                        "xsl:apply-templates may only contain xsl:sort and xsl:with-param",
                        child.line_number(),
                    ));
                }
            }
        }
        Ok(Instruction::ApplyTemplates {
            select,
            mode,
            sorts,
            params,
            line: node.line_number(),
        })
    }

    pub(crate) fn compile_call_template(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let name_text = self.required_attr(node, "name")?;
        let name = self.qname(node, &name_text)?;
        let template = *self.named_templates.get(&name).ok_or_else(|| {
            XsltError::unresolved(
                format!("no template named '{}'", name_text),
                Location::line(node.line_number()),
            )
        })?;
        let mut params = Vec::new();
        for child in node.children() {
            match child.node_type() {
                NodeType::Element if self.is_xsl(&child, "with-param") => {
                    params.push(self.compile_with_param(&child)?)
                }
                NodeType::Text if child.is_whitespace_text() => {}
                NodeType::Comment | NodeType::ProcessingInstruction => {}
                _ => {
                    return Err(XsltError::structure(
                        "xsl:call-template may only contain xsl:with-param",
                        child.line_number(),
                    ));
                }
            }
        }
        Ok(Instruction::CallTemplate { template, params })
    }

    pub(crate) fn compile_sort(&mut self, node: &Node) -> Result<SortKey, XsltError> {
        let select = self.expression(node, self.attr(node, "select").as_deref().unwrap_or("."))?;
        let order = match self.attr(node, "order").as_deref().map(str::trim) {
            None | Some("ascending") => SortOrder::Ascending,
            Some("descending") => SortOrder::Descending,
            Some(other) => {
                return Err(XsltError::structure(
                    format!("invalid sort order '{}'", other),
                    node.line_number(),
                ));
            }
        };
        let data_type = match self.attr(node, "data-type").as_deref().map(str::trim) {
            None | Some("text") => SortDataType::Text,
            Some("number") => SortDataType::Number,
            Some(other) => {
                return Err(XsltError::structure(
                    format!("invalid sort data-type '{}'", other),
                    node.line_number(),
                ));
            }
        };
        let case_order = match self.attr(node, "case-order").as_deref().map(str::trim) {
            None => None,
            Some("upper-first") => Some(CaseOrder::UpperFirst),
            Some("lower-first") => Some(CaseOrder::LowerFirst),
            Some(other) => {
                return Err(XsltError::structure(
                    format!("invalid sort case-order '{}'", other),
                    node.line_number(),
                ));
            }
        };
        Ok(SortKey {
            select,
            order,
            data_type,
            case_order,
            lang: self.attr(node, "lang"),
        })
    }

    /// The leading `xsl:sort` children of `node`.
    pub(crate) fn compile_leading_sorts(&mut self, node: &Node) -> Result<Vec<SortKey>, XsltError> {
        let mut sorts = Vec::new();
        for child in node.children() {
            match child.node_type() {
                NodeType::Element if self.is_xsl(&child, "sort") => sorts.push(self.compile_sort(&child)?),
                NodeType::Element => break,
                NodeType::Text if !child.is_whitespace_text() => break,
                _ => {}
            }
        }
        Ok(sorts)
    }

    pub(crate) fn compile_with_param(&mut self, node: &Node) -> Result<WithParam, XsltError> {
        let name = self.qname(node, &self.required_attr(node, "name")?)?;
        let value = self.variable_value(node)?;
        Ok(WithParam { name, value })
    }
}
