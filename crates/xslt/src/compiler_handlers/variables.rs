//! Handlers for `<xsl:variable>`, `<xsl:param>` and `<weft:assign>`.

use crate::ast::{Instruction, VariableValue};
use crate::compiler::{BodyKind, CompilerBuilder, WEFT_NAMESPACE};
use crate::error::{Location, XsltError};
use weft_tree::{Node, NodeType};

impl CompilerBuilder {
    /// The value of a variable-binding element: its `select`, its content, or neither.
    pub(crate) fn variable_value(&mut self, node: &Node) -> Result<VariableValue, XsltError> {
        let has_content = node.children().any(|child| match child.node_type() {
            NodeType::Text => !child.is_whitespace_text(),
            NodeType::Element => true,
            _ => false,
        });
        match self.attr(node, "select") {
            Some(_) if has_content => Err(XsltError::structure(
                format!("<{}> has both a select attribute and content", node.display_name()),
                node.line_number(),
            )),
            Some(text) => Ok(VariableValue::Select(self.expression(node, &text)?)),
            None if has_content => Ok(VariableValue::Content(self.compile_body(node, BodyKind::Plain)?)),
            None => Ok(VariableValue::Empty),
        }
    }

    fn is_assignable(&self, node: &Node) -> bool {
        node.attribute_value(self.pool.intern(WEFT_NAMESPACE, "assignable"))
            .is_some_and(|v| v == "yes")
    }

    /// The variable comes into scope after its own value.
    pub(crate) fn compile_local_variable(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let name = self.qname(node, &self.required_attr(node, "name")?)?;
        let value = self.variable_value(node)?;
        let binding = self.declare_local(name, self.is_assignable(node));
        Ok(Instruction::Variable { binding, value })
    }

    pub(crate) fn compile_param(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let name = self.qname(node, &self.required_attr(node, "name")?)?;
        let value = self.variable_value(node)?;
        let binding = self.declare_local(name, self.is_assignable(node));
        Ok(Instruction::Param {
            binding,
            name,
            value,
        })
    }

    pub(crate) fn compile_assign(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let name_text = self.required_attr(node, "name")?;
        let name = self.qname(node, &name_text)?;
        let binding = self.lookup_variable(name).ok_or_else(|| {
            XsltError::unresolved(
                format!("variable ${} is not declared", name_text),
                Location::line(node.line_number()),
            )
        })?;
        if !binding.assignable {
            return Err(XsltError::structure(
                format!(
                    "variable ${} is not declared with weft:assignable=\"yes\"",
                    name_text
                ),
                node.line_number(),
            ));
        }
        let value = self.variable_value(node)?;
        Ok(Instruction::Assign { binding, value })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Instruction, VariableValue};
    use crate::compiler::CompilerBuilder;
    use crate::error::XsltError;
    use crate::resolver::MapResolver;
    use std::sync::Arc;
    use weft_tree::{NamePool, parse_document};

    fn body(text: &str) -> Result<Vec<Instruction>, XsltError> {
        let pool = NamePool::new();
        let sheet = format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:weft="urn:weft">
                 <xsl:variable name="g" weft:assignable="yes" select="0"/>
                 <xsl:template match="/">{}</xsl:template>
               </xsl:stylesheet>"#,
            text
        );
        let doc = parse_document(&sheet, &pool)?;
        let mut compiled = CompilerBuilder::new(pool, Arc::new(MapResolver::new())).compile(&doc, None)?;
        Ok(std::mem::take(&mut compiled.templates[0].body))
    }

    #[test]
    fn test_value_forms() {
        let instructions = body(
            r#"<xsl:variable name="a" select="1"/><xsl:variable name="b"><x/></xsl:variable><xsl:variable name="c"/>"#,
        )
        .unwrap();
        let values: Vec<&VariableValue> = instructions
            .iter()
            .map(|i| match i {
                Instruction::Variable { value, .. } => value,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert!(matches!(values[0], VariableValue::Select(_)));
        assert!(matches!(values[1], VariableValue::Content(c) if c.len() == 1));
        assert!(matches!(values[2], VariableValue::Empty));
    }

    #[test]
    fn test_select_and_content_conflict() {
        assert!(matches!(
            body(r#"<xsl:variable name="a" select="1">text</xsl:variable>"#),
            Err(XsltError::Structure { .. })
        ));
    }

    #[test]
    fn test_variable_is_not_in_scope_in_its_own_value() {
        assert!(matches!(
            body(r#"<xsl:variable name="a" select="$a"/>"#),
            Err(XsltError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_assignment_targets() {
        let instructions = body(
            r#"<xsl:variable name="n" weft:assignable="yes" select="1"/>
               <weft:assign name="n" select="$n + 1"/>
               <weft:assign name="g" select="5"/>"#,
        )
        .unwrap();
        assert!(matches!(&instructions[1], Instruction::Assign { binding, .. } if !binding.is_global()));
        assert!(matches!(&instructions[2], Instruction::Assign { binding, .. } if binding.is_global()));

        assert!(matches!(
            body(r#"<xsl:variable name="fixed" select="1"/><weft:assign name="fixed" select="2"/>"#),
            Err(XsltError::Structure { .. })
        ));
    }
}
