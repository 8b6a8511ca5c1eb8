//! Handlers for instructions that create result nodes: literal result elements,
//! `xsl:element`, `xsl:attribute`, `xsl:text`, `xsl:value-of`, `xsl:copy` and friends.

use crate::ast::{AttributeValueTemplate, Instruction};
use crate::compiler::{BodyKind, CompilerBuilder, WEFT_NAMESPACE, XSLT_NAMESPACE};
use crate::error::XsltError;
use weft_tree::{Atom, Name, NameId, Node, NodeType};

impl CompilerBuilder {
    pub(crate) fn compile_literal_element(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let name = node.name().ok_or_else(|| {
            XsltError::structure("literal result element has no name", node.line_number())
        })?;
        let mut excluded = self.declared_prefixes(node, "exclude-result-prefixes");
        excluded.extend(self.declared_prefixes(node, "extension-element-prefixes"));
        let mut namespaces: Vec<(Atom, Atom)> = Vec::new();
        for (prefix, uri) in node.in_scope_namespaces() {
            if uri.as_ref() == XSLT_NAMESPACE
                || uri.as_ref() == WEFT_NAMESPACE
                || prefix.as_ref() == "xml"
                || excluded.contains(&prefix)
            {
                continue;
            }
            let declaration = match self.namespace_aliases.get(&uri) {
                Some(alias) => alias.clone(),
                None => (prefix, uri),
            };
            if !namespaces.iter().any(|(p, _)| *p == declaration.0) {
                namespaces.push(declaration);
            }
        }
        let mut attributes = Vec::new();
        for attribute in node.attributes() {
            let Some(attr_name) = attribute.name() else {
                continue;
            };
            if attr_name.uri.as_ref() == XSLT_NAMESPACE || attr_name.uri.as_ref() == WEFT_NAMESPACE {
                continue;
            }
            let value = self.avt(node, &attribute.string_value())?;
            attributes.push((self.aliased(attr_name), value));
        }
        let attribute_sets =
            self.use_attribute_sets(node, node.attribute_value(self.xsl_name("use-attribute-sets")))?;
        let body = self.compile_body(node, BodyKind::Plain)?;
        Ok(Instruction::LiteralElement {
            name: self.aliased(name),
            namespaces,
            attribute_sets,
            attributes,
            body,
        })
    }

    /// Applies `xsl:namespace-alias` to a literal result name.
    fn aliased(&self, mut name: Name) -> Name {
        if let Some((prefix, uri)) = self.namespace_aliases.get(&name.uri) {
            name.prefix = prefix.clone();
            name.uri = uri.clone();
        }
        name
    }

    /// Prefixes listed in attribute `local` on the stylesheet element, or in its
    /// `xsl:`-qualified form on an enclosing literal result element.
    fn declared_prefixes(&self, node: &Node, local: &str) -> Vec<Atom> {
        let on_literal = self.xsl_name(local);
        let mut prefixes = Vec::new();
        for element in std::iter::once(node.clone()).chain(node.ancestors()) {
            let list = if self.is_xsl(&element, "stylesheet") || self.is_xsl(&element, "transform") {
                self.attr(&element, local)
            } else {
                element.attribute_value(on_literal)
            };
            for token in list.iter().flat_map(|l| l.split_whitespace()) {
                let prefix = if token == "#default" { "" } else { token };
                prefixes.push(Atom::from(prefix));
            }
        }
        prefixes
    }

    /// True for elements in the `weft:` namespace or in a namespace designated by
    /// `extension-element-prefixes`.
    pub(crate) fn is_extension_element(&self, node: &Node) -> bool {
        let uri = node.namespace_uri();
        if uri == WEFT_NAMESPACE {
            return true;
        }
        if uri.is_empty() || uri == XSLT_NAMESPACE {
            return false;
        }
        let scope = node.in_scope_namespaces();
        self.declared_prefixes(node, "extension-element-prefixes")
            .iter()
            .any(|prefix| scope.iter().any(|(p, u)| p == prefix && u.as_ref() == uri))
    }

    /// An extension instruction this processor does not implement.
    pub(crate) fn compile_fallback(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let mut fallback: Option<Vec<Instruction>> = None;
        for child in node.children() {
            if self.is_xsl(&child, "fallback") {
                let body = self.compile_body(&child, BodyKind::Plain)?;
                fallback.get_or_insert_with(Vec::new).extend(body);
            }
        }
        if fallback.is_none() {
            log::debug!(
                "extension instruction {} at line {} has no xsl:fallback",
                node.display_name(),
                node.line_number()
            );
        }
        Ok(Instruction::Extension {
            name: node.display_name(),
            fallback,
            line: node.line_number(),
        })
    }

    /// Resolves a `use-attribute-sets` list. Every set named must be declared.
    pub(crate) fn use_attribute_sets(
        &self,
        node: &Node,
        list: Option<String>,
    ) -> Result<Vec<NameId>, XsltError> {
        let mut names = Vec::new();
        for token in list.iter().flat_map(|l| l.split_whitespace()) {
            let name = self.qname(node, token)?;
            if !self.attribute_sets.contains_key(&name) {
                return Err(XsltError::unresolved(
                    format!("attribute set '{}' is not declared", token),
                    crate::error::Location::line(node.line_number()),
                ));
            }
            names.push(name);
        }
        Ok(names)
    }

    pub(crate) fn compile_element(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let name = self.avt(node, &self.required_attr(node, "name")?)?;
        let namespace = match self.attr(node, "namespace") {
            Some(text) => Some(self.avt(node, &text)?),
            None => None,
        };
        let attribute_sets = self.use_attribute_sets(node, self.attr(node, "use-attribute-sets"))?;
        let body = self.compile_body(node, BodyKind::Plain)?;
        Ok(Instruction::Element {
            name,
            namespace,
            namespaces: node.in_scope_namespaces(),
            attribute_sets,
            body,
            line: node.line_number(),
        })
    }

    pub(crate) fn compile_attribute(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let name = self.avt(node, &self.required_attr(node, "name")?)?;
        if let AttributeValueTemplate::Static(text) = &name {
            if text.trim() == "xmlns" {
                return Err(XsltError::structure(
                    "xsl:attribute cannot create a namespace declaration",
                    node.line_number(),
                ));
            }
        }
        let namespace = match self.attr(node, "namespace") {
            Some(text) => Some(self.avt(node, &text)?),
            None => None,
        };
        let body = self.compile_body(node, BodyKind::Plain)?;
        Ok(Instruction::Attribute {
            name,
            namespace,
            namespaces: node.in_scope_namespaces(),
            body,
            line: node.line_number(),
        })
    }

    pub(crate) fn compile_comment(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let body = self.compile_body(node, BodyKind::Plain)?;
        Ok(Instruction::Comment { body })
    }

    pub(crate) fn compile_processing_instruction(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let name = self.avt(node, &self.required_attr(node, "name")?)?;
        let body = self.compile_body(node, BodyKind::Plain)?;
        Ok(Instruction::ProcessingInstruction {
            name,
            body,
            line: node.line_number(),
        })
    }

    /// `xsl:text` keeps its content verbatim, whitespace included.
    pub(crate) fn compile_text(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        if let Some(child) = node.children().find(|c| c.node_type() != NodeType::Text) {
            return Err(XsltError::structure(
                "xsl:text may only contain text",
                child.line_number(),
            ));
        }
        Ok(Instruction::Text {
            text: node.string_value(),
            disable_escaping: self.yes_no(node, "disable-output-escaping")?,
        })
    }

    pub(crate) fn compile_value_of(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let select = self.expression(node, &self.required_attr(node, "select")?)?;
        Ok(Instruction::ValueOf {
            select,
            disable_escaping: self.yes_no(node, "disable-output-escaping")?,
        })
    }

    pub(crate) fn compile_copy(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let attribute_sets = self.use_attribute_sets(node, self.attr(node, "use-attribute-sets"))?;
        let body = self.compile_body(node, BodyKind::Plain)?;
        Ok(Instruction::Copy { attribute_sets, body })
    }

    pub(crate) fn compile_copy_of(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let select = self.expression(node, &self.required_attr(node, "select")?)?;
        Ok(Instruction::CopyOf { select })
    }
}

/// Splits a computed lexical QName into prefix and local part.
pub(crate) fn split_qname(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    let (prefix, local) = text.split_once(':').unwrap_or(("", text));
    let valid = |s: &str| {
        let mut chars = s.chars();
        chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    };
    (valid(local) && (prefix.is_empty() || valid(prefix))).then_some((prefix, local))
}

/// Builds a result name for `xsl:element` or `xsl:attribute` from the computed name, an
/// optional computed namespace and the namespaces in scope at the instruction.
pub(crate) fn computed_name(
    text: &str,
    namespace: Option<&str>,
    in_scope: &[(Atom, Atom)],
    use_default: bool,
) -> Option<Name> {
    let (prefix, local) = split_qname(text)?;
    let uri = match namespace {
        Some(uri) => uri.to_string(),
        None if prefix == "xml" => weft_tree::XML_NAMESPACE.to_string(),
        None if prefix.is_empty() && !use_default => String::new(),
        None => in_scope
            .iter()
            .rev()
            .find(|(p, _)| p.as_ref() == prefix)
            .map(|(_, uri)| uri.to_string())
            .or_else(|| prefix.is_empty().then(String::new))?,
    };
    Some(Name::new(&uri, prefix, local))
}
