//! Compiles a stylesheet tree into a [`CompiledStylesheet`].
//!
//! Compilation runs in two passes over the stylesheet modules, in ascending import
//! precedence. The first pass declares everything that can be referenced before it is
//! defined: global variables and named templates. The second pass compiles template
//! rules, keys and the other declarations; global values and every instruction body
//! follow once all declarations are known.

use crate::ast::{
    AttributeSet, AttributeValueTemplate, CompiledStylesheet, GlobalVariable, Instruction, Template,
};
use crate::config::OutputProperties;
use crate::decimal_format::DecimalFormats;
use crate::error::{Location, XsltError};
use crate::functions;
use crate::key_manager::KeyManager;
use crate::resolver::DocumentResolver;
use crate::rule_manager::RuleManager;
use std::collections::HashMap;
use std::sync::Arc;
use weft_tree::{Atom, Document, NameId, NamePool, Node, NodeType, SpaceRules};
use weft_xpath::{Binding, Expression, StaticContext, XPathError, compile};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
/// Namespace of the `weft:` extension instructions and attributes.
pub const WEFT_NAMESPACE: &str = "urn:weft";

/// One stylesheet module after import and include resolution.
pub(crate) struct Module {
    pub(crate) element: Node,
    /// Top-level elements, with included modules spliced in place.
    pub(crate) declarations: Vec<Node>,
    pub(crate) precedence: i32,
    pub(crate) min_import_precedence: i32,
    pub(crate) simplified: bool,
}

/// What may appear in a sequence of instructions besides the instructions themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyKind {
    /// A template body: may start with `xsl:param`.
    Template,
    /// A `for-each` body: may start with `xsl:sort`.
    ForEach,
    Plain,
}

pub struct CompilerBuilder {
    pub(crate) pool: Arc<NamePool>,
    pub(crate) resolver: Arc<dyn DocumentResolver>,
    /// URIs of the modules currently being loaded, outermost first.
    pub(crate) loading: Vec<String>,
    pub(crate) modules: Vec<Module>,
    pub(crate) next_precedence: i32,
    pub(crate) templates: Vec<Template>,
    pub(crate) pending_templates: Vec<(usize, Node)>,
    pub(crate) rules: RuleManager<usize>,
    pub(crate) named_templates: HashMap<NameId, usize>,
    pub(crate) globals: Vec<GlobalVariable>,
    pub(crate) global_bindings: HashMap<NameId, Binding>,
    pub(crate) pending_globals: Vec<(usize, Node)>,
    pub(crate) keys: KeyManager,
    pub(crate) attribute_sets: HashMap<NameId, Vec<AttributeSet>>,
    pub(crate) decimal_formats: DecimalFormats,
    /// Literal result namespace URI to the `(prefix, uri)` used in the result instead.
    pub(crate) namespace_aliases: HashMap<Atom, (Atom, Atom)>,
    pub(crate) output: OutputProperties,
    pub(crate) space_rules: SpaceRules,
    pub(crate) locals: Vec<(NameId, Binding)>,
    pub(crate) next_local_slot: usize,
    pub(crate) max_local_slots: usize,
    pub(crate) number: u64,
    pub(crate) namespaces: Vec<(Atom, Atom)>,
    pub(crate) base_uri: Option<String>,
}

/// The static context of one expression: the namespaces in scope at its element, the
/// global variables and the local variables visible at that point.
struct Scope<'a> {
    pool: &'a NamePool,
    namespaces: Vec<(Atom, Atom)>,
    globals: &'a HashMap<NameId, Binding>,
    locals: &'a [(NameId, Binding)],
}

impl StaticContext for Scope<'_> {
    fn name_pool(&self) -> &NamePool {
        self.pool
    }

    fn resolve_prefix(&self, prefix: &str) -> Option<String> {
        self.namespaces
            .iter()
            .rev()
            .find(|(p, _)| p.as_ref() == prefix)
            .map(|(_, uri)| uri.to_string())
    }

    fn bind_variable(&self, name: NameId) -> Option<Binding> {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, binding)| *binding)
            .or_else(|| self.globals.get(&name).copied())
    }

    fn is_host_function(&self, name: &str) -> bool {
        functions::is_xslt_function(name)
    }
}

impl CompilerBuilder {
    pub fn new(pool: Arc<NamePool>, resolver: Arc<dyn DocumentResolver>) -> Self {
        let number = pool.allocate_sequence();
        Self {
            pool,
            resolver,
            loading: Vec::new(),
            modules: Vec::new(),
            next_precedence: 0,
            templates: Vec::new(),
            pending_templates: Vec::new(),
            rules: RuleManager::new(),
            named_templates: HashMap::new(),
            globals: Vec::new(),
            global_bindings: HashMap::new(),
            pending_globals: Vec::new(),
            keys: KeyManager::new(number),
            attribute_sets: HashMap::new(),
            decimal_formats: DecimalFormats::new(),
            namespace_aliases: HashMap::new(),
            output: OutputProperties::default(),
            space_rules: SpaceRules::new(),
            locals: Vec::new(),
            next_local_slot: 0,
            max_local_slots: 0,
            number,
            namespaces: Vec::new(),
            base_uri: None,
        }
    }

    /// Compiles the stylesheet whose principal module is `document`.
    pub fn compile(
        mut self,
        document: &Arc<Document>,
        base_uri: Option<&str>,
    ) -> Result<CompiledStylesheet, XsltError> {
        let element = document
            .document_element()
            .ok_or_else(|| XsltError::structure("stylesheet has no document element", 0))?;
        if let Some(uri) = base_uri {
            self.loading.push(uri.to_string());
        }
        self.namespaces = element.in_scope_namespaces();
        self.base_uri = base_uri.map(str::to_string);
        self.load_module(element, base_uri.map(str::to_string), 0)?;
        log::debug!("loaded {} stylesheet module(s)", self.modules.len());

        let modules = std::mem::take(&mut self.modules);
        for module in &modules {
            for declaration in &module.declarations {
                self.declare(declaration, module)?;
            }
        }
        for module in &modules {
            if module.simplified {
                self.compile_simplified(module)?;
                continue;
            }
            for declaration in &module.declarations {
                self.define(declaration, module)?;
            }
        }
        self.check_attribute_sets()?;
        self.compile_global_values()?;
        self.compile_template_bodies()?;
        self.finish()
    }

    fn finish(self) -> Result<CompiledStylesheet, XsltError> {
        log::debug!(
            "compiled {} templates, {} globals, frame width {}",
            self.templates.len(),
            self.globals.len(),
            self.max_local_slots
        );
        Ok(CompiledStylesheet {
            pool: self.pool,
            number: self.number,
            templates: self.templates,
            rules: self.rules,
            named_templates: self.named_templates,
            globals: self.globals,
            keys: self.keys,
            attribute_sets: self.attribute_sets,
            decimal_formats: self.decimal_formats,
            output: self.output,
            space_rules: self.space_rules,
            max_local_slots: self.max_local_slots,
            namespaces: self.namespaces,
            base_uri: self.base_uri,
        })
    }

    fn compile_global_values(&mut self) -> Result<(), XsltError> {
        for (slot, node) in std::mem::take(&mut self.pending_globals) {
            self.begin_frame();
            let value = self.variable_value(&node)?;
            self.end_frame();
            self.globals[slot].value = value;
        }
        Ok(())
    }

    fn compile_template_bodies(&mut self) -> Result<(), XsltError> {
        for (index, node) in std::mem::take(&mut self.pending_templates) {
            self.begin_frame();
            let body = self.compile_body(&node, BodyKind::Template)?;
            self.end_frame();
            self.templates[index].body = body;
        }
        Ok(())
    }

    /// Starts numbering local slots for a new template or global body.
    pub(crate) fn begin_frame(&mut self) {
        self.locals.clear();
        self.next_local_slot = 0;
    }

    pub(crate) fn end_frame(&mut self) {
        self.max_local_slots = self.max_local_slots.max(self.next_local_slot);
        self.locals.clear();
    }

    pub(crate) fn declare_local(&mut self, name: NameId, assignable: bool) -> Binding {
        let mut binding = Binding::local(name, self.next_local_slot);
        if assignable {
            binding = binding.assignable();
        }
        self.next_local_slot += 1;
        self.locals.push((name, binding));
        binding
    }

    pub(crate) fn lookup_variable(&self, name: NameId) -> Option<Binding> {
        self.scope_at(None).bind_variable(name)
    }

    fn scope_at(&self, node: Option<&Node>) -> Scope<'_> {
        Scope {
            pool: &self.pool,
            namespaces: node.map(Node::in_scope_namespaces).unwrap_or_default(),
            globals: &self.global_bindings,
            locals: &self.locals,
        }
    }

    /// Compiles `text` as an expression in the scope of `node`.
    pub(crate) fn expression(&self, node: &Node, text: &str) -> Result<Expression, XsltError> {
        compile(text, &self.scope_at(Some(node))).map_err(|err| xpath_error(err, node))
    }

    pub(crate) fn pattern(&self, node: &Node, text: &str) -> Result<crate::pattern::Pattern, XsltError> {
        crate::pattern::Pattern::parse(text, &self.scope_at(Some(node))).map_err(|err| match err {
            XsltError::XPath(inner) => xpath_error(inner, node),
            other => other,
        })
    }

    /// Resolves a lexical QName using the namespaces in scope at `node`. Unprefixed
    /// names are in no namespace.
    pub(crate) fn qname(&self, node: &Node, text: &str) -> Result<NameId, XsltError> {
        weft_xpath::bind::resolve_qname(text.trim(), &self.scope_at(Some(node)))
            .map_err(|err| xpath_error(err, node))
    }

    pub(crate) fn xsl_name(&self, local: &str) -> NameId {
        self.pool.intern(XSLT_NAMESPACE, local)
    }

    /// The local name of `node` if it is an element in the XSLT namespace.
    pub(crate) fn xsl_local(&self, node: &Node) -> Option<String> {
        (node.is_element() && node.namespace_uri() == XSLT_NAMESPACE).then(|| node.local_name())
    }

    pub(crate) fn is_xsl(&self, node: &Node, local: &str) -> bool {
        node.is_element() && node.name_id() == Some(self.xsl_name(local))
    }

    /// An attribute in no namespace.
    pub(crate) fn attr(&self, node: &Node, local: &str) -> Option<String> {
        node.attribute_value(self.pool.intern("", local))
    }

    pub(crate) fn required_attr(&self, node: &Node, local: &str) -> Result<String, XsltError> {
        self.attr(node, local).ok_or_else(|| {
            XsltError::structure(
                format!("<{}> requires attribute '{}'", node.display_name(), local),
                node.line_number(),
            )
        })
    }

    pub(crate) fn yes_no(&self, node: &Node, local: &str) -> Result<bool, XsltError> {
        match self.attr(node, local).as_deref().map(str::trim) {
            None | Some("no") => Ok(false),
            Some("yes") => Ok(true),
            Some(other) => Err(XsltError::structure(
                format!("attribute '{}' must be 'yes' or 'no', not '{}'", local, other),
                node.line_number(),
            )),
        }
    }

    /// Parses an attribute value template, with `{{` and `}}` as literal braces.
    pub(crate) fn avt(&self, node: &Node, text: &str) -> Result<AttributeValueTemplate, XsltError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(XsltError::structure(
                        format!("unmatched '}}' in attribute value template '{}'", text),
                        node.line_number(),
                    ));
                }
                '{' => {
                    let mut expr = String::new();
                    let mut quote = None;
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match (quote, c) {
                            (None, '}') => {
                                closed = true;
                                break;
                            }
                            (None, '"' | '\'') => quote = Some(c),
                            (Some(q), _) if q == c => quote = None,
                            _ => {}
                        }
                        expr.push(c);
                    }
                    if !closed {
                        return Err(XsltError::structure(
                            format!("unterminated expression in attribute value template '{}'", text),
                            node.line_number(),
                        ));
                    }
                    if !literal.is_empty() {
                        parts.push(crate::ast::AvtPart::Static(std::mem::take(&mut literal)));
                    }
                    parts.push(crate::ast::AvtPart::Dynamic(self.expression(node, &expr)?));
                }
                other => literal.push(other),
            }
        }
        if parts.is_empty() {
            return Ok(AttributeValueTemplate::Static(literal));
        }
        if !literal.is_empty() {
            parts.push(crate::ast::AvtPart::Static(literal));
        }
        Ok(AttributeValueTemplate::Dynamic(parts))
    }

    /// Compiles the children of `parent` as a sequence of instructions. Variables
    /// declared in the sequence go out of scope at its end.
    pub(crate) fn compile_body(
        &mut self,
        parent: &Node,
        kind: BodyKind,
    ) -> Result<Vec<Instruction>, XsltError> {
        let mark = self.locals.len();
        let preserve = preserves_space(parent, &self.pool);
        let mut body = Vec::new();
        let mut leading = true;
        for child in parent.children() {
            match child.node_type() {
                NodeType::Text => {
                    if child.is_whitespace_text() && !preserve {
                        continue;
                    }
                    leading = false;
                    body.push(Instruction::Text {
                        text: child.string_value(),
                        disable_escaping: false,
                    });
                }
                NodeType::Element => {
                    if self.is_xsl(&child, "param") {
                        if kind != BodyKind::Template || !leading {
                            return Err(XsltError::structure(
                                "xsl:param must come first in a template",
                                child.line_number(),
                            ));
                        }
                        body.push(self.compile_param(&child)?);
                        continue;
                    }
                    if self.is_xsl(&child, "sort") {
                        if kind != BodyKind::ForEach || !leading {
                            return Err(XsltError::structure(
                                "xsl:sort is only allowed first in xsl:for-each or in xsl:apply-templates",
                                child.line_number(),
                            ));
                        }
                        continue;
                    }
                    // Only an unimplemented extension instruction runs its fallback.
                    if self.is_xsl(&child, "fallback") {
                        continue;
                    }
                    leading = false;
                    body.push(self.compile_instruction(&child)?);
                }
                _ => {}
            }
        }
        self.locals.truncate(mark);
        Ok(body)
    }

    fn compile_instruction(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        if node.namespace_uri() == WEFT_NAMESPACE && node.local_name() == "assign" {
            return self.compile_assign(node);
        }
        if self.is_extension_element(node) {
            return self.compile_fallback(node);
        }
        let Some(local) = self.xsl_local(node) else {
            return self.compile_literal_element(node);
        };
        match local.as_str() {
            "apply-templates" => self.compile_apply_templates(node),
            "call-template" => self.compile_call_template(node),
            "apply-imports" => Ok(Instruction::ApplyImports {
                line: node.line_number(),
            }),
            "for-each" => self.compile_for_each(node),
            "if" => self.compile_if(node),
            "choose" => self.compile_choose(node),
            "value-of" => self.compile_value_of(node),
            "text" => self.compile_text(node),
            "copy" => self.compile_copy(node),
            "copy-of" => self.compile_copy_of(node),
            "element" => self.compile_element(node),
            "attribute" => self.compile_attribute(node),
            "comment" => self.compile_comment(node),
            "processing-instruction" => self.compile_processing_instruction(node),
            "variable" => self.compile_local_variable(node),
            "message" => self.compile_message(node),
            "number" => self.compile_number(node),
            "when" | "otherwise" => Err(XsltError::structure(
                format!("xsl:{} is only allowed in xsl:choose", local),
                node.line_number(),
            )),
            "with-param" => Err(XsltError::structure(
                "xsl:with-param is only allowed in xsl:apply-templates or xsl:call-template",
                node.line_number(),
            )),
            other => Err(XsltError::structure(
                format!("unknown XSLT instruction xsl:{}", other),
                node.line_number(),
            )),
        }
    }
}

fn xpath_error(err: XPathError, node: &Node) -> XsltError {
    match err {
        XPathError::UnknownVariable(name) => XsltError::unresolved(
            format!("variable ${} is not declared", name),
            Location::line(node.line_number()),
        ),
        other => XsltError::structure(other.to_string(), node.line_number()),
    }
}

/// True if `xml:space="preserve"` is in effect at `node`.
fn preserves_space(node: &Node, pool: &NamePool) -> bool {
    let xml_space = pool.intern(weft_tree::XML_NAMESPACE, "space");
    std::iter::once(node.clone())
        .chain(node.ancestors())
        .find_map(|n| n.attribute_value(xml_space))
        .is_some_and(|value| value == "preserve")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AvtPart, VariableValue};
    use crate::resolver::MapResolver;
    use weft_tree::parse_document;

    const HEAD: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">"#;

    fn compile_text(body: &str) -> Result<CompiledStylesheet, XsltError> {
        let pool = NamePool::new();
        let doc = parse_document(&format!("{}{}</xsl:stylesheet>", HEAD, body), &pool)?;
        CompilerBuilder::new(pool, Arc::new(MapResolver::new())).compile(&doc, None)
    }

    #[test]
    fn test_templates_and_rules() {
        let sheet = compile_text(
            r#"<xsl:template match="a|b" priority="2"><out/></xsl:template>
               <xsl:template name="n"><xsl:text>x</xsl:text></xsl:template>"#,
        )
        .unwrap();
        assert_eq!(sheet.templates.len(), 2);
        assert_eq!(sheet.rules.get_mode(None).unwrap().len(), 2);
        let n = sheet.pool.intern("", "n");
        assert_eq!(sheet.named_templates.get(&n), Some(&1));
        assert!(matches!(
            sheet.templates[1].body.as_slice(),
            [Instruction::Text { text, .. }] if text == "x"
        ));
    }

    #[test]
    fn test_local_slots_and_frame_width() {
        let sheet = compile_text(
            r#"<xsl:template match="/">
                 <xsl:param name="p"/>
                 <xsl:variable name="a" select="1"/>
                 <xsl:if test="$a"><xsl:variable name="b" select="$a + $p"/></xsl:if>
               </xsl:template>
               <xsl:template match="x"><xsl:variable name="only" select="2"/></xsl:template>"#,
        )
        .unwrap();
        assert_eq!(sheet.max_local_slots, 3);
        match &sheet.templates[0].body[1] {
            Instruction::Variable { binding, .. } => assert_eq!(binding.slot, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_variable_scope_ends_with_its_sequence() {
        let err = compile_text(
            r#"<xsl:template match="/">
                 <xsl:if test="1"><xsl:variable name="v" select="1"/></xsl:if>
                 <xsl:value-of select="$v"/>
               </xsl:template>"#,
        )
        .unwrap_err();
        assert!(matches!(err, XsltError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_structure_errors_carry_lines() {
        let err = compile_text("\n<xsl:template match=\"/\">\n<xsl:when test=\"1\"/></xsl:template>").unwrap_err();
        match err {
            XsltError::Structure { location, .. } => assert_eq!(location.line, Some(3)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            compile_text(r#"<xsl:template match="/"><xsl:bogus/></xsl:template>"#),
            Err(XsltError::Structure { .. })
        ));
        assert!(matches!(
            compile_text(r#"<xsl:template match="/"><a/><xsl:param name="late"/></xsl:template>"#),
            Err(XsltError::Structure { .. })
        ));
        assert!(matches!(
            compile_text(r#"<xsl:template match="/"><xsl:value-of/></xsl:template>"#),
            Err(XsltError::Structure { .. })
        ));
    }

    #[test]
    fn test_attribute_value_templates() {
        let sheet = compile_text(
            r#"<xsl:template match="/"><a href="x{{{@id}-{1+1}}}"/></xsl:template>"#,
        )
        .unwrap();
        let Instruction::LiteralElement { attributes, .. } = &sheet.templates[0].body[0] else {
            panic!("expected a literal result element");
        };
        let AttributeValueTemplate::Dynamic(parts) = &attributes[0].1 else {
            panic!("expected a dynamic template");
        };
        assert_eq!(parts.len(), 5);
        assert!(matches!(&parts[0], AvtPart::Static(s) if s == "x{"));
        assert!(matches!(&parts[4], AvtPart::Static(s) if s == "}"));
        assert!(compile_text(r#"<xsl:template match="/"><a b="}"/></xsl:template>"#).is_err());
    }

    #[test]
    fn test_global_variables_resolve_in_any_order() {
        let sheet = compile_text(
            r#"<xsl:variable name="a" select="$b"/>
               <xsl:param name="b">text</xsl:param>"#,
        )
        .unwrap();
        assert_eq!(sheet.globals.len(), 2);
        assert!(sheet.globals[1].is_param);
        assert!(matches!(sheet.globals[1].value, VariableValue::Content(_)));
    }

    #[test]
    fn test_simplified_stylesheet() {
        let pool = NamePool::new();
        let doc = parse_document(
            r#"<html xsl:version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:value-of select="/r"/></html>"#,
            &pool,
        )
        .unwrap();
        let sheet = CompilerBuilder::new(pool, Arc::new(MapResolver::new()))
            .compile(&doc, None)
            .unwrap();
        assert_eq!(sheet.templates.len(), 1);
        assert_eq!(sheet.templates[0].match_text.as_deref(), Some("/"));
        let Instruction::LiteralElement { attributes, namespaces, .. } = &sheet.templates[0].body[0] else {
            panic!("expected the document element as a literal result element");
        };
        assert!(attributes.is_empty());
        assert!(namespaces.is_empty());
    }

    #[test]
    fn test_not_a_stylesheet() {
        let pool = NamePool::new();
        let doc = parse_document("<plain/>", &pool).unwrap();
        let result = CompilerBuilder::new(pool, Arc::new(MapResolver::new())).compile(&doc, None);
        assert!(matches!(result, Err(XsltError::Structure { .. })));
    }
}
