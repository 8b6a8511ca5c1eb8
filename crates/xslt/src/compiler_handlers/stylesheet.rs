//! Handlers for stylesheet modules and their top-level declarations.

use crate::ast::{AttributeSet, GlobalVariable, Instruction, Template, VariableValue};
use crate::compiler::{CompilerBuilder, Module, WEFT_NAMESPACE};
use crate::config::OutputMethod;
use crate::decimal_format::DecimalFormat;
use crate::error::{Location, XsltError};
use crate::key_manager::KeyDefinition;
use crate::resolver::MAX_IMPORT_DEPTH;
use std::sync::Arc;
use std::collections::HashSet;
use weft_tree::{Atom, Document, NameId, Node, NodeType, SpaceRules, SpaceTest, parse_document_with};
use weft_xpath::Binding;

/// An `xsl:import` waiting to be loaded.
struct ImportRequest {
    href: String,
    base: Option<String>,
    line: u32,
}

impl CompilerBuilder {
    /// Loads `element`'s module and, first, everything it imports. Precedences are
    /// numbered in post-order of the import tree. Returns the module's
    /// `(min_import_precedence, precedence)`.
    pub(crate) fn load_module(
        &mut self,
        element: Node,
        base: Option<String>,
        depth: usize,
    ) -> Result<(i32, i32), XsltError> {
        if depth > MAX_IMPORT_DEPTH {
            return Err(XsltError::structure(
                format!("imports nested deeper than {}", MAX_IMPORT_DEPTH),
                element.line_number(),
            ));
        }
        if !self.is_xsl(&element, "stylesheet") && !self.is_xsl(&element, "transform") {
            if element.attribute(self.xsl_name("version")).is_none() {
                return Err(XsltError::structure(
                    format!("<{}> is not a stylesheet", element.display_name()),
                    element.line_number(),
                ));
            }
            let precedence = self.next_precedence;
            self.next_precedence += 1;
            self.modules.push(Module {
                element,
                declarations: Vec::new(),
                precedence,
                min_import_precedence: precedence,
                simplified: true,
            });
            return Ok((precedence, precedence));
        }

        let mut declarations = Vec::new();
        let mut imports = Vec::new();
        self.collect_declarations(&element, base.as_deref(), &mut declarations, &mut imports, depth)?;

        let mut min_import_precedence = None;
        for import in imports {
            let (uri, document) = self.load_document(&import.href, import.base.as_deref(), import.line)?;
            let imported = document.document_element().ok_or_else(|| {
                XsltError::structure(format!("'{}' has no document element", uri), import.line)
            })?;
            let (imported_min, _) = self.load_module(imported, Some(uri), depth + 1)?;
            self.loading.pop();
            min_import_precedence.get_or_insert(imported_min);
        }

        let precedence = self.next_precedence;
        self.next_precedence += 1;
        let min_import_precedence = min_import_precedence.unwrap_or(precedence);
        log::debug!(
            "module {} has precedence {} (imports from {})",
            base.as_deref().unwrap_or("<main>"),
            precedence,
            min_import_precedence
        );
        self.modules.push(Module {
            element,
            declarations,
            precedence,
            min_import_precedence,
            simplified: false,
        });
        Ok((min_import_precedence, precedence))
    }

    /// Gathers the top-level elements of a module, expanding `xsl:include` in place.
    /// Imports found anywhere in the included tree belong to the including module.
    fn collect_declarations(
        &mut self,
        element: &Node,
        base: Option<&str>,
        declarations: &mut Vec<Node>,
        imports: &mut Vec<ImportRequest>,
        depth: usize,
    ) -> Result<(), XsltError> {
        let mut seen_declaration = false;
        for child in element.children() {
            match child.node_type() {
                NodeType::Text if !child.is_whitespace_text() => {
                    return Err(XsltError::structure(
                        "text is not allowed at the top level of a stylesheet",
                        child.line_number(),
                    ));
                }
                NodeType::Element => {}
                _ => continue,
            }
            if self.is_xsl(&child, "import") {
                if seen_declaration {
                    return Err(XsltError::structure(
                        "xsl:import must come before every other declaration",
                        child.line_number(),
                    ));
                }
                imports.push(ImportRequest {
                    href: self.required_attr(&child, "href")?,
                    base: base.map(str::to_string),
                    line: child.line_number(),
                });
                continue;
            }
            seen_declaration = true;
            if self.is_xsl(&child, "include") {
                if depth >= MAX_IMPORT_DEPTH {
                    return Err(XsltError::structure(
                        format!("includes nested deeper than {}", MAX_IMPORT_DEPTH),
                        child.line_number(),
                    ));
                }
                let href = self.required_attr(&child, "href")?;
                let (uri, document) = self.load_document(&href, base, child.line_number())?;
                let included = document
                    .document_element()
                    .filter(|e| self.is_xsl(e, "stylesheet") || self.is_xsl(e, "transform"))
                    .ok_or_else(|| {
                        XsltError::structure(
                            format!("included '{}' is not a stylesheet", uri),
                            child.line_number(),
                        )
                    })?;
                self.collect_declarations(&included, Some(&uri), declarations, imports, depth + 1)?;
                self.loading.pop();
                continue;
            }
            declarations.push(child);
        }
        Ok(())
    }

    /// Loads and parses a stylesheet module, refusing one already being loaded. The
    /// caller pops `loading` once the module is processed.
    fn load_document(
        &mut self,
        href: &str,
        base: Option<&str>,
        line: u32,
    ) -> Result<(String, Arc<Document>), XsltError> {
        let (uri, text) = self.resolver.load(href, base).map_err(|err| match err {
            XsltError::UnresolvedReference { message, .. } => {
                XsltError::unresolved(message, Location::line(line))
            }
            other => other,
        })?;
        if self.loading.contains(&uri) {
            return Err(XsltError::CircularDefinition {
                what: format!("stylesheet module '{}'", uri),
            });
        }
        log::debug!("loading stylesheet module '{}'", uri);
        let document = parse_document_with(&text, &self.pool, &SpaceRules::new(), Some(&uri))?;
        self.loading.push(uri.clone());
        Ok((uri, document))
    }

    /// First pass: declares global variables and named templates. Match patterns wait
    /// for the second pass, as they may refer to any global variable.
    pub(crate) fn declare(&mut self, node: &Node, module: &Module) -> Result<(), XsltError> {
        let Some(local) = self.xsl_local(node) else {
            return Ok(());
        };
        match local.as_str() {
            "variable" | "param" => self.declare_global(node, local == "param", module.precedence),
            "template" => self.declare_template(node, module),
            _ => Ok(()),
        }
    }

    /// Second pass: everything else at the top level.
    pub(crate) fn define(&mut self, node: &Node, module: &Module) -> Result<(), XsltError> {
        let Some(local) = self.xsl_local(node) else {
            if node.namespace_uri().is_empty() {
                return Err(XsltError::structure(
                    format!("<{}> is not allowed at the top level", node.display_name()),
                    node.line_number(),
                ));
            }
            // Top-level elements in other namespaces are user data.
            return Ok(());
        };
        match local.as_str() {
            "variable" | "param" => Ok(()),
            "template" => {
                let index = self
                    .pending_templates
                    .iter()
                    .find(|(_, declared)| declared == node)
                    .map(|(index, _)| *index);
                match index {
                    Some(index) => self.register_rule(index, node),
                    None => Ok(()),
                }
            }
            "key" => self.define_key(node),
            "output" => self.define_output(node),
            "strip-space" => self.define_space(node, true, module.precedence),
            "preserve-space" => self.define_space(node, false, module.precedence),
            "import" | "include" => Ok(()),
            "attribute-set" => self.define_attribute_set(node),
            "decimal-format" => self.define_decimal_format(node),
            "namespace-alias" => self.define_namespace_alias(node),
            other => Err(XsltError::structure(
                format!("unknown top-level element xsl:{}", other),
                node.line_number(),
            )),
        }
    }

    fn declare_global(&mut self, node: &Node, is_param: bool, precedence: i32) -> Result<(), XsltError> {
        let display_name = self.required_attr(node, "name")?;
        let name = self.qname(node, &display_name)?;
        let assignable = node
            .attribute_value(self.pool.intern(WEFT_NAMESPACE, "assignable"))
            .is_some_and(|v| v == "yes");
        if let Some(existing) = self.global_bindings.get(&name).copied() {
            let current = &mut self.globals[existing.slot];
            if current.precedence == precedence {
                return Err(XsltError::structure(
                    format!("global variable ${} is declared twice", display_name),
                    node.line_number(),
                ));
            }
            current.is_param = is_param;
            current.line = node.line_number();
            current.precedence = precedence;
            let mut binding = Binding::global(name, existing.slot);
            if assignable {
                binding = binding.assignable();
            }
            current.binding = binding;
            self.global_bindings.insert(name, binding);
            if let Some(pending) = self.pending_globals.iter_mut().find(|(s, _)| *s == existing.slot) {
                pending.1 = node.clone();
            }
            return Ok(());
        }
        let slot = self.globals.len();
        let mut binding = Binding::global(name, slot);
        if assignable {
            binding = binding.assignable();
        }
        self.global_bindings.insert(name, binding);
        self.globals.push(GlobalVariable {
            name,
            display_name,
            binding,
            value: VariableValue::Empty,
            is_param,
            precedence,
            line: node.line_number(),
        });
        self.pending_globals.push((slot, node.clone()));
        Ok(())
    }

    fn declare_template(&mut self, node: &Node, module: &Module) -> Result<(), XsltError> {
        let match_text = self.attr(node, "match");
        let name = match self.attr(node, "name") {
            Some(text) => Some(self.qname(node, &text)?),
            None => None,
        };
        if match_text.is_none() && name.is_none() {
            return Err(XsltError::structure(
                "xsl:template needs a match or a name attribute",
                node.line_number(),
            ));
        }
        let mode = match self.attr(node, "mode") {
            Some(text) => Some(self.qname(node, &text)?),
            None => None,
        };
        let priority = match self.attr(node, "priority") {
            Some(text) => Some(text.trim().parse::<f64>().map_err(|_| {
                XsltError::structure(format!("invalid priority '{}'", text), node.line_number())
            })?),
            None => None,
        };
        let index = self.templates.len();
        if let Some(name) = name {
            if let Some(&other) = self.named_templates.get(&name) {
                if self.templates[other].precedence == module.precedence {
                    return Err(XsltError::structure(
                        format!(
                            "template '{}' is declared twice",
                            self.pool.local_name(name)
                        ),
                        node.line_number(),
                    ));
                }
            }
            self.named_templates.insert(name, index);
        }
        self.templates.push(Template {
            name,
            match_text,
            mode,
            priority,
            precedence: module.precedence,
            min_import_precedence: module.min_import_precedence,
            body: Vec::new(),
            line: node.line_number(),
        });
        self.pending_templates.push((index, node.clone()));
        Ok(())
    }

    fn register_rule(&mut self, index: usize, node: &Node) -> Result<(), XsltError> {
        let template = &self.templates[index];
        let (Some(text), mode, priority, precedence) = (
            template.match_text.clone(),
            template.mode,
            template.priority,
            template.precedence,
        ) else {
            return Ok(());
        };
        let pattern = self.pattern(node, &text)?;
        if let Some(mode) = mode {
            self.rules.declare_mode(mode);
        }
        self.rules
            .add_rule(&pattern, index, mode, precedence, priority, &text);
        Ok(())
    }

    /// A literal result element as the whole stylesheet: one template matching `/`.
    pub(crate) fn compile_simplified(&mut self, module: &Module) -> Result<(), XsltError> {
        let index = self.templates.len();
        self.templates.push(Template {
            name: None,
            match_text: Some("/".to_string()),
            mode: None,
            priority: None,
            precedence: module.precedence,
            min_import_precedence: module.min_import_precedence,
            body: Vec::new(),
            line: module.element.line_number(),
        });
        let pattern = self.pattern(&module.element, "/")?;
        self.rules
            .add_rule(&pattern, index, None, module.precedence, None, "/");
        self.begin_frame();
        let body: Vec<Instruction> = vec![self.compile_literal_element(&module.element)?];
        self.end_frame();
        self.templates[index].body = body;
        Ok(())
    }

    fn define_key(&mut self, node: &Node) -> Result<(), XsltError> {
        let name_text = self.required_attr(node, "name")?;
        let name = self.qname(node, &name_text)?;
        let pattern = self.pattern(node, &self.required_attr(node, "match")?)?;
        let use_expr = self.expression(node, &self.required_attr(node, "use")?)?;
        // Key indexes are cached on the source document and shared by every run.
        if pattern.references_variables() || use_expr.references_variables() {
            return Err(XsltError::structure(
                format!("xsl:key '{}' must not refer to variables in 'match' or 'use'", name_text),
                node.line_number(),
            ));
        }
        self.keys.add_definition(KeyDefinition {
            name,
            pattern,
            use_expr,
            line: node.line_number(),
        });
        Ok(())
    }

    /// Declarations of the same set accumulate; a later one's attributes replace an
    /// earlier one's of the same name when both are added.
    fn define_attribute_set(&mut self, node: &Node) -> Result<(), XsltError> {
        let name = self.qname(node, &self.required_attr(node, "name")?)?;
        let mut use_sets = Vec::new();
        for token in self.attr(node, "use-attribute-sets").iter().flat_map(|l| l.split_whitespace()) {
            use_sets.push(self.qname(node, token)?);
        }
        self.begin_frame();
        let mut attributes = Vec::new();
        for child in node.children() {
            match child.node_type() {
                NodeType::Element if self.is_xsl(&child, "attribute") => {
                    attributes.push(self.compile_attribute(&child)?)
                }
                NodeType::Text if child.is_whitespace_text() => {}
                NodeType::Comment | NodeType::ProcessingInstruction => {}
                _ => {
                    return Err(XsltError::structure(
                        "xsl:attribute-set may only contain xsl:attribute",
                        child.line_number(),
                    ));
                }
            }
        }
        self.end_frame();
        self.attribute_sets.entry(name).or_default().push(AttributeSet {
            name,
            use_sets,
            attributes,
            line: node.line_number(),
        });
        Ok(())
    }

    /// Every set named in a `use-attribute-sets` list of an attribute set must exist,
    /// and no set may use itself, directly or not.
    pub(crate) fn check_attribute_sets(&self) -> Result<(), XsltError> {
        let mut done = HashSet::new();
        for &name in self.attribute_sets.keys() {
            self.check_attribute_set(name, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }

    fn check_attribute_set(
        &self,
        name: NameId,
        path: &mut Vec<NameId>,
        done: &mut HashSet<NameId>,
    ) -> Result<(), XsltError> {
        if done.contains(&name) {
            return Ok(());
        }
        if path.contains(&name) {
            return Err(XsltError::CircularDefinition {
                what: format!("attribute set '{}'", self.pool.local_name(name)),
            });
        }
        path.push(name);
        for declaration in self.attribute_sets.get(&name).into_iter().flatten() {
            for &used in &declaration.use_sets {
                if !self.attribute_sets.contains_key(&used) {
                    return Err(XsltError::unresolved(
                        format!("attribute set '{}' is not declared", self.pool.local_name(used)),
                        Location::line(declaration.line),
                    ));
                }
                self.check_attribute_set(used, path, done)?;
            }
        }
        path.pop();
        done.insert(name);
        Ok(())
    }

    fn define_decimal_format(&mut self, node: &Node) -> Result<(), XsltError> {
        let name = match self.attr(node, "name") {
            Some(text) => Some(self.qname(node, &text)?),
            None => None,
        };
        let mut format = DecimalFormat::default();
        let symbols: [(&str, &mut char); 8] = [
            ("decimal-separator", &mut format.decimal_separator),
            ("grouping-separator", &mut format.grouping_separator),
            ("minus-sign", &mut format.minus_sign),
            ("percent", &mut format.percent),
            ("per-mille", &mut format.per_mille),
            ("zero-digit", &mut format.zero_digit),
            ("digit", &mut format.digit),
            ("pattern-separator", &mut format.pattern_separator),
        ];
        for (attribute, symbol) in symbols {
            let Some(value) = self.attr(node, attribute) else {
                continue;
            };
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => *symbol = c,
                _ => {
                    return Err(XsltError::structure(
                        format!("'{}' must be a single character, not '{}'", attribute, value),
                        node.line_number(),
                    ));
                }
            }
        }
        if let Some(infinity) = self.attr(node, "infinity") {
            format.infinity = infinity;
        }
        if let Some(nan) = self.attr(node, "NaN") {
            format.nan = nan;
        }
        self.decimal_formats
            .declare(name, format)
            .map_err(|message| XsltError::structure(message, node.line_number()))
    }

    fn define_namespace_alias(&mut self, node: &Node) -> Result<(), XsltError> {
        let stylesheet_uri = self.alias_prefix(node, "stylesheet-prefix")?;
        let result_prefix = self.required_attr(node, "result-prefix")?;
        let result_uri = self.alias_prefix(node, "result-prefix")?;
        let result_prefix = match result_prefix.trim() {
            "#default" => "",
            other => other,
        };
        log::debug!("namespace '{}' is aliased to '{}'", stylesheet_uri, result_uri);
        self.namespace_aliases
            .insert(stylesheet_uri, (Atom::from(result_prefix), result_uri));
        Ok(())
    }

    /// The namespace URI bound at `node` to the prefix in attribute `local`, with
    /// `#default` standing for the default namespace.
    fn alias_prefix(&self, node: &Node, local: &str) -> Result<Atom, XsltError> {
        let text = self.required_attr(node, local)?;
        let prefix = match text.trim() {
            "#default" => "",
            other => other,
        };
        let uri = node
            .in_scope_namespaces()
            .into_iter()
            .rev()
            .find(|(p, _)| p.as_ref() == prefix)
            .map(|(_, uri)| uri);
        match uri {
            Some(uri) => Ok(uri),
            None if prefix.is_empty() => Ok(Atom::from("")),
            None => Err(XsltError::structure(
                format!("namespace prefix '{}' is not declared", prefix),
                node.line_number(),
            )),
        }
    }

    /// Later declarations (higher precedence) override earlier ones attribute by
    /// attribute.
    fn define_output(&mut self, node: &Node) -> Result<(), XsltError> {
        if let Some(method) = self.attr(node, "method") {
            let method = method
                .trim()
                .parse::<OutputMethod>()
                .map_err(|message| XsltError::structure(message, node.line_number()))?;
            self.output.method = Some(method);
        }
        if self.attr(node, "indent").is_some() {
            self.output.indent = self.yes_no(node, "indent")?;
        }
        if self.attr(node, "omit-xml-declaration").is_some() {
            self.output.omit_xml_declaration = self.yes_no(node, "omit-xml-declaration")?;
        }
        if let Some(encoding) = self.attr(node, "encoding") {
            self.output.encoding = encoding;
        }
        if let Some(public) = self.attr(node, "doctype-public") {
            self.output.doctype_public = Some(public);
        }
        if let Some(system) = self.attr(node, "doctype-system") {
            self.output.doctype_system = Some(system);
        }
        if let Some(media_type) = self.attr(node, "media-type") {
            self.output.media_type = Some(media_type);
        }
        Ok(())
    }

    fn define_space(&mut self, node: &Node, strip: bool, precedence: i32) -> Result<(), XsltError> {
        let elements = self.required_attr(node, "elements")?;
        for token in elements.split_whitespace() {
            let test = if token == "*" {
                SpaceTest::Any
            } else if let Some(prefix) = token.strip_suffix(":*") {
                let uri = node
                    .in_scope_namespaces()
                    .into_iter()
                    .rev()
                    .find(|(p, _)| p.as_ref() == prefix)
                    .map(|(_, uri)| uri)
                    .ok_or_else(|| {
                        XsltError::structure(
                            format!("namespace prefix '{}' is not declared", prefix),
                            node.line_number(),
                        )
                    })?;
                SpaceTest::Namespace(Atom::from(uri.as_ref()))
            } else {
                SpaceTest::Name(self.qname(node, token)?)
            };
            self.space_rules.add(test, strip, precedence);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::CompilerBuilder;
    use crate::config::OutputMethod;
    use crate::error::XsltError;
    use crate::resolver::MapResolver;
    use std::sync::Arc;
    use weft_tree::{NamePool, parse_document};

    fn sheet(body: &str) -> String {
        format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
            body
        )
    }

    fn compile_with(
        main: &str,
        resolver: MapResolver,
    ) -> Result<crate::ast::CompiledStylesheet, XsltError> {
        let pool = NamePool::new();
        let doc = weft_tree::parse_document_with(main, &pool, &Default::default(), Some("main.xsl"))?;
        CompilerBuilder::new(pool, Arc::new(resolver)).compile(&doc, Some("main.xsl"))
    }

    #[test]
    fn test_import_precedence_is_post_order() {
        let resolver = MapResolver::new()
            .with_document("a.xsl", sheet(r#"<xsl:import href="c.xsl"/><xsl:template match="x"/>"#))
            .with_document("b.xsl", sheet(r#"<xsl:template match="y"/>"#))
            .with_document("c.xsl", sheet(r#"<xsl:template match="z"/>"#));
        let main = sheet(
            r#"<xsl:import href="a.xsl"/><xsl:import href="b.xsl"/><xsl:template match="w"/>"#,
        );
        let compiled = compile_with(&main, resolver).unwrap();
        let by_match = |m: &str| {
            compiled
                .templates
                .iter()
                .find(|t| t.match_text.as_deref() == Some(m))
                .map(|t| (t.min_import_precedence, t.precedence))
                .unwrap()
        };
        assert_eq!(by_match("z"), (0, 0));
        assert_eq!(by_match("x"), (0, 1));
        assert_eq!(by_match("y"), (2, 2));
        assert_eq!(by_match("w"), (0, 3));
    }

    #[test]
    fn test_include_shares_precedence() {
        let resolver = MapResolver::new()
            .with_document("inc.xsl", sheet(r#"<xsl:template match="i"/>"#));
        let main = sheet(r#"<xsl:include href="inc.xsl"/><xsl:template match="m"/>"#);
        let compiled = compile_with(&main, resolver).unwrap();
        assert_eq!(compiled.templates.len(), 2);
        assert!(compiled.templates.iter().all(|t| t.precedence == 0));
    }

    #[test]
    fn test_circular_import_is_rejected() {
        let resolver = MapResolver::new()
            .with_document("a.xsl", sheet(r#"<xsl:import href="main.xsl"/>"#))
            .with_document("main.xsl", sheet(r#"<xsl:import href="a.xsl"/>"#));
        let main = sheet(r#"<xsl:import href="a.xsl"/>"#);
        assert!(matches!(
            compile_with(&main, resolver),
            Err(XsltError::CircularDefinition { .. })
        ));
    }

    #[test]
    fn test_missing_module() {
        let main = sheet(r#"<xsl:include href="nowhere.xsl"/>"#);
        assert!(matches!(
            compile_with(&main, MapResolver::new()),
            Err(XsltError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_import_after_declaration() {
        let resolver = MapResolver::new().with_document("a.xsl", sheet(""));
        let main = sheet(r#"<xsl:template match="/"/><xsl:import href="a.xsl"/>"#);
        assert!(matches!(
            compile_with(&main, resolver),
            Err(XsltError::Structure { .. })
        ));
    }

    #[test]
    fn test_higher_precedence_global_and_output_win() {
        let resolver = MapResolver::new().with_document(
            "base.xsl",
            sheet(r#"<xsl:variable name="v" select="1"/><xsl:output method="html" indent="yes"/>"#),
        );
        let main = sheet(
            r#"<xsl:import href="base.xsl"/><xsl:variable name="v" select="2"/><xsl:output method="text"/>"#,
        );
        let compiled = compile_with(&main, resolver).unwrap();
        assert_eq!(compiled.globals.len(), 1);
        assert_eq!(compiled.globals[0].precedence, 1);
        assert_eq!(compiled.output.method, Some(OutputMethod::Text));
        assert!(compiled.output.indent);
    }

    #[test]
    fn test_duplicates_at_equal_precedence() {
        let pool = NamePool::new();
        let doc = parse_document(
            &sheet(r#"<xsl:template name="t"/><xsl:template name="t"/>"#),
            &pool,
        )
        .unwrap();
        let result = CompilerBuilder::new(pool, Arc::new(MapResolver::new())).compile(&doc, None);
        assert!(matches!(result, Err(XsltError::Structure { .. })));

        let dup_var = sheet(r#"<xsl:variable name="v"/><xsl:param name="v"/>"#);
        assert!(matches!(
            compile_with(&dup_var, MapResolver::new()),
            Err(XsltError::Structure { .. })
        ));
    }

    #[test]
    fn test_strip_space_and_keys() {
        let main = sheet(
            r#"<xsl:strip-space elements="*"/><xsl:preserve-space elements="pre"/>
               <xsl:key name="k" match="item" use="@id"/>"#,
        );
        let compiled = compile_with(&main, MapResolver::new()).unwrap();
        let pool = &compiled.pool;
        assert!(compiled.space_rules.strips(pool.intern("", "p"), pool));
        assert!(!compiled.space_rules.strips(pool.intern("", "pre"), pool));
        assert!(compiled.keys.is_defined(pool.intern("", "k")));
    }
}
