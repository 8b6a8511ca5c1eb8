//! The high-level entry point: compile a stylesheet once, then transform any number of
//! source documents with it.

use crate::ast::CompiledStylesheet;
use crate::compiler::CompilerBuilder;
use crate::config::TransformOptions;
use crate::controller::Controller;
use crate::error::{Diagnostic, XsltError};
use crate::resolver::{DocumentResolver, FileResolver};
use std::path::Path;
use std::sync::Arc;
use weft_tree::{Document, NamePool, SpaceRules, parse_document_with};

/// A compiled stylesheet together with the resolver its runs load documents through.
/// Cheap to clone and safe to share between threads.
#[derive(Clone)]
pub struct Stylesheet {
    compiled: Arc<CompiledStylesheet>,
    resolver: Arc<dyn DocumentResolver>,
}

/// The serialized result of one transformation and the diagnostics it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub output: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl std::fmt::Debug for Stylesheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stylesheet")
            .field("templates", &self.compiled.templates.len())
            .field("globals", &self.compiled.globals.len())
            .finish()
    }
}

impl Stylesheet {
    /// Compiles stylesheet text. Imports and includes resolve against the working directory.
    pub fn compile(text: &str) -> Result<Self, XsltError> {
        Self::compile_with(text, None, Arc::new(FileResolver))
    }

    pub fn compile_file(path: &Path) -> Result<Self, XsltError> {
        let text = std::fs::read_to_string(path)?;
        let base = path.to_string_lossy();
        Self::compile_with(&text, Some(&base), Arc::new(FileResolver))
    }

    /// Compiles stylesheet text located at `base_uri`, loading imported modules and
    /// documents through `resolver`.
    pub fn compile_with(
        text: &str,
        base_uri: Option<&str>,
        resolver: Arc<dyn DocumentResolver>,
    ) -> Result<Self, XsltError> {
        let pool = NamePool::new();
        let document = parse_document_with(text, &pool, &SpaceRules::new(), base_uri)?;
        let compiled = CompilerBuilder::new(pool, Arc::clone(&resolver)).compile(&document, base_uri)?;
        Ok(Self {
            compiled: Arc::new(compiled),
            resolver,
        })
    }

    pub fn compiled(&self) -> &Arc<CompiledStylesheet> {
        &self.compiled
    }

    /// Parses a source document with this stylesheet's names and whitespace stripping rules.
    pub fn parse_source(&self, text: &str) -> Result<Arc<Document>, XsltError> {
        Ok(parse_document_with(
            text,
            &self.compiled.pool,
            &self.compiled.space_rules,
            None,
        )?)
    }

    /// A fresh controller for one run.
    pub fn controller(&self) -> Controller {
        Controller::new(Arc::clone(&self.compiled)).with_resolver(Arc::clone(&self.resolver))
    }

    pub fn transform(&self, source: &str, options: &TransformOptions) -> Result<TransformOutput, XsltError> {
        let document = self.parse_source(source)?;
        self.transform_document(&document, options)
    }

    pub fn transform_document(
        &self,
        document: &Arc<Document>,
        options: &TransformOptions,
    ) -> Result<TransformOutput, XsltError> {
        let mut controller = self.controller();
        controller.configure(options)?;
        let output = controller.transform_to_string(document)?;
        Ok(TransformOutput {
            output,
            diagnostics: controller.diagnostics().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
        <xsl:output omit-xml-declaration="yes"/>"#;

    fn transform(body: &str, data: &str) -> String {
        let text = format!("{}{}</xsl:stylesheet>", HEAD, body);
        let stylesheet = Stylesheet::compile(&text).unwrap();
        stylesheet
            .transform(data, &TransformOptions::default())
            .unwrap()
            .output
    }

    const USERS: &str = r#"<data><users><user id="u1" status="active"><name>Alice</name></user><user id="u2" status="inactive"><name>Bob</name></user><user id="u3" status="active"><name>Charlie</name></user></users></data>"#;

    #[test]
    fn test_call_template_with_params() {
        let output = transform(
            r#"
            <xsl:template name="user-details">
                <xsl:param name="user-node"/>
                <xsl:param name="prefix" select="'User: '"/>
                <p><xsl:value-of select="$prefix"/><xsl:value-of select="$user-node/name"/></p>
            </xsl:template>
            <xsl:template match="/">
                <list>
                    <xsl:for-each select="data/users/user">
                        <xsl:if test="@status = 'active'">
                            <xsl:call-template name="user-details">
                                <xsl:with-param name="user-node" select="."/>
                            </xsl:call-template>
                        </xsl:if>
                    </xsl:for-each>
                </list>
            </xsl:template>"#,
            USERS,
        );
        assert_eq!(output, "<list><p>User: Alice</p><p>User: Charlie</p></list>");
    }

    #[test]
    fn test_xpath_features_in_templates() {
        let output = transform(
            r#"
            <xsl:template match="/data">
                <root>
                    <xsl:variable name="five" select="5"/>
                    <p>Unary minus: <xsl:value-of select="items/item[1] - $five"/></p>
                    <p>Preceding sibling: <xsl:value-of select="items/item[2]/preceding-sibling::item"/></p>
                    <p>Lang check: <xsl:value-of select="lang('en-GB')"/></p>
                </root>
            </xsl:template>"#,
            r#"<data xml:lang="en-GB"><items><item>3</item><item>10</item></items></data>"#,
        );
        assert_eq!(
            output,
            "<root><p>Unary minus: -2</p><p>Preceding sibling: 3</p><p>Lang check: true</p></root>"
        );
    }

    #[test]
    fn test_choose_when_otherwise() {
        let output = transform(
            r#"
            <xsl:template match="/">
                <root>
                    <xsl:for-each select="data/items/item">
                        <xsl:choose>
                            <xsl:when test="@category = 'A'"><p>A: <xsl:value-of select="."/></p></xsl:when>
                            <xsl:when test="@category = 'B'"><p>B: <xsl:value-of select="."/></p></xsl:when>
                            <xsl:otherwise><p>Other: <xsl:value-of select="."/></p></xsl:otherwise>
                        </xsl:choose>
                    </xsl:for-each>
                </root>
            </xsl:template>"#,
            r#"<data><items><item category="B">Item 1</item><item category="C">Item 2</item><item category="A">Item 3</item></items></data>"#,
        );
        assert_eq!(
            output,
            "<root><p>B: Item 1</p><p>Other: Item 2</p><p>A: Item 3</p></root>"
        );
    }

    #[test]
    fn test_multi_key_sort() {
        let output = transform(
            r#"
            <xsl:template match="/">
                <root>
                    <xsl:for-each select="data/items/item">
                        <xsl:sort select="name"/>
                        <xsl:sort select="price" data-type="number" order="descending"/>
                        <p><xsl:value-of select="name"/> - <xsl:value-of select="price"/></p>
                    </xsl:for-each>
                </root>
            </xsl:template>"#,
            r#"<data><items><item><name>Gadget</name><price>9.99</price></item><item><name>Widget</name><price>15.50</price></item><item><name>Gadget</name><price>12.00</price></item></items></data>"#,
        );
        assert_eq!(
            output,
            "<root><p>Gadget - 12.00</p><p>Gadget - 9.99</p><p>Widget - 15.50</p></root>"
        );
    }

    #[test]
    fn test_attributes_and_value_templates() {
        let output = transform(
            r#"
            <xsl:template match="/">
                <root>
                    <xsl:for-each select="data/links/link">
                        <a id="link-{@id}">
                            <xsl:attribute name="href"><xsl:value-of select="url"/></xsl:attribute>
                            <xsl:value-of select="text"/>
                        </a>
                    </xsl:for-each>
                </root>
            </xsl:template>"#,
            r#"<data><links><link id="1"><url>https://example.com</url><text>Example</text></link></links></data>"#,
        );
        assert_eq!(
            output,
            r#"<root><a id="link-1" href="https://example.com">Example</a></root>"#
        );
    }

    #[test]
    fn test_copy_of_and_identity_copy() {
        let output = transform(
            r#"
            <xsl:template match="/">
                <root>
                    <p><xsl:copy-of select="'Hello World'"/></p>
                    <xsl:copy-of select="data/content/*"/>
                </root>
            </xsl:template>"#,
            r#"<data><content><p class="x">First</p><div>Second</div></content></data>"#,
        );
        assert_eq!(
            output,
            r#"<root><p>Hello World</p><p class="x">First</p><div>Second</div></root>"#
        );

        let identity = transform(
            r#"
            <xsl:template match="@*|node()">
                <xsl:copy><xsl:apply-templates select="@*|node()"/></xsl:copy>
            </xsl:template>
            <xsl:template match="item">
                <p>Processed item: <xsl:value-of select="."/></p>
            </xsl:template>"#,
            r#"<data><wrapper k="v"><item>A</item><another>B</another></wrapper></data>"#,
        );
        assert_eq!(
            identity,
            r#"<data><wrapper k="v"><p>Processed item: A</p><another>B</another></wrapper></data>"#
        );
    }

    #[test]
    fn test_computed_element_names() {
        let output = transform(
            r#"
            <xsl:template match="/">
                <root>
                    <xsl:variable name="tag_name" select="'dynamic-tag'"/>
                    <xsl:element name="h{data/level}"><xsl:value-of select="data/title"/></xsl:element>
                    <xsl:element name="{$tag_name}">Content</xsl:element>
                </root>
            </xsl:template>"#,
            "<data><level>1</level><title>Hello World</title></data>",
        );
        assert_eq!(
            output,
            "<root><h1>Hello World</h1><dynamic-tag>Content</dynamic-tag></root>"
        );
    }

    #[test]
    fn test_key_function() {
        let output = transform(
            r#"
            <xsl:key name="user-by-id" match="user" use="@id"/>
            <xsl:key name="users-by-dept" match="user" use="dept"/>
            <xsl:template match="/">
                <root>
                    <p><xsl:value-of select="key('user-by-id', 'u2')/name"/></p>
                    <xsl:for-each select="key('users-by-dept', 'sales')">
                        <xsl:sort select="name" order="descending"/>
                        <s><xsl:value-of select="name"/></s>
                    </xsl:for-each>
                </root>
            </xsl:template>"#,
            r#"<data><user id="u1"><name>Alice</name><dept>eng</dept></user><user id="u2"><name>Bob</name><dept>sales</dept></user><user id="u4"><name>David</name><dept>sales</dept></user></data>"#,
        );
        assert_eq!(output, "<root><p>Bob</p><s>David</s><s>Bob</s></root>");
    }

    #[test]
    fn test_parameters_from_options() {
        let text = format!(
            r#"{}<xsl:param name="title" select="'default'"/>
               <xsl:template match="/"><t><xsl:value-of select="$title"/></t></xsl:template>
               </xsl:stylesheet>"#,
            HEAD
        );
        let stylesheet = Stylesheet::compile(&text).unwrap();
        let mut options = TransformOptions::default();
        assert_eq!(stylesheet.transform("<a/>", &options).unwrap().output, "<t>default</t>");
        options.merge_parameters([("title".to_string(), "Given".to_string())]);
        assert_eq!(stylesheet.transform("<a/>", &options).unwrap().output, "<t>Given</t>");
    }
}
