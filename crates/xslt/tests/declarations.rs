mod common;

use common::{TestResult, compile};
use weft_xslt::{TransformOptions, XsltError};

fn transform(declarations: &str, source: &str) -> Result<String, XsltError> {
    let stylesheet = compile(declarations)?;
    Ok(stylesheet.transform(source, &TransformOptions::default())?.output)
}

const SETS: &str = r#"<xsl:variable name="site" select="'main'"/>
    <xsl:attribute-set name="base">
      <xsl:attribute name="class">item</xsl:attribute>
      <xsl:attribute name="site"><xsl:value-of select="$site"/></xsl:attribute>
    </xsl:attribute-set>
    <xsl:attribute-set name="wide" use-attribute-sets="base">
      <xsl:attribute name="width">100</xsl:attribute>
    </xsl:attribute-set>"#;

#[test]
fn test_attribute_sets_on_literal_elements() -> TestResult {
    let output = transform(
        &format!(
            r#"{}<xsl:template match="/"><a xsl:use-attribute-sets="wide" width="50"/></xsl:template>"#,
            SETS
        ),
        "<doc/>",
    )?;
    assert!(output.starts_with("<a "), "{}", output);
    assert!(output.contains(r#"class="item""#), "{}", output);
    assert!(output.contains(r#"site="main""#), "{}", output);
    // Attributes written on the element itself win over the set.
    assert!(output.contains(r#"width="50""#), "{}", output);
    assert!(!output.contains(r#"width="100""#), "{}", output);
    Ok(())
}

#[test]
fn test_attribute_sets_on_element_and_copy() -> TestResult {
    let output = transform(
        &format!(
            r#"{}<xsl:template match="/">
                 <r>
                   <xsl:element name="b" use-attribute-sets="base"/>
                   <xsl:for-each select="doc"><xsl:copy use-attribute-sets="wide"/></xsl:for-each>
                 </r>
               </xsl:template>"#,
            SETS
        ),
        "<doc/>",
    )?;
    assert_eq!(
        output,
        r#"<r><b class="item" site="main"/><doc class="item" site="main" width="100"/></r>"#
    );
    Ok(())
}

#[test]
fn test_attribute_set_errors() {
    let circular = compile(
        r#"<xsl:attribute-set name="a" use-attribute-sets="b"/>
           <xsl:attribute-set name="b" use-attribute-sets="a"/>
           <xsl:template match="/"/>"#,
    );
    assert!(
        matches!(circular, Err(XsltError::CircularDefinition { ref what }) if what.contains("attribute set")),
        "got {:?}",
        circular.err()
    );
    let undeclared = compile(r#"<xsl:template match="/"><a xsl:use-attribute-sets="nowhere"/></xsl:template>"#);
    assert!(
        matches!(undeclared, Err(XsltError::UnresolvedReference { .. })),
        "got {:?}",
        undeclared.err()
    );
}

#[test]
fn test_namespace_alias_rewrites_literal_names() -> TestResult {
    let output = transform(
        r#"<xsl:namespace-alias xmlns:axsl="urn:alias" stylesheet-prefix="axsl" result-prefix="xsl"/>
           <xsl:template match="/">
             <axsl:stylesheet xmlns:axsl="urn:alias" version="1.0"><axsl:template match="{name(*)}"/></axsl:stylesheet>
           </xsl:template>"#,
        "<doc/>",
    )?;
    assert!(output.starts_with("<xsl:stylesheet"), "{}", output);
    assert!(output.contains(r#"xmlns:xsl="http://www.w3.org/1999/XSL/Transform""#), "{}", output);
    assert!(output.contains(r#"<xsl:template match="doc"/>"#), "{}", output);
    assert!(!output.contains("urn:alias"), "{}", output);
    Ok(())
}

#[test]
fn test_fallback_runs_for_unknown_extension_instructions() -> TestResult {
    let output = transform(
        r#"<xsl:template match="/">
             <r>
               <weft:frobnicate><xsl:fallback>weft</xsl:fallback></weft:frobnicate>
               <s xmlns:ext="urn:ext" xsl:extension-element-prefixes="ext">
                 <ext:thing><xsl:fallback>ext</xsl:fallback></ext:thing>
               </s>
             </r>
           </xsl:template>"#,
        "<doc/>",
    )?;
    assert_eq!(output, "<r>weft<s>ext</s></r>");
    Ok(())
}

#[test]
fn test_element_available_guards_extensions() -> TestResult {
    let output = transform(
        r#"<xsl:template match="/">
             <r>
               <xsl:choose>
                 <xsl:when test="element-available('weft:frobnicate')"><weft:frobnicate/></xsl:when>
                 <xsl:otherwise>none</xsl:otherwise>
               </xsl:choose>
               <xsl:value-of select="element-available('xsl:number')"/>,<xsl:value-of select="element-available('weft:assign')"/>,<xsl:value-of select="element-available('xsl:stylesheet')"/>
             </r>
           </xsl:template>"#,
        "<doc/>",
    )?;
    assert_eq!(output, "<r>nonetrue,true,false</r>");
    Ok(())
}

#[test]
fn test_extension_without_fallback_fails_when_reached() {
    let result = transform(
        r#"<xsl:template match="/"><r><weft:frobnicate/></r></xsl:template>"#,
        "<doc/>",
    );
    assert!(
        matches!(result, Err(XsltError::Structure { ref message, .. }) if message.contains("weft:frobnicate")),
        "got {:?}",
        result
    );
}

#[test]
fn test_unparsed_entity_uri() -> TestResult {
    let source = r#"<!DOCTYPE doc [
<!NOTATION gif SYSTEM "image/gif">
<!ENTITY logo SYSTEM "logo.gif" NDATA gif>
]>
<doc/>"#;
    let output = transform(
        r#"<xsl:template match="/">
             <r><xsl:value-of select="unparsed-entity-uri('logo')"/>|<xsl:value-of select="unparsed-entity-uri('banner')"/></r>
           </xsl:template>"#,
        source,
    )?;
    assert_eq!(output, "<r>logo.gif|</r>");
    Ok(())
}

#[test]
fn test_sort_case_order() -> TestResult {
    let output = transform(
        r#"<xsl:template match="/">
             <upper><xsl:for-each select="l/i"><xsl:sort select="." case-order="upper-first"/><xsl:value-of select="."/></xsl:for-each></upper>
             <lower><xsl:for-each select="l/i"><xsl:sort select="." case-order="lower-first"/><xsl:value-of select="."/></xsl:for-each></lower>
           </xsl:template>"#,
        "<l><i>b</i><i>B</i><i>a</i><i>A</i></l>",
    )?;
    assert_eq!(output, "<upper>AaBb</upper><lower>aAbB</lower>");
    Ok(())
}
