mod common;

use common::{TestResult, compile};
use weft_xslt::{TransformOptions, XsltError};

const BOOK: &str = "<book>\
    <chapter><title>One</title><section><title>1a</title></section><section><title>1b</title></section></chapter>\
    <chapter><title>Two</title><section><title>2a</title></section></chapter>\
</book>";

fn transform(declarations: &str, source: &str) -> Result<String, XsltError> {
    let stylesheet = compile(declarations)?;
    Ok(stylesheet.transform(source, &TransformOptions::default())?.output)
}

#[test]
fn test_number_single_counts_siblings() -> TestResult {
    let output = transform(
        r#"<xsl:template match="/">
             <r><xsl:for-each select="//section"><xsl:number format="(a)"/></xsl:for-each></r>
           </xsl:template>"#,
        BOOK,
    )?;
    assert_eq!(output, "<r>(a)(b)(a)</r>");
    Ok(())
}

#[test]
fn test_number_multiple_builds_a_hierarchy() -> TestResult {
    let output = transform(
        r#"<xsl:template match="/">
             <r><xsl:for-each select="//section"><xsl:number level="multiple" count="chapter|section" format="1.1 "/></xsl:for-each></r>
           </xsl:template>"#,
        BOOK,
    )?;
    assert_eq!(output, "<r>1.1 1.2 2.1 </r>");
    Ok(())
}

#[test]
fn test_number_any_counts_across_the_document() -> TestResult {
    let output = transform(
        r#"<xsl:template match="/">
             <all><xsl:for-each select="//title"><xsl:number level="any" count="title" format="1,"/></xsl:for-each></all>
             <within><xsl:for-each select="//section"><xsl:number level="any" count="section" from="chapter" format="1,"/></xsl:for-each></within>
           </xsl:template>"#,
        BOOK,
    )?;
    assert_eq!(output, "<all>1,2,3,4,5,</all><within>1,2,1,</within>");
    Ok(())
}

#[test]
fn test_number_value_and_grouping() -> TestResult {
    let output = transform(
        r#"<xsl:template match="/">
             <r>
               <roman><xsl:number value="3" format="I"/></roman>
               <rounded><xsl:number value="2.5"/></rounded>
               <grouped><xsl:number value="1234567" grouping-separator="," grouping-size="3"/></grouped>
               <negative><xsl:number value="-2"/></negative>
               <styled><xsl:number value="4" format="{/book/@style}"/></styled>
             </r>
           </xsl:template>"#,
        r#"<book style="a"/>"#,
    )?;
    assert_eq!(
        output,
        "<r><roman>III</roman><rounded>3</rounded><grouped>1,234,567</grouped><negative>-2</negative><styled>d</styled></r>"
    );
    Ok(())
}

#[test]
fn test_number_rejects_unknown_level() {
    let result = compile(r#"<xsl:template match="/"><xsl:number level="every"/></xsl:template>"#);
    assert!(matches!(result, Err(XsltError::Structure { .. })), "got {:?}", result.err());
}

#[test]
fn test_format_number_with_default_and_named_formats() -> TestResult {
    let output = transform(
        r#"<xsl:decimal-format name="euro" decimal-separator="," grouping-separator="."/>
           <xsl:template match="/">
             <r><xsl:value-of select="format-number(1234.5, '#,##0.00')"/>|<xsl:value-of select="format-number(1234.5, '#.##0,00', 'euro')"/>|<xsl:value-of select="format-number(0.25, '0%')"/>|<xsl:value-of select="format-number(-3, '0;(0)')"/></r>
           </xsl:template>"#,
        "<doc/>",
    )?;
    assert_eq!(output, "<r>1,234.50|1.234,50|25%|(3)</r>");
    Ok(())
}

#[test]
fn test_declared_default_format_changes_output() -> TestResult {
    let output = transform(
        r#"<xsl:decimal-format NaN="n/a" infinity="inf"/>
           <xsl:template match="/">
             <r><xsl:value-of select="format-number(number('x'), '0')"/>|<xsl:value-of select="format-number(1 div 0, '0')"/></r>
           </xsl:template>"#,
        "<doc/>",
    )?;
    assert_eq!(output, "<r>n/a|inf</r>");
    Ok(())
}

#[test]
fn test_format_number_with_undeclared_format_fails() {
    let result = transform(
        r#"<xsl:template match="/"><xsl:value-of select="format-number(1, '0', 'missing')"/></xsl:template>"#,
        "<doc/>",
    );
    assert!(matches!(result, Err(XsltError::UnresolvedReference { .. })), "got {:?}", result);
}

#[test]
fn test_conflicting_decimal_formats_are_rejected() {
    let result = compile(
        r#"<xsl:decimal-format name="f" decimal-separator=","/>
           <xsl:decimal-format name="f" decimal-separator="."/>
           <xsl:template match="/"/>"#,
    );
    assert!(matches!(result, Err(XsltError::Structure { .. })), "got {:?}", result.err());
    let result = compile(r#"<xsl:decimal-format percent="pc"/><xsl:template match="/"/>"#);
    assert!(matches!(result, Err(XsltError::Structure { .. })), "got {:?}", result.err());
}
