mod common;

use common::{TestResult, compile, compile_in_memory, sheet};
use weft_xslt::{MapResolver, RunState, XsltError};

const COUNTDOWN: &str = r#"<xsl:param name="from" select="12"/>
    <xsl:template match="/"><r><xsl:call-template name="down"><xsl:with-param name="n" select="$from"/></xsl:call-template></r></xsl:template>
    <xsl:template name="down">
      <xsl:param name="n"/>
      <xsl:if test="$n > 0"><xsl:value-of select="$n mod 10"/><xsl:call-template name="down"><xsl:with-param name="n" select="$n - 1"/></xsl:call-template></xsl:if>
    </xsl:template>"#;

fn assert_too_deep(result: Result<String, XsltError>) {
    match result {
        Err(XsltError::Execution(message)) => assert!(message.contains("nested too deep"), "{}", message),
        other => panic!("expected a nesting error, got {:?}", other),
    }
}

#[test]
fn test_named_template_recursion_within_limit() -> TestResult {
    let stylesheet = compile(COUNTDOWN)?;
    let source = stylesheet.parse_source("<a/>")?;
    let mut controller = stylesheet.controller();
    let output = controller.transform_to_string(&source)?;
    assert_eq!(output, "<r>210987654321</r>");
    assert_eq!(controller.frame_depth(), 0);
    Ok(())
}

#[test]
fn test_unbounded_call_template_fails_the_run() -> TestResult {
    let stylesheet = compile(
        r#"<xsl:template match="/"><xsl:call-template name="loop"/></xsl:template>
           <xsl:template name="loop"><x><xsl:call-template name="loop"/></x></xsl:template>"#,
    )?;
    let source = stylesheet.parse_source("<a/>")?;
    let mut controller = stylesheet.controller();
    assert_too_deep(controller.transform_to_string(&source));
    assert_eq!(controller.state(), RunState::Failed);
    assert_eq!(controller.frame_depth(), 0);
    Ok(())
}

#[test]
fn test_unbounded_apply_templates_fails_the_run() -> TestResult {
    let stylesheet = compile(r#"<xsl:template match="*"><xsl:apply-templates select="."/></xsl:template>"#)?;
    let source = stylesheet.parse_source("<a/>")?;
    assert_too_deep(stylesheet.controller().transform_to_string(&source));
    Ok(())
}

#[test]
fn test_apply_imports_counts_towards_depth() -> TestResult {
    let resolver = MapResolver::new().with_document(
        "mem/base.xsl",
        sheet(r#"<xsl:template match="a"><xsl:apply-templates select="."/></xsl:template>"#),
    );
    let stylesheet = compile_in_memory(
        r#"<xsl:import href="base.xsl"/>
           <xsl:template match="a"><xsl:apply-imports/></xsl:template>"#,
        resolver,
    )?;
    let source = stylesheet.parse_source("<a/>")?;
    assert_too_deep(stylesheet.controller().transform_to_string(&source));
    Ok(())
}

#[test]
fn test_depth_limit_is_configurable() -> TestResult {
    let stylesheet = compile(COUNTDOWN)?;
    let source = stylesheet.parse_source("<a/>")?;

    let mut tight = stylesheet.controller();
    tight.set_max_depth(10)?;
    assert_too_deep(tight.transform_to_string(&source));

    let mut roomy = stylesheet.controller();
    roomy.set_max_depth(40)?;
    assert!(roomy.transform_to_string(&source).is_ok());
    Ok(())
}
