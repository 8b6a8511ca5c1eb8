mod common;

use common::{TestResult, compile};
use std::thread;
use weft_xslt::{RecoveryPolicy, TransformOptions, XsltError};

const DIRECTORY: &str = r#"<staff>
    <person id="p1" dept="eng"><name>Ada</name></person>
    <person id="p2" dept="ops"><name>Grace</name></person>
    <person id="p3" dept="eng"><name>Linus</name></person>
    <team lead="p3"/>
</staff>"#;

#[test]
fn test_key_indexes_built_once_across_threads() -> TestResult {
    let stylesheet = compile(
        r#"<xsl:key name="by-dept" match="person" use="@dept"/>
           <xsl:template match="/">
             <eng><xsl:for-each select="key('by-dept', 'eng')"><xsl:value-of select="name"/>;</xsl:for-each></eng>
           </xsl:template>"#,
    )?;
    let source = stylesheet.parse_source(DIRECTORY)?;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let stylesheet = stylesheet.clone();
            let source = source.clone();
            thread::spawn(move || {
                let mut controller = stylesheet.controller();
                controller.transform_to_string(&source)
            })
        })
        .collect();
    for handle in handles {
        let output = handle.join().map_err(|_| "transform thread panicked")??;
        assert_eq!(output, "<eng>Ada;Linus;</eng>");
    }
    assert_eq!(stylesheet.compiled().keys.build_count(), 1);
    Ok(())
}

#[test]
fn test_repeated_lookups_reuse_the_index() -> TestResult {
    let stylesheet = compile(
        r#"<xsl:key name="by-id" match="person" use="@id"/>
           <xsl:template match="/">
             <xsl:variable name="first" select="key('by-id', 'p2')"/>
             <xsl:variable name="second" select="key('by-id', 'p2')"/>
             <r><xsl:value-of select="count($first | $second)"/>:<xsl:value-of select="$second/name"/></r>
           </xsl:template>"#,
    )?;
    let output = stylesheet.transform(DIRECTORY, &TransformOptions::default())?;
    assert_eq!(output.output, "<r>1:Grace</r>");
    assert_eq!(stylesheet.compiled().keys.build_count(), 1);
    Ok(())
}

#[test]
fn test_key_definitions_sharing_a_name_accumulate() -> TestResult {
    let stylesheet = compile(
        r#"<xsl:key name="any" match="person" use="@id"/>
           <xsl:key name="any" match="team" use="@lead"/>
           <xsl:template match="/">
             <r><xsl:for-each select="key('any', 'p3')"><xsl:value-of select="name(.)"/>,</xsl:for-each></r>
           </xsl:template>"#,
    )?;
    let output = stylesheet.transform(DIRECTORY, &TransformOptions::default())?;
    assert_eq!(output.output, "<r>person,team,</r>");
    Ok(())
}

#[test]
fn test_key_over_attributes_and_node_set_values() -> TestResult {
    let stylesheet = compile(
        r#"<xsl:key name="dept-attr" match="@dept" use="."/>
           <xsl:key name="by-child" match="person" use="name | @id"/>
           <xsl:template match="/">
             <r>
               <a><xsl:value-of select="count(key('dept-attr', 'eng'))"/></a>
               <b><xsl:value-of select="key('by-child', 'Grace')/@id"/></b>
               <c><xsl:value-of select="key('by-child', 'p1')/name"/></c>
               <d><xsl:value-of select="count(key('by-child', /staff/person/@id))"/></d>
             </r>
           </xsl:template>"#,
    )?;
    let output = stylesheet.transform(DIRECTORY, &TransformOptions::default())?;
    assert_eq!(output.output, "<r><a>2</a><b>p2</b><c>Ada</c><d>3</d></r>");
    Ok(())
}

#[test]
fn test_key_patterns_match_templates() -> TestResult {
    let stylesheet = compile(
        r#"<xsl:key name="by-dept" match="person" use="@dept"/>
           <xsl:template match="/"><r><xsl:apply-templates select="staff/person"/></r></xsl:template>
           <xsl:template match="key('by-dept', 'ops')"><ops/></xsl:template>
           <xsl:template match="person"><other/></xsl:template>"#,
    )?;
    let output = stylesheet.transform(DIRECTORY, &TransformOptions::default())?;
    assert_eq!(output.output, "<r><other/><ops/><other/></r>");
    Ok(())
}

#[test]
fn test_circular_key_is_fatal() -> TestResult {
    let stylesheet = compile(
        r#"<xsl:key name="loop" match="person" use="count(key('loop', 'x'))"/>
           <xsl:template match="/"><xsl:value-of select="count(key('loop', '1'))"/></xsl:template>"#,
    )?;
    let options = TransformOptions {
        recovery: RecoveryPolicy::Silent,
        ..TransformOptions::default()
    };
    let result = stylesheet.transform(DIRECTORY, &options);
    assert!(matches!(result, Err(XsltError::CircularDefinition { ref what }) if what.contains("loop")));
    Ok(())
}

#[test]
fn test_key_definitions_may_not_depend_on_variables() {
    for declaration in [
        r#"<xsl:param name="dept" select="'eng'"/>
           <xsl:key name="k" match="person" use="concat(@dept, $dept)"/>"#,
        r#"<xsl:variable name="dept" select="'eng'"/>
           <xsl:key name="k" match="person[@dept = $dept]" use="@id"/>"#,
    ] {
        let result = compile(declaration);
        assert!(
            matches!(result, Err(XsltError::Structure { ref message, .. }) if message.contains("'k'")),
            "got {:?}",
            result
        );
    }
}

#[test]
fn test_shared_index_ignores_run_parameters() -> TestResult {
    let stylesheet = compile(
        r#"<xsl:param name="dept" select="'eng'"/>
           <xsl:key name="by-dept" match="person" use="@dept"/>
           <xsl:template match="/"><xsl:value-of select="count(key('by-dept', $dept))"/></xsl:template>"#,
    )?;
    let source = stylesheet.parse_source(DIRECTORY)?;
    let mut eng = stylesheet.controller();
    assert_eq!(eng.transform_to_string(&source)?, "2");

    let mut ops = stylesheet.controller();
    ops.set_parameter("dept", weft_xpath::XPathValue::String("ops".to_string()))?;
    assert_eq!(ops.transform_to_string(&source)?, "1");
    assert_eq!(stylesheet.compiled().keys.build_count(), 1);
    Ok(())
}
