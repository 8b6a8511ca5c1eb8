#![allow(dead_code)]

use std::sync::Arc;
use weft_xslt::{MapResolver, RecoveryPolicy, Stylesheet, TransformOptions, TransformOutput, XsltError};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const XSL_OPEN: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:weft="urn:weft">"#;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Wraps top-level declarations in a stylesheet element. `xsl:output` goes last so
/// imports stay first.
pub fn sheet(declarations: &str) -> String {
    format!(
        "{}{}<xsl:output omit-xml-declaration=\"yes\"/></xsl:stylesheet>",
        XSL_OPEN, declarations
    )
}

pub fn compile(declarations: &str) -> Result<Stylesheet, XsltError> {
    init_logging();
    Stylesheet::compile(&sheet(declarations))
}

/// Compiles a stylesheet held at `mem/main.xsl` whose imports and documents come from
/// `resolver`.
pub fn compile_in_memory(declarations: &str, resolver: MapResolver) -> Result<Stylesheet, XsltError> {
    init_logging();
    Stylesheet::compile_with(&sheet(declarations), Some("mem/main.xsl"), Arc::new(resolver))
}

pub fn run(
    declarations: &str,
    source: &str,
    recovery: RecoveryPolicy,
) -> Result<TransformOutput, XsltError> {
    let stylesheet = compile(declarations)?;
    let options = TransformOptions {
        recovery,
        ..TransformOptions::default()
    };
    stylesheet.transform(source, &options)
}
