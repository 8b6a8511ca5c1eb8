//! weft: an XSLT 1.0 transformation engine.
//!
//! The work is split across three crates, re-exported here:
//! - [`tree`]: interned names and the immutable node tree,
//! - [`xpath`]: XPath 1.0 parsing and evaluation,
//! - [`xslt`]: patterns, template rules, the controller and serialization.

pub mod cli;
pub mod error;

pub use weft_tree as tree;
pub use weft_xpath as xpath;
pub use weft_xslt as xslt;

pub use error::CliError;
pub use weft_xslt::{
    Controller, Diagnostic, DiagnosticKind, MapResolver, OutputMethod, OutputProperties,
    RecoveryPolicy, Stylesheet, TransformOptions, TransformOutput, XsltError,
};
