use thiserror::Error;
use weft_tree::{Node, TreeError};
use weft_xpath::XPathError;

/// Where an error arose: a stylesheet line, a source node, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub line: Option<u32>,
    pub path: Option<String>,
}

impl Location {
    pub fn line(line: u32) -> Self {
        Location {
            line: Some(line),
            path: None,
        }
    }

    pub fn at_node(node: &Node) -> Self {
        Location {
            line: Some(node.line_number()).filter(|l| *l > 0),
            path: Some(node.path()),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.line, &self.path) {
            (Some(line), Some(path)) => write!(f, "line {} ({})", line, path),
            (Some(line), None) => write!(f, "line {}", line),
            (None, Some(path)) => write!(f, "{}", path),
            (None, None) => write!(f, "unknown location"),
        }
    }
}

#[derive(Error, Debug)]
pub enum XsltError {
    #[error("Structure error at {location}: {message}")]
    Structure { message: String, location: Location },

    #[error("Ambiguous rule match at {location}: {message}")]
    AmbiguousRule { message: String, location: Location },

    #[error("Circular definition of {what}")]
    CircularDefinition { what: String },

    #[error("Unresolved reference at {location}: {message}")]
    UnresolvedReference { message: String, location: Location },

    #[error("Recoverable error at {location}: {message}")]
    RecoverableSelection { message: String, location: Location },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("XPath error: {0}")]
    XPath(XPathError),

    #[error("Template compilation error: {0}")]
    Compilation(String),

    #[error("Template execution error: {0}")]
    Execution(String),

    #[error("Transformation terminated by xsl:message: {0}")]
    Terminated(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl XsltError {
    pub fn structure(message: impl Into<String>, line: u32) -> Self {
        XsltError::Structure {
            message: message.into(),
            location: Location::line(line),
        }
    }

    pub fn unresolved(message: impl Into<String>, location: Location) -> Self {
        XsltError::UnresolvedReference {
            message: message.into(),
            location,
        }
    }

    pub fn recoverable(message: impl Into<String>, location: Location) -> Self {
        XsltError::RecoverableSelection {
            message: message.into(),
            location,
        }
    }

    /// Recoverable errors are handled according to the active recovery policy; every
    /// other error ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            XsltError::AmbiguousRule { .. } | XsltError::RecoverableSelection { .. }
        )
    }
}

/// Errors raised by the host while an XPath expression is running travel through the
/// evaluator boxed, and are unwrapped again here.
impl From<XPathError> for XsltError {
    fn from(err: XPathError) -> Self {
        match err {
            XPathError::External(inner) => match inner.downcast::<XsltError>() {
                Ok(xslt) => *xslt,
                Err(other) => XsltError::XPath(XPathError::External(other)),
            },
            other => XsltError::XPath(other),
        }
    }
}

impl From<XsltError> for XPathError {
    fn from(err: XsltError) -> Self {
        match err {
            XsltError::XPath(inner) => inner,
            other => XPathError::External(Box::new(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Warning,
    Message,
}

/// A non-fatal report collected during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            DiagnosticKind::Warning => write!(f, "warning: {}", self.message),
            DiagnosticKind::Message => write!(f, "message: {}", self.message),
        }
    }
}
