use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    /// The event stream does not describe a well-formed tree.
    #[error("Structure error at line {line}: {message}")]
    Structure { message: String, line: u32 },

    #[error("XML parsing error at line {line}: {source}")]
    Xml {
        #[source]
        source: quick_xml::Error,
        line: u32,
    },

    #[error("UTF-8 string error: {0}")]
    Utf8Str(#[from] std::str::Utf8Error),
}

impl TreeError {
    pub fn structure(message: impl Into<String>, line: u32) -> Self {
        TreeError::Structure {
            message: message.into(),
            line,
        }
    }

    pub fn line(&self) -> Option<u32> {
        match self {
            TreeError::Structure { line, .. } | TreeError::Xml { line, .. } => Some(*line),
            TreeError::Utf8Str(_) => None,
        }
    }
}
