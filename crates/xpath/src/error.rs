use thiserror::Error;

#[derive(Error, Debug)]
pub enum XPathError {
    #[error("XPath parse error in '{0}': {1}")]
    XPathParse(String, String),

    #[error("Function '{function}' error: {message}")]
    FunctionError { function: String, message: String },

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Namespace prefix '{0}' is not declared")]
    UnboundPrefix(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Variable '{0}' not found")]
    UnknownVariable(String),

    #[error("Context node required")]
    NoContextNode,

    /// An error raised by the host environment (variable store, key indexes, documents)
    /// while an expression was being evaluated.
    #[error(transparent)]
    External(Box<dyn std::error::Error + Send + Sync>),
}

impl XPathError {
    pub fn function(function: &str, message: impl Into<String>) -> Self {
        XPathError::FunctionError {
            function: function.to_string(),
            message: message.into(),
        }
    }
}
