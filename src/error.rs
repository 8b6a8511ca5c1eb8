// src/error.rs
use std::path::PathBuf;
use thiserror::Error;
use weft_xslt::XsltError;

/// Everything that can stop the command-line tool.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid parameter '{0}': expected NAME=VALUE")]
    Parameter(String),

    #[error("Transformation failed: {0}")]
    Transform(#[from] XsltError),
}
