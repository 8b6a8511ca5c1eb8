//! Loading of stylesheet modules (`xsl:import`, `xsl:include`) and of documents named
//! by `document()`.

use crate::error::{Location, XsltError};
use std::collections::HashMap;
use std::path::Path;

/// Import and include chains deeper than this are rejected.
pub const MAX_IMPORT_DEPTH: usize = 100;

pub trait DocumentResolver: Send + Sync {
    /// Resolves `href` against `base_uri` and returns the absolute URI with the text
    /// found there.
    fn load(&self, href: &str, base_uri: Option<&str>) -> Result<(String, String), XsltError>;
}

/// Resolves against the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileResolver;

impl DocumentResolver for FileResolver {
    fn load(&self, href: &str, base_uri: Option<&str>) -> Result<(String, String), XsltError> {
        let uri = resolve_uri(href, base_uri);
        let path = uri.strip_prefix("file://").unwrap_or(&uri);
        log::debug!("loading '{}'", path);
        let text = std::fs::read_to_string(path).map_err(|err| {
            XsltError::unresolved(format!("cannot read '{}': {}", uri, err), Location::default())
        })?;
        Ok((uri, text))
    }
}

/// Serves documents from memory, keyed by resolved URI.
#[derive(Debug, Default, Clone)]
pub struct MapResolver {
    documents: HashMap<String, String>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, uri: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.insert(uri.into(), text.into());
        self
    }
}

impl DocumentResolver for MapResolver {
    fn load(&self, href: &str, base_uri: Option<&str>) -> Result<(String, String), XsltError> {
        let uri = resolve_uri(href, base_uri);
        self.documents
            .get(&uri)
            .map(|text| (uri.clone(), text.clone()))
            .ok_or_else(|| {
                XsltError::unresolved(format!("no document at '{}'", uri), Location::default())
            })
    }
}

/// Resolves a relative reference against the directory of `base_uri`.
pub fn resolve_uri(href: &str, base_uri: Option<&str>) -> String {
    if href.starts_with('/') || href.contains("://") {
        return href.to_string();
    }
    match base_uri {
        Some(base) => {
            let base_dir = Path::new(base).parent().unwrap_or(Path::new(""));
            normalize_path(&base_dir.join(href).to_string_lossy())
        }
        None => normalize_path(href),
    }
}

fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    if path.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}
